use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use mailbeam::config::Config;
use mailbeam::models::sender::TransportKind;
use mailbeam::transport::{MailTransport, OutboundEmail, TransportError};
use mailbeam::AppState;

pub const TEST_API_KEY: &str = "test-key";
pub const TRACKING_BASE: &str = "http://track.test";

/// In-memory transport: records every accepted message, rejects the
/// configured recipients the way a provider would.
pub struct MockTransport {
    pub sent: Mutex<Vec<OutboundEmail>>,
    reject: HashSet<String>,
    counter: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::rejecting(&[])
    }

    pub fn rejecting(recipients: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject: recipients.iter().map(|r| r.to_string()).collect(),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl MailTransport for MockTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<String, TransportError> {
        if self.reject.contains(&email.to) {
            return Err(TransportError::Rejected("550 mailbox unavailable".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("provider-{}", n))
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".into(),
        tracking_base_url: TRACKING_BASE.into(),
        api_key: TEST_API_KEY.into(),
        user_id: "default".into(),
        from_address: "no-reply@mailbeam.dev".into(),
        transport: TransportKind::Smtp,
        smtp_host: "smtp.test".into(),
        smtp_port: 587,
        smtp_username: "no-reply@mailbeam.dev".into(),
        smtp_password: "secret".into(),
        port: 0,
    }
}

/// Single-connection in-memory pool with the schema applied.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    mailbeam::db::run_migrations(&pool).await.expect("migrations");
    pool
}

/// Pool whose schema was never applied: every store write fails.
pub async fn broken_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool")
}

pub fn test_app(pool: SqlitePool, transport: Arc<dyn MailTransport>) -> Router {
    mailbeam::app(AppState {
        pool,
        config: Arc::new(test_config()),
        transport,
    })
}
