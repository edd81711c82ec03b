use anyhow::Result;
use sqlx::SqlitePool;
use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::sender::{SenderAccount, TransportKind};

/// Apply every .sql file under migrations/ in path order.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir("migrations")?.filter_map(|e| e.ok()).collect();
    entries.sort_by_key(|e| e.path());
    for e in entries {
        let p = e.path();
        if p.extension().and_then(|s| s.to_str()) == Some("sql") {
            let sql = fs::read_to_string(&p)?;
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    Ok(())
}

/// Seed the sender account from the environment when none exists yet.
/// Returns the account id.
pub async fn seed_sender(pool: &SqlitePool) -> Result<String> {
    let email = std::env::var("SENDER_EMAIL").or_else(|_| std::env::var("SMTP_USERNAME"))?;
    let transport = TransportKind::from_str(
        &std::env::var("MAIL_TRANSPORT").unwrap_or_else(|_| "smtp".into()),
    );
    let smtp_host = std::env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into());
    let smtp_port: u16 = std::env::var("SMTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(587);
    let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();

    let id = SenderAccount::generate_id(&email);
    if crate::services::sender_service::get_sender(pool, &id)
        .await?
        .is_some()
    {
        return Ok(id);
    }

    let account = crate::services::sender_service::add_sender(
        pool, &email, &password, transport, &smtp_host, smtp_port,
    )
    .await?;

    let access_token = std::env::var("GMAIL_ACCESS_TOKEN").ok();
    let refresh_token = std::env::var("GMAIL_REFRESH_TOKEN").ok();
    if access_token.is_some() || refresh_token.is_some() {
        crate::services::sender_service::store_tokens(
            pool,
            &account.id,
            access_token.as_deref(),
            refresh_token.as_deref(),
            None,
        )
        .await?;
    }
    Ok(account.id)
}

pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
