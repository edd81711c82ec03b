use anyhow::Result;
use std::sync::Arc;

use mailbeam::config::Config;
use mailbeam::models::sender::{SenderAccount, TransportKind};
use mailbeam::transport::{gmail::GmailApiTransport, smtp::SmtpRelayTransport, MailTransport};
use mailbeam::{app, db, telemetry, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let config = Config::from_env();

    // Build a correct sqlite URL (sqlx expects sqlite://path or sqlite::memory:)
    let db_url = normalize_sqlite_url(&config.database_url);

    // Ensure file exists for file-based sqlite (avoid open error on some setups)
    if let Some(path) = db_file_path(&db_url) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        if !path.exists() {
            std::fs::File::create(&path).ok();
        }
    }
    let pool = sqlx::SqlitePool::connect(&db_url).await?;

    if let Err(e) = db::run_migrations(&pool).await {
        let msg = e.to_string();
        if msg.contains("already exists") {
            tracing::info!("migration benign: {msg}");
        } else {
            tracing::warn!("migration error: {msg}");
        }
    }
    let sender_id = match db::seed_sender(&pool).await {
        Ok(id) => id,
        Err(e) => {
            tracing::info!("seed skipped: {e}");
            SenderAccount::generate_id(&config.from_address)
        }
    };

    let transport: Arc<dyn MailTransport> = match config.transport {
        TransportKind::Gmail => Arc::new(GmailApiTransport::new(pool.clone(), &sender_id)),
        TransportKind::Smtp => Arc::new(SmtpRelayTransport::new(
            &config.smtp_host,
            config.smtp_port,
            &config.smtp_username,
            &config.smtp_password,
        )),
    };

    let port = config.port;
    let state = AppState {
        pool: pool.clone(),
        config: Arc::new(config),
        transport,
    };
    let router = app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let term = async {
        if let Ok(mut s) = signal::unix::signal(signal::unix::SignalKind::terminate()) {
            s.recv().await;
        }
    };
    #[cfg(not(unix))]
    let term = std::future::pending::<()>();
    tokio::select! { _ = ctrl_c => {}, _ = term => {} }
}

fn normalize_sqlite_url(input: &str) -> String {
    // Accept forms: sqlite:foo.db (fix), sqlite://foo.db (ok), file:foo.db (convert), just path (prepend)
    if input.starts_with("sqlite://") || input.starts_with("sqlite::memory:") {
        return input.to_string();
    }
    if input.starts_with("sqlite:") {
        let rest = input.trim_start_matches("sqlite:");
        return format!("sqlite://{}", rest.trim_start_matches('/'));
    }
    if input.starts_with("file:") {
        return format!("sqlite://{}", input.trim_start_matches("file:"));
    }
    format!("sqlite://{}", input)
}

fn db_file_path(url: &str) -> Option<std::path::PathBuf> {
    if let Some(rest) = url.strip_prefix("sqlite://") {
        if rest == ":memory:" {
            return None;
        }
        return Some(std::path::PathBuf::from(rest));
    }
    None
}
