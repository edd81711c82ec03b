/// Sender account store access
use anyhow::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::sender::{SenderAccount, TransportKind};

fn row_to_sender(row: &SqliteRow) -> Result<SenderAccount> {
    Ok(SenderAccount {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        transport: TransportKind::from_str(&row.try_get::<String, _>("transport")?),
        smtp_host: row.try_get("smtp_host")?,
        smtp_port: row.try_get::<i64, _>("smtp_port")? as u16,
        credentials_encrypted: row.try_get("credentials_encrypted")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        token_expires_at: row.try_get("token_expires_at")?,
        token_version: row.try_get("token_version")?,
        enabled: row.try_get("enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        password: String::new(), // populated on demand
    })
}

/// Get sender account by ID, with the password decoded when present.
pub async fn get_sender(pool: &SqlitePool, account_id: &str) -> Result<Option<SenderAccount>> {
    let row = sqlx::query("SELECT * FROM sender_accounts WHERE id = ?")
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

    Ok(match row {
        Some(r) => Some(row_to_sender(&r)?.with_password()?),
        None => None,
    })
}

/// Add a sender account. Fails when the id already exists.
pub async fn add_sender(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    transport: TransportKind,
    smtp_host: &str,
    smtp_port: u16,
) -> Result<SenderAccount> {
    let id = SenderAccount::generate_id(email);

    let existing = sqlx::query("SELECT id FROM sender_accounts WHERE id = ?")
        .bind(&id)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        anyhow::bail!("Sender account already exists: {}", email);
    }

    let credentials_encrypted = SenderAccount::encode_credentials(email, password);
    let now = crate::db::now_epoch();
    let transport_str = transport.as_str();

    sqlx::query(
        r#"
        INSERT INTO sender_accounts (
            id, email, transport, smtp_host, smtp_port,
            credentials_encrypted, enabled, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(email)
    .bind(transport_str)
    .bind(smtp_host)
    .bind(smtp_port as i64)
    .bind(&credentials_encrypted)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(SenderAccount {
        id,
        email: email.to_string(),
        display_name: None,
        transport,
        smtp_host: smtp_host.to_string(),
        smtp_port,
        credentials_encrypted,
        access_token: None,
        refresh_token: None,
        token_expires_at: None,
        token_version: 0,
        enabled: true,
        created_at: now,
        updated_at: now,
        password: password.to_string(),
    })
}

/// Store an initial token pair (e.g. seeded from the environment).
pub async fn store_tokens(
    pool: &SqlitePool,
    account_id: &str,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
    expires_at: Option<i64>,
) -> Result<()> {
    let now = crate::db::now_epoch();
    sqlx::query(
        "UPDATE sender_accounts SET access_token = ?, refresh_token = ?, token_expires_at = ?, updated_at = ? WHERE id = ?",
    )
    .bind(access_token)
    .bind(refresh_token)
    .bind(expires_at)
    .bind(now)
    .bind(account_id)
    .execute(pool)
    .await?;
    Ok(())
}
