//! Event recorder: the send log, open upserts and the click append-log.
//! Tracking endpoints call these best-effort; a store failure must never
//! surface to the mail client.

use anyhow::Result;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::models::tracking::{ClickEvent, EventMeta, OpenEvent, TrackedMessage};

/// Insert the send row. Called exactly once per dispatch, before any
/// recipient-level attempt.
pub async fn record_send(pool: &SqlitePool, message: &TrackedMessage) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO email_tracking (id, user_id, campaign_id, recipients, subject, sent_at, status)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&message.id)
    .bind(&message.user_id)
    .bind(&message.campaign_id)
    .bind(&message.recipients)
    .bind(&message.subject)
    .bind(message.sent_at)
    .bind(&message.status)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert one open. Repeat opens for the same (message, recipient) overwrite
/// timestamp and request metadata in place; the unique key keeps exactly one
/// row per recipient per message even under concurrent prefetcher traffic.
pub async fn record_open(
    pool: &SqlitePool,
    email_id: &str,
    recipient: &str,
    opened_at: i64,
    meta: &EventMeta,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO email_opens (email_id, recipient, opened_at, ip_address, user_agent)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(email_id, recipient) DO UPDATE SET
            opened_at = excluded.opened_at,
            ip_address = excluded.ip_address,
            user_agent = excluded.user_agent
        "#,
    )
    .bind(email_id)
    .bind(recipient)
    .bind(opened_at)
    .bind(&meta.ip_address)
    .bind(&meta.user_agent)
    .execute(pool)
    .await?;
    Ok(())
}

/// Append one click row. No dedup key: every click is its own row.
pub async fn record_click(
    pool: &SqlitePool,
    email_id: &str,
    recipient: &str,
    url: &str,
    clicked_at: i64,
    meta: &EventMeta,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO email_clicks (email_id, recipient, url, clicked_at, ip_address, user_agent)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(email_id)
    .bind(recipient)
    .bind(url)
    .bind(clicked_at)
    .bind(&meta.ip_address)
    .bind(&meta.user_agent)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_message(pool: &SqlitePool, email_id: &str) -> Result<Option<TrackedMessage>> {
    let message = sqlx::query_as::<_, TrackedMessage>("SELECT * FROM email_tracking WHERE id = ?")
        .bind(email_id)
        .fetch_optional(pool)
        .await?;
    Ok(message)
}

pub async fn opens_for_message(pool: &SqlitePool, email_id: &str) -> Result<Vec<OpenEvent>> {
    let opens = sqlx::query_as::<_, OpenEvent>(
        "SELECT * FROM email_opens WHERE email_id = ? ORDER BY opened_at DESC",
    )
    .bind(email_id)
    .fetch_all(pool)
    .await?;
    Ok(opens)
}

pub async fn clicks_for_message(pool: &SqlitePool, email_id: &str) -> Result<Vec<ClickEvent>> {
    let clicks = sqlx::query_as::<_, ClickEvent>(
        "SELECT * FROM email_clicks WHERE email_id = ? ORDER BY clicked_at DESC",
    )
    .bind(email_id)
    .fetch_all(pool)
    .await?;
    Ok(clicks)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub email_id: String,
    /// One per opener thanks to the upsert key.
    pub opens: i64,
    pub clicks: i64,
    pub unique_clickers: i64,
}

/// Aggregate counters for one send.
pub async fn message_stats(pool: &SqlitePool, email_id: &str) -> Result<MessageStats> {
    let opens: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_opens WHERE email_id = ?")
        .bind(email_id)
        .fetch_one(pool)
        .await?;
    let clicks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM email_clicks WHERE email_id = ?")
        .bind(email_id)
        .fetch_one(pool)
        .await?;
    let unique_clickers: i64 =
        sqlx::query_scalar("SELECT COUNT(DISTINCT recipient) FROM email_clicks WHERE email_id = ?")
            .bind(email_id)
            .fetch_one(pool)
            .await?;

    Ok(MessageStats {
        email_id: email_id.to_string(),
        opens,
        clicks,
        unique_clickers,
    })
}
