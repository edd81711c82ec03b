//! Transport credential upkeep. Refreshes are serialized per account and
//! persisted behind a token_version compare-and-swap, so two concurrent
//! dispatches never both refresh and never clobber a fresher token.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use sqlx::SqlitePool;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::models::sender::SenderAccount;
use crate::oauth;
use crate::services::sender_service;

static REFRESH_LOCKS: Lazy<Arc<RwLock<HashMap<String, Arc<Mutex<()>>>>>> =
    Lazy::new(|| Arc::new(RwLock::new(HashMap::new())));

async fn lock_for(account_id: &str) -> Arc<Mutex<()>> {
    {
        let locks = REFRESH_LOCKS.read().await;
        if let Some(lock) = locks.get(account_id) {
            return lock.clone();
        }
    }
    let mut locks = REFRESH_LOCKS.write().await;
    locks
        .entry(account_id.to_string())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Return an access token that is valid now, refreshing at most once when
/// the stored one is expired or about to expire.
pub async fn valid_access_token(pool: &SqlitePool, account: &SenderAccount) -> Result<String> {
    if !oauth::is_expired(account.token_expires_at) {
        if let Some(token) = &account.access_token {
            return Ok(token.clone());
        }
    }
    refresh_and_persist(pool, &account.id).await
}

/// Refresh regardless of the stored expiry. Used for the dispatch loop's
/// single retry after the provider rejects a token the store thought valid.
pub async fn force_refresh(pool: &SqlitePool, account_id: &str) -> Result<String> {
    refresh_and_persist(pool, account_id).await
}

async fn refresh_and_persist(pool: &SqlitePool, account_id: &str) -> Result<String> {
    let lock = lock_for(account_id).await;
    let _guard = lock.lock().await;

    // Reload under the lock: a concurrent dispatch may have refreshed while
    // we waited.
    let account = sender_service::get_sender(pool, account_id)
        .await?
        .ok_or_else(|| anyhow!("sender account {} not found", account_id))?;
    if !oauth::is_expired(account.token_expires_at) {
        if let Some(token) = &account.access_token {
            return Ok(token.clone());
        }
    }

    let refresh_token = account
        .refresh_token
        .as_deref()
        .ok_or_else(|| anyhow!("Token expired and no refresh token available"))?;

    let tokens = oauth::refresh_access_token(refresh_token).await?;
    let now = crate::db::now_epoch();

    let result = sqlx::query(
        r#"
        UPDATE sender_accounts
        SET access_token = ?, refresh_token = ?, token_expires_at = ?,
            token_version = token_version + 1, updated_at = ?
        WHERE id = ? AND token_version = ?
        "#,
    )
    .bind(&tokens.access_token)
    .bind(&tokens.refresh_token)
    .bind(tokens.expires_at)
    .bind(now)
    .bind(account_id)
    .bind(account.token_version)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        // Lost the version race: someone persisted a fresher token. Use
        // theirs instead of overwriting it.
        warn!(account_id, "token refresh raced, using stored token");
        let fresher = sender_service::get_sender(pool, account_id)
            .await?
            .ok_or_else(|| anyhow!("sender account {} disappeared", account_id))?;
        return fresher
            .access_token
            .ok_or_else(|| anyhow!("refreshed account has no access token"));
    }

    info!(account_id, "access token refreshed");
    Ok(tokens.access_token)
}
