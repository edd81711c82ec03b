//! Gmail REST transport: base64url-encoded RFC822 submitted over HTTPS with
//! a bearer token from the stored sender account.

use anyhow::anyhow;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::services::{credential_service, sender_service};

use super::{build_mime, MailTransport, OutboundEmail, TransportError};

const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

pub struct GmailApiTransport {
    http: reqwest::Client,
    pool: SqlitePool,
    account_id: String,
}

impl GmailApiTransport {
    pub fn new(pool: SqlitePool, account_id: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            pool,
            account_id: account_id.to_string(),
        }
    }
}

#[async_trait]
impl MailTransport for GmailApiTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<String, TransportError> {
        let account = sender_service::get_sender(&self.pool, &self.account_id)
            .await
            .map_err(TransportError::Other)?
            .ok_or_else(|| {
                TransportError::Auth(format!("sender account {} not found", self.account_id))
            })?;

        let token = credential_service::valid_access_token(&self.pool, &account)
            .await
            .map_err(|e| TransportError::Auth(e.to_string()))?;

        let (message, _msg_id) = build_mime(email).map_err(TransportError::Other)?;
        let raw = URL_SAFE_NO_PAD.encode(message.formatted());

        let resp = self
            .http
            .post(GMAIL_SEND_URL)
            .bearer_auth(&token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| TransportError::Other(anyhow!(e)))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            warn!(to = %email.to, %status, "gmail send rejected the access token");
            return Err(TransportError::Auth(format!("gmail returned {}", status)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Rejected(format!("{}: {}", status, body)));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TransportError::Other(anyhow!(e)))?;
        let provider_id = body["id"]
            .as_str()
            .ok_or_else(|| TransportError::Rejected("gmail response missing message id".into()))?
            .to_string();

        debug!(to = %email.to, provider_id, "gmail accepted message");
        Ok(provider_id)
    }

    async fn refresh_credentials(&self) -> Result<(), TransportError> {
        credential_service::force_refresh(&self.pool, &self.account_id)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Auth(e.to_string()))
    }
}
