//! Dispatch loop: one TrackedMessage row up front, then sequential
//! per-recipient personalization and transport handoff. One recipient's
//! rejection never aborts the rest; an authentication failure does.

use anyhow::Result;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::tracking::{RecipientOutcome, TrackedMessage};
use crate::tracking;
use crate::transport::{MailTransport, OutboundEmail, TransportError};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Expired or rejected transport credential after the single
    /// refresh-and-retry. Fatal to the whole dispatch.
    #[error("transport authentication failed: {0}")]
    Auth(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub user_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    /// Rendered base HTML, shared by all recipients before personalization.
    pub body_html: String,
    pub campaign_id: Option<String>,
    pub tracking_enabled: bool,
}

#[derive(Debug)]
pub struct DispatchReport {
    /// The shared tracked-message id, generated once per dispatch.
    pub message_id: String,
    /// Provider ids of successful sends; order follows attempt order.
    pub provider_ids: Vec<String>,
    /// Tagged outcome per recipient, failures included.
    pub outcomes: Vec<RecipientOutcome>,
    pub tracking_enabled: bool,
}

pub async fn dispatch(
    pool: &SqlitePool,
    transport: &dyn MailTransport,
    tracking_base_url: &str,
    req: &DispatchRequest,
) -> Result<DispatchReport, DispatchError> {
    let message_id = Uuid::new_v4().to_string();
    let sent_at = crate::db::now_epoch();

    // The send row goes in before any recipient attempt so the tracking
    // endpoints have something to reference even if the loop dies halfway.
    let tracked = TrackedMessage {
        id: message_id.clone(),
        user_id: req.user_id.clone(),
        campaign_id: req.campaign_id.clone(),
        recipients: req.to.join(", "),
        subject: req.subject.clone(),
        sent_at,
        status: "sent".to_string(),
    };
    crate::services::tracking_service::record_send(pool, &tracked).await?;

    let mut outcomes: Vec<RecipientOutcome> = Vec::with_capacity(req.to.len());
    let mut refreshed_once = false;

    for recipient in &req.to {
        let html_body = if req.tracking_enabled {
            tracking::inject(
                &req.body_html,
                &message_id,
                recipient,
                tracking_base_url,
                chrono::Utc::now().timestamp_millis(),
            )
        } else {
            req.body_html.clone()
        };

        let email = OutboundEmail {
            from: req.from.clone(),
            to: recipient.clone(),
            subject: req.subject.clone(),
            html_body,
            tracking_enabled: req.tracking_enabled,
        };

        let mut attempt = transport.send(&email).await;
        if matches!(attempt, Err(TransportError::Auth(_))) && !refreshed_once {
            refreshed_once = true;
            warn!(message_id, "transport credential rejected, refreshing once");
            transport
                .refresh_credentials()
                .await
                .map_err(|e| DispatchError::Auth(e.to_string()))?;
            attempt = transport.send(&email).await;
        }

        match attempt {
            Ok(provider_id) => {
                info!(message_id, to = %recipient, provider_id, "recipient sent");
                outcomes.push(RecipientOutcome::Sent {
                    recipient: recipient.clone(),
                    provider_id,
                });
            }
            Err(TransportError::Auth(msg)) => return Err(DispatchError::Auth(msg)),
            Err(e) => {
                warn!(message_id, to = %recipient, error = %e, "recipient skipped");
                outcomes.push(RecipientOutcome::Failed {
                    recipient: recipient.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    // Campaign side effect runs regardless of per-recipient outcomes. The
    // mail is already out, so a store hiccup here is logged, not surfaced.
    if let Some(campaign_id) = &req.campaign_id {
        let now = crate::db::now_epoch();
        let updated = sqlx::query(
            "UPDATE campaigns SET status = 'sent', sent_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(campaign_id)
        .execute(pool)
        .await;
        match updated {
            Ok(r) if r.rows_affected() == 0 => {
                warn!(campaign_id, "dispatch referenced unknown campaign")
            }
            Ok(_) => info!(campaign_id, "campaign marked sent"),
            Err(e) => warn!(campaign_id, error = %e, "campaign status update failed"),
        }
    }

    let provider_ids = outcomes
        .iter()
        .filter_map(|o| o.provider_id().map(String::from))
        .collect();

    Ok(DispatchReport {
        message_id,
        provider_ids,
        outcomes,
        tracking_enabled: req.tracking_enabled,
    })
}
