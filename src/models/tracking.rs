use serde::{Deserialize, Serialize};

/// One logical send operation covering the whole recipient set. Written once
/// before the per-recipient loop, never mutated by this subsystem afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrackedMessage {
    pub id: String,
    pub user_id: String,
    pub campaign_id: Option<String>,
    /// Denormalized, comma-joined recipient list.
    pub recipients: String,
    pub subject: String,
    pub sent_at: i64,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OpenEvent {
    pub id: i64,
    pub email_id: String,
    pub recipient: String,
    pub opened_at: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClickEvent {
    pub id: i64,
    pub email_id: String,
    pub recipient: String,
    pub url: String,
    pub clicked_at: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Request metadata captured from the unauthenticated tracking endpoints.
#[derive(Debug, Clone, Default)]
pub struct EventMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Outcome of one recipient's delivery attempt. Failures are carried in the
/// dispatch report instead of being dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecipientOutcome {
    Sent {
        recipient: String,
        provider_id: String,
    },
    Failed {
        recipient: String,
        reason: String,
    },
}

impl RecipientOutcome {
    pub fn provider_id(&self) -> Option<&str> {
        match self {
            Self::Sent { provider_id, .. } => Some(provider_id),
            Self::Failed { .. } => None,
        }
    }
}
