//! Outbound mail transports. The dispatch loop talks to a `MailTransport`
//! and treats `Auth` errors as fatal to the whole send, `Rejected` as a
//! per-recipient skip.

use anyhow::Result;
use async_trait::async_trait;
use lettre::message::header::{ContentType, Header, HeaderName, HeaderValue, MessageId};
use lettre::message::Mailbox;
use lettre::Message;
use thiserror::Error;
use uuid::Uuid;

pub mod gmail;
pub mod smtp;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Credential problem. Fatal to the whole dispatch, surfaced as 401.
    #[error("transport authentication failed: {0}")]
    Auth(String),
    /// Provider rejected this one recipient/message. The loop continues.
    #[error("transport rejected message: {0}")]
    Rejected(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One personalized outbound message, ready for MIME construction.
#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub tracking_enabled: bool,
}

/// Marker header recipients' filters can key on when tracking is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackingFlag(pub bool);

impl Header for TrackingFlag {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Mailbeam-Tracking")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Self(s.trim().eq_ignore_ascii_case("enabled")))
    }

    fn display(&self) -> HeaderValue {
        let value = if self.0 { "enabled" } else { "disabled" };
        HeaderValue::new(Self::name(), value.to_string())
    }
}

/// Build a MIME message with an explicit Message-Id. Returns (message, message_id).
pub fn build_mime(email: &OutboundEmail) -> Result<(Message, String)> {
    let from_mb: Mailbox = email.from.parse()?;
    let to_mb: Mailbox = email.to.parse()?;
    let domain = email.from.split('@').nth(1).unwrap_or("mailbeam.local");
    let domain = domain.trim_end_matches('>');
    let msg_id_value = format!("{}@{}", Uuid::new_v4(), domain);

    let mut builder = Message::builder()
        .from(from_mb)
        .to(to_mb)
        .subject(email.subject.clone())
        .header(ContentType::TEXT_HTML)
        .header(MessageId::from(msg_id_value.clone()));
    if email.tracking_enabled {
        builder = builder.header(TrackingFlag(true));
    }

    let message = builder.body(email.html_body.clone())?;
    Ok((message, msg_id_value))
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Deliver one message. Returns the provider-assigned message id.
    async fn send(&self, email: &OutboundEmail) -> Result<String, TransportError>;

    /// Refresh the transport credential. The dispatch loop invokes this at
    /// most once per dispatch after an `Auth` error.
    async fn refresh_credentials(&self) -> Result<(), TransportError> {
        Err(TransportError::Auth(
            "credential refresh not supported by this transport".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_carries_tracking_header_when_enabled() {
        let email = OutboundEmail {
            from: "no-reply@mailbeam.dev".into(),
            to: "a@x.com".into(),
            subject: "Hi".into(),
            html_body: "<html><body><p>Hi</p></body></html>".into(),
            tracking_enabled: true,
        };
        let (message, msg_id) = build_mime(&email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("X-Mailbeam-Tracking: enabled"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains(&msg_id));
        assert!(msg_id.ends_with("@mailbeam.dev"));
    }

    #[test]
    fn mime_omits_tracking_header_when_disabled() {
        let email = OutboundEmail {
            from: "no-reply@mailbeam.dev".into(),
            to: "a@x.com".into(),
            subject: "Hi".into(),
            html_body: "<html><body><p>Hi</p></body></html>".into(),
            tracking_enabled: false,
        };
        let (message, _) = build_mime(&email).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(!raw.contains("X-Mailbeam-Tracking"));
    }
}
