//! SMTP relay transport via lettre. The provider id is the generated
//! Message-Id, since SMTP assigns none of its own.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{Message, SmtpTransport, Transport};
use tracing::warn;

use super::{build_mime, MailTransport, OutboundEmail, TransportError};

pub struct SmtpRelayTransport {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl SmtpRelayTransport {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: host.to_string(),
            port,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    fn build_mailer(&self) -> Result<SmtpTransport, TransportError> {
        // Trim whitespace that may sneak in from copied app passwords
        let clean_password: String = self.password.chars().filter(|c| !c.is_whitespace()).collect();
        let creds = Credentials::new(self.username.clone(), clean_password);

        let tls = TlsParameters::builder(self.host.clone())
            .build()
            .map_err(|e| TransportError::Other(anyhow::anyhow!(e)))?;

        let mut builder = match SmtpTransport::relay(&self.host) {
            Ok(b) => b,
            Err(_) => SmtpTransport::builder_dangerous(&self.host),
        };

        let client_id = std::env::var("SMTP_HELLO_NAME")
            .ok()
            .map(ClientId::Domain)
            .unwrap_or_else(|| ClientId::Domain(self.host.clone()));

        builder = builder
            .port(self.port)
            .hello_name(client_id)
            .authentication(vec![Mechanism::Plain, Mechanism::Login])
            .credentials(creds)
            .timeout(Some(std::time::Duration::from_secs(20)));

        let builder = if self.port == 465 {
            builder.tls(Tls::Wrapper(tls))
        } else {
            builder.tls(Tls::Required(tls))
        };

        Ok(builder.build())
    }
}

fn classify_smtp_error(e: &lettre::transport::smtp::Error) -> TransportError {
    let msg = e.to_string();
    let lowered = msg.to_lowercase();
    if lowered.contains("auth") || lowered.contains("535") {
        TransportError::Auth(msg)
    } else {
        TransportError::Rejected(msg)
    }
}

#[async_trait]
impl MailTransport for SmtpRelayTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<String, TransportError> {
        let (message, msg_id): (Message, String) =
            build_mime(email).map_err(TransportError::Other)?;
        let mailer = self.build_mailer()?;

        // lettre's sync transport blocks; keep it off the async workers.
        let to = email.to.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| TransportError::Other(anyhow::anyhow!(e)))?;

        match result {
            Ok(_) => Ok(msg_id),
            Err(e) => {
                warn!(to = %to, error = %e, "smtp relay refused message");
                Err(classify_smtp_error(&e))
            }
        }
    }
}
