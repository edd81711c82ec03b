use anyhow::Result;
/// Sender account model: the transport credential holder for outbound mail
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Gmail,
    #[default]
    Smtp,
}

impl TransportKind {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "gmail" => Self::Gmail,
            _ => Self::Smtp,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Gmail => "gmail",
            Self::Smtp => "smtp",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderAccount {
    pub id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub transport: TransportKind,
    pub smtp_host: String,
    pub smtp_port: u16,
    #[serde(skip_serializing)]
    pub credentials_encrypted: String, // Base64 encoded "email:password"
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<i64>,
    /// Bumped on every persisted refresh; the compare-and-swap guard against
    /// concurrent dispatches overwriting a fresher token.
    pub token_version: i64,
    pub enabled: bool,
    pub created_at: i64,
    pub updated_at: i64,

    // Populated from credentials_encrypted on demand
    #[serde(skip)]
    pub password: String,
}

impl SenderAccount {
    /// Generate account ID from email
    pub fn generate_id(email: &str) -> String {
        format!("snd_{}", email.replace('@', "_").replace('.', "_"))
    }

    /// Load account and decode password
    pub fn with_password(mut self) -> Result<Self> {
        if self.credentials_encrypted.is_empty() {
            return Ok(self);
        }
        let (_, password) = Self::decode_credentials(&self.credentials_encrypted)?;
        self.password = password;
        Ok(self)
    }

    /// Encode credentials (simple base64, upgrade to OS keychain later)
    pub fn encode_credentials(email: &str, password: &str) -> String {
        use base64::Engine;
        let creds = format!("{}:{}", email, password);
        base64::engine::general_purpose::STANDARD.encode(creds.as_bytes())
    }

    /// Decode credentials
    pub fn decode_credentials(encoded: &str) -> Result<(String, String)> {
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        let creds = String::from_utf8(decoded)?;
        let parts: Vec<&str> = creds.splitn(2, ':').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid credentials format");
        }
        Ok((parts[0].to_string(), parts[1].to_string()))
    }

    pub fn transport_str(&self) -> String {
        self.transport.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_roundtrip() {
        let encoded = SenderAccount::encode_credentials("a@x.com", "p:with:colons");
        let (email, password) = SenderAccount::decode_credentials(&encoded).unwrap();
        assert_eq!(email, "a@x.com");
        assert_eq!(password, "p:with:colons");
    }

    #[test]
    fn generate_id_is_stable() {
        assert_eq!(
            SenderAccount::generate_id("a.b@x.com"),
            "snd_a_b_x_com".to_string()
        );
    }
}
