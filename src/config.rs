use std::env;

use crate::models::sender::TransportKind;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Public host the beacon and click links point at.
    pub tracking_base_url: String,
    /// Bearer key required on the dispatch endpoint.
    pub api_key: String,
    /// Tenant id stamped on email_tracking rows.
    pub user_id: String,
    pub from_address: String,
    pub transport: TransportKind,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://mailbeam.db".into());
        let tracking_base_url =
            env::var("TRACKING_BASE_URL").unwrap_or_else(|_| "http://localhost:3030".into());
        let api_key = env::var("API_KEY").expect("API_KEY must be set");
        let user_id = env::var("TENANT_USER_ID").unwrap_or_else(|_| "default".into());
        let transport =
            TransportKind::from_str(&env::var("MAIL_TRANSPORT").unwrap_or_else(|_| "smtp".into()));
        let smtp_host = env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".into());
        let smtp_port = env::var("SMTP_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(587);
        let (smtp_username, smtp_password) = match transport {
            TransportKind::Smtp => (
                env::var("SMTP_USERNAME").expect("SMTP_USERNAME must be set"),
                env::var("SMTP_PASSWORD").expect("SMTP_PASSWORD must be set"),
            ),
            TransportKind::Gmail => (
                env::var("SMTP_USERNAME").unwrap_or_default(),
                env::var("SMTP_PASSWORD").unwrap_or_default(),
            ),
        };
        let from_address = env::var("FROM_ADDRESS")
            .or_else(|_| env::var("SENDER_EMAIL"))
            .unwrap_or_else(|_| smtp_username.clone());
        let port = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3030);

        Config {
            database_url,
            tracking_base_url,
            api_key,
            user_id,
            from_address,
            transport,
            smtp_host,
            smtp_port,
            smtp_username,
            smtp_password,
            port,
        }
    }
}
