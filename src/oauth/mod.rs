//! Mail-provider OAuth2: refresh-token exchange for the Gmail transport.
//! The interactive authorization flow lives outside this service; we only
//! keep stored tokens fresh.

use anyhow::{anyhow, Result};
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::{Deserialize, Serialize};

/// Seconds before nominal expiry at which a token is treated as expired.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
    pub token_type: String,
}

/// Google endpoints; client id/secret come from the environment.
pub fn provider_config() -> OAuthConfig {
    OAuthConfig {
        client_id: std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
        client_secret: std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
        auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
        token_url: "https://oauth2.googleapis.com/token".to_string(),
    }
}

/// Exchange a refresh token for a fresh access token.
pub async fn refresh_access_token(refresh_token: &str) -> Result<OAuthTokens> {
    let config = provider_config();

    let client = BasicClient::new(
        ClientId::new(config.client_id),
        Some(ClientSecret::new(config.client_secret)),
        AuthUrl::new(config.auth_url).map_err(|e| anyhow!(e))?,
        Some(TokenUrl::new(config.token_url).map_err(|e| anyhow!(e))?),
    );

    let token_result = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request_async(async_http_client)
        .await
        .map_err(|e| anyhow!("Token refresh failed: {}", e))?;

    Ok(OAuthTokens {
        access_token: token_result.access_token().secret().clone(),
        refresh_token: token_result
            .refresh_token()
            .map(|t| t.secret().clone())
            .or_else(|| Some(refresh_token.to_string())), // Keep old refresh token if not returned
        expires_at: token_result
            .expires_in()
            .map(|d| chrono::Utc::now().timestamp() + d.as_secs() as i64),
        token_type: "Bearer".to_string(),
    })
}

/// Is this expiry timestamp inside the refresh buffer? Missing expiry is
/// treated as still valid.
pub fn is_expired(expires_at: Option<i64>) -> bool {
    expires_at
        .map(|exp| exp < chrono::Utc::now().timestamp() + EXPIRY_BUFFER_SECS)
        .unwrap_or(false)
}
