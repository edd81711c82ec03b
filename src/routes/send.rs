/// Dispatch entry point
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::models::content::ContentBlock;
use crate::models::tracking::RecipientOutcome;
use crate::render;
use crate::services::dispatch_service::{self, DispatchError, DispatchRequest};
use crate::AppState;

/// `to` accepts a single address or a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    Many(Vec<String>),
    One(String),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Many(v) => v,
            Self::One(s) => vec![s],
        }
    }
}

/// `body` accepts structured blocks or a serialized block list. A string
/// that fails to parse as blocks falls back to the fixed greeting body.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum BodyInput {
    Blocks(Vec<ContentBlock>),
    Serialized(String),
}

fn default_tracking() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub to: OneOrMany,
    pub subject: String,
    pub body: BodyInput,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default = "default_tracking")]
    pub tracking_enabled: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub message_ids: Vec<String>,
    pub email_id: Option<String>,
    pub tracking_enabled: bool,
    /// Per-recipient result, failures included.
    pub outcomes: Vec<RecipientOutcome>,
}

fn authorized(headers: &HeaderMap, api_key: &str) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == api_key)
        .unwrap_or(false)
}

/// POST /send - personalize, hand off to the transport, report outcomes
pub async fn send_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SendRequest>,
) -> Response {
    if !authorized(&headers, &state.config.api_key) {
        return (StatusCode::UNAUTHORIZED, "invalid or missing api key").into_response();
    }

    let to = req.to.into_vec();
    if to.is_empty() {
        return (StatusCode::BAD_REQUEST, "no recipients").into_response();
    }

    let body_html = match &req.body {
        BodyInput::Blocks(blocks) => render::render_blocks(blocks),
        BodyInput::Serialized(s) => render::render_serialized(s),
    };

    let request = DispatchRequest {
        user_id: state.config.user_id.clone(),
        from: state.config.from_address.clone(),
        to,
        subject: req.subject,
        body_html,
        campaign_id: req.campaign_id,
        tracking_enabled: req.tracking_enabled,
    };

    match dispatch_service::dispatch(
        &state.pool,
        state.transport.as_ref(),
        &state.config.tracking_base_url,
        &request,
    )
    .await
    {
        Ok(report) => Json(SendResponse {
            success: true,
            message_ids: report.provider_ids,
            email_id: Some(report.message_id),
            tracking_enabled: report.tracking_enabled,
            outcomes: report.outcomes,
        })
        .into_response(),
        Err(DispatchError::Auth(msg)) => {
            tracing::warn!(error = %msg, "dispatch refused: transport auth");
            (StatusCode::UNAUTHORIZED, "transport authentication failed").into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "dispatch failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}
