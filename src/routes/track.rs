/// Open/click tracking endpoints. Unauthenticated, fetched by remote mail
/// clients: they answer fast and never surface a tracking-store failure.
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;

use crate::models::tracking::{ClickEvent, EventMeta, OpenEvent, TrackedMessage};
use crate::services::tracking_service::{self, MessageStats};

/// Fixed 1x1 transparent PNG served to every beacon fetch.
pub const TRANSPARENT_PIXEL: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

fn meta_from_headers(headers: &HeaderMap) -> EventMeta {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    EventMeta {
        ip_address,
        user_agent,
    }
}

fn pixel_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, proxy-revalidate",
            ),
            (header::PRAGMA, "no-cache"),
            (header::EXPIRES, "0"),
        ],
        TRANSPARENT_PIXEL,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct OpenParams {
    pub id: Option<String>,
    pub r: Option<String>,
    /// Cache-busting timestamp; carried by the beacon URL, unused here.
    pub t: Option<String>,
}

/// GET /track/open - upsert the open, always answer with the pixel
pub async fn track_open(
    State(pool): State<SqlitePool>,
    Query(params): Query<OpenParams>,
    headers: HeaderMap,
) -> Response {
    let (email_id, recipient) = match (params.id, params.r) {
        (Some(id), Some(r)) if !id.is_empty() && !r.is_empty() => (id, r),
        _ => return (StatusCode::BAD_REQUEST, "missing id or r").into_response(),
    };

    let meta = meta_from_headers(&headers);
    let opened_at = crate::db::now_epoch();
    if let Err(e) = tracking_service::record_open(&pool, &email_id, &recipient, opened_at, &meta).await
    {
        // Best-effort telemetry: the mail client still gets its image.
        warn!(email_id = %email_id, error = %e, "open event not recorded");
    }

    pixel_response()
}

#[derive(Debug, Deserialize)]
pub struct ClickParams {
    pub email_id: Option<String>,
    pub recipient: Option<String>,
    pub url: Option<String>,
}

/// GET /track/click - append the click, then redirect to the destination
/// carried in the `url` parameter (never to this request's own URL).
pub async fn track_click(
    State(pool): State<SqlitePool>,
    Query(params): Query<ClickParams>,
    headers: HeaderMap,
) -> Response {
    let (email_id, recipient, url) = match (params.email_id, params.recipient, params.url) {
        (Some(e), Some(r), Some(u)) if !e.is_empty() && !r.is_empty() && !u.is_empty() => (e, r, u),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                "missing email_id, recipient or url",
            )
                .into_response()
        }
    };

    let meta = meta_from_headers(&headers);
    let clicked_at = crate::db::now_epoch();
    if let Err(e) =
        tracking_service::record_click(&pool, &email_id, &recipient, &url, clicked_at, &meta).await
    {
        // Navigation beats telemetry: log and redirect anyway.
        warn!(email_id = %email_id, error = %e, "click event not recorded");
    }

    match HeaderValue::from_str(&url) {
        Ok(location) => {
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(header::LOCATION, location);
            response
        }
        Err(_) => (StatusCode::BAD_REQUEST, "invalid destination url").into_response(),
    }
}

/// GET /track/stats/:email_id - aggregate counters for one send
pub async fn message_stats(
    State(pool): State<SqlitePool>,
    Path(email_id): Path<String>,
) -> Result<Json<MessageStats>, (StatusCode, String)> {
    tracking_service::message_stats(&pool, &email_id)
        .await
        .map(Json)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
            )
        })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvents {
    pub message: TrackedMessage,
    pub opens: Vec<OpenEvent>,
    pub clicks: Vec<ClickEvent>,
}

/// GET /track/events/:email_id - the send row with its recorded events
pub async fn message_events(
    State(pool): State<SqlitePool>,
    Path(email_id): Path<String>,
) -> Result<Json<MessageEvents>, (StatusCode, String)> {
    let db_err = |e: anyhow::Error| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Database error: {}", e),
        )
    };

    let message = tracking_service::get_message(&pool, &email_id)
        .await
        .map_err(db_err)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                format!("Message {} not found", email_id),
            )
        })?;
    let opens = tracking_service::opens_for_message(&pool, &email_id)
        .await
        .map_err(db_err)?;
    let clicks = tracking_service::clicks_for_message(&pool, &email_id)
        .await
        .map_err(db_err)?;

    Ok(Json(MessageEvents {
        message,
        opens,
        clicks,
    }))
}
