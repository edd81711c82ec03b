use axum::{
    routing::{get, post},
    Router,
};

pub mod send;
pub mod track;

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/send", post(send::send_email))
        .route("/track/open", get(track::track_open))
        .route("/track/click", get(track::track_click))
        .route("/track/stats/:email_id", get(track::message_stats))
        .route("/track/events/:email_id", get(track::message_events))
}
