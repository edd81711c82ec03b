pub mod config;
pub mod db;
pub mod models;
pub mod oauth;
pub mod render;
pub mod routes;
pub mod services;
pub mod telemetry;
pub mod tracking;
pub mod transport;

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::transport::MailTransport;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: Arc<Config>,
    pub transport: Arc<dyn MailTransport>,
}

impl axum::extract::FromRef<AppState> for sqlx::SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// Assemble the service router. Integration tests drive this directly.
pub fn app(state: AppState) -> Router {
    routes::routes()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
