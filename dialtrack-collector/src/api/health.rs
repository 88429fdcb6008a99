//! Health check endpoint
//!
//! Reports `degraded` rather than failing when the event database stops
//! answering, so monitors can tell a stuck store from a dead process.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tracing::warn;

use crate::{db, AppState};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`
    pub status: String,
    pub module: String,
    pub version: String,
    /// Commit the running binary was built from
    pub build: String,
    /// `ok` or `unavailable`
    pub database: String,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database_ok = match db::ping(&state.db).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Event database unreachable: {:#}", e);
            false
        }
    };

    Json(HealthResponse {
        status: if database_ok { "ok" } else { "degraded" }.to_string(),
        module: "dialtrack-collector".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: env!("GIT_HASH").to_string(),
        database: if database_ok { "ok" } else { "unavailable" }.to_string(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
