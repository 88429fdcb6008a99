//! dialtrack-collector library - telemetry intake service
//!
//! Accepts event batches from the tracker's HTTP transport, stores them in
//! SQLite, and serves a filtered event query.

use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod db;

/// Default listen port
pub const DEFAULT_PORT: u16 = 5790;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Event database pool
    pub db: SqlitePool,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/collect", post(api::collect))
        .route("/api/events", get(api::list_events))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
