//! HTTP API handlers for dialtrack-collector

pub mod collect;
pub mod events;
pub mod health;

pub use collect::collect;
pub use events::list_events;
pub use health::health_routes;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API errors rendered as `{ "error": message }`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    DatabaseError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::DatabaseError(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, format!("Database error: {}", msg))
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
