//! Telemetry intake

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use dialtrack_common::analytics::TelemetryBatch;
use tracing::warn;

use super::ApiError;
use crate::{db, AppState};

/// POST /collect
///
/// Stores one row per event. A batch without a client id is rejected.
pub async fn collect(
    State(state): State<AppState>,
    Json(batch): Json<TelemetryBatch>,
) -> Result<StatusCode, ApiError> {
    if batch.client_id.trim().is_empty() {
        return Err(ApiError::BadRequest("client_id is required".to_string()));
    }

    db::insert_batch(&state.db, &batch, Utc::now())
        .await
        .map_err(|e| {
            warn!("Failed to store telemetry batch: {:#}", e);
            ApiError::DatabaseError(e.to_string())
        })?;

    Ok(StatusCode::NO_CONTENT)
}
