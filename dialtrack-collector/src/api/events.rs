//! Event query API
//!
//! `exclude_keepalive=true` separates session assignments from the
//! refresh events fired on every page view.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::db::{self, EventFilter, StoredEvent};
use crate::AppState;

/// Query parameters for GET /api/events
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub name: Option<String>,
    pub client_id: Option<String>,
    #[serde(default)]
    pub exclude_keepalive: bool,
    pub limit: Option<u32>,
}

impl From<EventsQuery> for EventFilter {
    fn from(query: EventsQuery) -> Self {
        EventFilter {
            name: query.name.filter(|n| !n.is_empty()),
            client_id: query.client_id.filter(|c| !c.is_empty()),
            exclude_keepalive: query.exclude_keepalive,
            limit: query.limit,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub count: usize,
    pub limit: u32,
    pub events: Vec<StoredEvent>,
}

/// GET /api/events
///
/// Newest first. `limit` defaults to 100 and is capped at 1000.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let filter = EventFilter::from(query);
    let events = db::query_events(&state.db, &filter)
        .await
        .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

    Ok(Json(EventsResponse {
        count: events.len(),
        limit: filter.effective_limit(),
        events,
    }))
}
