//! Telemetry batch shape shared by the emitter and the collector

use super::event::EventParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    pub name: String,
    #[serde(default)]
    pub params: EventParams,
}

/// One request body: `{ client_id, user_id?, events, user_properties? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub events: Vec<WireEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_properties: Option<EventParams>,
}

impl TelemetryBatch {
    pub fn single(client_id: impl Into<String>, name: impl Into<String>, params: EventParams) -> Self {
        Self {
            client_id: client_id.into(),
            user_id: None,
            events: vec![WireEvent {
                name: name.into(),
                params,
            }],
            user_properties: None,
        }
    }
}
