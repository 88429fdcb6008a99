//! Event normalization and emission
//!
//! `send` is best-effort: with no client identity the event is dropped with a
//! warning, and transmission happens off the caller's path. Every event gets
//! the standard page context plus the current session and attribution tags;
//! caller-supplied parameters with the same name take precedence.

use super::event::{EventParams, StandardEvent};
use super::transport::Transport;
use super::wire::TelemetryBatch;
use crate::identity::ClientId;
use crate::time::Clock;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Page the events are attributed to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageContext {
    pub path: String,
    pub title: String,
    pub location: String,
}

/// Session and attribution tags attached to every event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventTags {
    pub session_id: Option<Uuid>,
    pub number_id: Option<String>,
    pub attribution: Vec<(&'static str, String)>,
}

pub struct AnalyticsEmitter {
    client_id: Option<ClientId>,
    user_id: Option<String>,
    page: PageContext,
    tags: EventTags,
    clock: Arc<dyn Clock + Send + Sync>,
    transport: Arc<dyn Transport>,
}

impl AnalyticsEmitter {
    pub fn new(transport: Arc<dyn Transport>, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        Self {
            client_id: None,
            user_id: None,
            page: PageContext::default(),
            tags: EventTags::default(),
            clock,
            transport,
        }
    }

    pub fn set_client_id(&mut self, client_id: Option<ClientId>) {
        self.client_id = client_id;
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    /// Authenticated user id forwarded with each batch
    pub fn set_user_id(&mut self, user_id: Option<String>) {
        self.user_id = user_id.filter(|u| !u.trim().is_empty());
    }

    pub fn set_page(&mut self, page: PageContext) {
        self.page = page;
    }

    pub fn page(&self) -> &PageContext {
        &self.page
    }

    pub fn set_tags(&mut self, tags: EventTags) {
        self.tags = tags;
    }

    pub fn tags(&self) -> &EventTags {
        &self.tags
    }

    /// Emit one event; returns whether it was handed to the transport
    pub fn send(&self, name: &str, params: EventParams) -> bool {
        match self.build_batch(name, params) {
            Some(batch) => {
                self.transport.transmit(batch);
                true
            }
            None => false,
        }
    }

    pub fn send_standard(&self, event: StandardEvent, params: EventParams) -> bool {
        self.send(event.as_str(), params)
    }

    /// Emit with loosely typed parameters (nulls dropped, nested values stringified)
    pub fn send_json(&self, name: &str, params: Value) -> bool {
        self.send(name, EventParams::from_json(params))
    }

    fn build_batch(&self, name: &str, mut params: EventParams) -> Option<TelemetryBatch> {
        let name = name.trim();
        if name.is_empty() {
            warn!("Dropping analytics event with empty name");
            return None;
        }
        let Some(client_id) = &self.client_id else {
            warn!(event = name, "Client identity unavailable, dropping analytics event");
            return None;
        };

        params.insert_default("page_path", self.page.path.as_str());
        params.insert_default("page_title", self.page.title.as_str());
        params.insert_default("page_location", self.page.location.as_str());
        params.insert_default("timestamp_ms", self.clock.now().timestamp_millis());

        if let Some(session_id) = self.tags.session_id {
            params.insert_default("tracking_session_id", session_id.to_string());
        }
        if let Some(number_id) = &self.tags.number_id {
            params.insert_default("tracking_number_id", number_id.as_str());
        }
        for (key, value) in &self.tags.attribution {
            params.insert_default(*key, value.as_str());
        }

        debug!(event = name, params = params.len(), "Emitting analytics event");

        let mut batch = TelemetryBatch::single(client_id.as_str(), name, params);
        batch.user_id = self.user_id.clone();
        Some(batch)
    }
}
