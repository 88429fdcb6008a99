//! Delivery of telemetry batches to the collector
//!
//! Transmission is fire-and-forget: `transmit` returns immediately, failures
//! are logged and the batch is dropped. Nothing is retried.

use super::wire::{TelemetryBatch, WireEvent};
use crate::config::TelemetryConfig;
use crate::{Error, Result};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use url::Url;

const USER_AGENT: &str = concat!("dialtrack/", env!("CARGO_PKG_VERSION"));

pub trait Transport: Send + Sync {
    fn transmit(&self, batch: TelemetryBatch);
}

/// JSON POST to the collector endpoint on a background task
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http_client: reqwest::Client,
    endpoint: Url,
}

impl HttpTransport {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let endpoint = collector_url(config)?;
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Transmit(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    async fn post(client: reqwest::Client, endpoint: Url, batch: TelemetryBatch) -> Result<()> {
        let response = client
            .post(endpoint)
            .json(&batch)
            .send()
            .await
            .map_err(|e| Error::Transmit(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Transmit(format!(
                "collector responded {}: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(())
    }
}

impl Transport for HttpTransport {
    fn transmit(&self, batch: TelemetryBatch) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!(
                    events = batch.events.len(),
                    "No async runtime available, dropping telemetry batch"
                );
                return;
            }
        };

        let client = self.http_client.clone();
        let endpoint = self.endpoint.clone();
        runtime.spawn(async move {
            let count = batch.events.len();
            match Self::post(client, endpoint, batch).await {
                Ok(()) => debug!(events = count, "Telemetry batch delivered"),
                Err(e) => warn!(events = count, "Telemetry batch dropped: {}", e),
            }
        });
    }
}

/// Endpoint with measurement id and api secret appended as query parameters
fn collector_url(config: &TelemetryConfig) -> Result<Url> {
    let mut url = Url::parse(config.endpoint.trim()).map_err(|e| {
        Error::Config(format!("Invalid telemetry endpoint '{}': {}", config.endpoint, e))
    })?;

    let extra: Vec<(&str, &str)> = [
        ("measurement_id", config.measurement_id.as_deref()),
        ("api_secret", config.api_secret.as_deref()),
    ]
    .into_iter()
    .filter_map(|(k, v)| v.map(str::trim).filter(|v| !v.is_empty()).map(|v| (k, v)))
    .collect();

    if !extra.is_empty() {
        url.query_pairs_mut().extend_pairs(extra);
    }
    Ok(url)
}

/// Discards every batch (telemetry disabled)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn transmit(&self, batch: TelemetryBatch) {
        debug!(events = batch.events.len(), "Telemetry disabled, batch discarded");
    }
}

/// Keeps batches in memory
///
/// Clones share one buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    batches: Arc<Mutex<Vec<TelemetryBatch>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<TelemetryBatch> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Every event across all batches, in transmission order
    pub fn events(&self) -> Vec<WireEvent> {
        self.batches().into_iter().flat_map(|b| b.events).collect()
    }

    pub fn event_names(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.name).collect()
    }

    /// Events named `name`
    pub fn events_named(&self, name: &str) -> Vec<WireEvent> {
        self.events().into_iter().filter(|e| e.name == name).collect()
    }

    pub fn clear(&self) {
        if let Ok(mut batches) = self.batches.lock() {
            batches.clear();
        }
    }
}

impl Transport for MemoryTransport {
    fn transmit(&self, batch: TelemetryBatch) {
        match self.batches.lock() {
            Ok(mut batches) => batches.push(batch),
            Err(poisoned) => poisoned.into_inner().push(batch),
        }
    }
}

/// Transport for a telemetry configuration
///
/// A disabled section or an unusable endpoint yields [`NullTransport`].
pub fn from_config(config: &TelemetryConfig) -> Arc<dyn Transport> {
    if !config.enabled {
        return Arc::new(NullTransport);
    }
    match HttpTransport::new(config) {
        Ok(transport) => Arc::new(transport),
        Err(e) => {
            warn!("Telemetry disabled: {}", e);
            Arc::new(NullTransport)
        }
    }
}
