//! Durable anonymous client identity
//!
//! The identifier is minted once from the secure random source, persisted in
//! local (durable) storage, and returned unchanged forever after. If it can
//! neither be read nor durably written, identity is "unavailable" and all
//! analytics are skipped. A transient id would regenerate on the next page
//! load and split one visitor into many.

use crate::storage::{keys, Storage};
use crate::uuid_utils::IdSource;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Opaque client identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wrap an existing identifier; empty or whitespace-only input is rejected
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Return the persisted client id, generating and persisting one if absent
pub fn get_or_create(storage: &mut dyn Storage, ids: &dyn IdSource) -> Option<ClientId> {
    match storage.get(keys::CLIENT_ID) {
        Ok(Some(existing)) => {
            if let Some(id) = ClientId::new(existing) {
                return Some(id);
            }
            debug!("Stored client id is blank, minting a new one");
        }
        Ok(None) => {}
        Err(e) => {
            warn!("Client identity unavailable (storage read failed): {}", e);
            return None;
        }
    }

    let Some(generated) = ids.random_id() else {
        warn!("Client identity unavailable (no secure random source)");
        return None;
    };
    let id = ClientId(generated.to_string());

    if let Err(e) = storage.set(keys::CLIENT_ID, id.as_str()) {
        warn!("Client identity unavailable (storage write failed): {}", e);
        return None;
    }

    debug!(client_id = %id, "Minted new client identity");
    Some(id)
}
