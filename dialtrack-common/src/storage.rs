//! Key/value persistence substrate
//!
//! Two scopes are used by the tracker:
//! - **local**: durable across sessions (client identity, experiment assignments)
//! - **session**: cleared when the browsing session ends (attribution snapshot,
//!   tracking session, A/B exposure set)
//!
//! Any `Err` from a backend means "storage unavailable". Callers degrade to
//! an in-memory, no-persistence state rather than failing.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Well-known storage keys
pub mod keys {
    pub const CLIENT_ID: &str = "dialtrack.client_id";
    pub const EXPERIMENTS: &str = "dialtrack.experiments";
    pub const ATTRIBUTION: &str = "dialtrack.attribution";
    pub const TRACKING_SESSION: &str = "dialtrack.tracking_session";
    pub const AB_EXPOSURES: &str = "dialtrack.ab_exposures";
}

/// String key/value storage
pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// Read and decode a JSON record
///
/// Malformed JSON is treated as absent: the record is discarded and `None`
/// returned so the caller rebuilds it fresh.
pub fn load_json<T: DeserializeOwned>(storage: &mut dyn Storage, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("Storage read failed for '{}': {}", key, e);
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Discarding malformed '{}' record: {}", key, e);
            if let Err(e) = storage.remove(key) {
                debug!("Could not remove malformed '{}' record: {}", key, e);
            }
            None
        }
    }
}

/// Encode and write a JSON record
pub fn save_json<T: Serialize>(storage: &mut dyn Storage, key: &str, value: &T) -> Result<()> {
    let encoded = serde_json::to_string(value)?;
    storage.set(key, &encoded)
}

/// In-process storage (session scope, tests)
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Storage with no backing capability; every call fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStorage;

impl Storage for UnavailableStorage {
    fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::Unavailable("storage access denied".to_string()))
    }

    fn set(&mut self, _key: &str, _value: &str) -> Result<()> {
        Err(Error::Unavailable("storage access denied".to_string()))
    }

    fn remove(&mut self, _key: &str) -> Result<()> {
        Err(Error::Unavailable("storage access denied".to_string()))
    }
}

/// Durable storage persisted as a single JSON object on disk
///
/// Every write rewrites the file through a temporary sibling and a rename.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStorage {
    /// Open (or lazily create) the store at `path`
    ///
    /// A missing file starts empty. A corrupt file is discarded with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        "Discarding corrupt storage file {}: {}",
                        path.display(),
                        e
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self { path, entries })
    }

    /// Default durable store location: `<data_local_dir>/dialtrack/local.json`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("dialtrack").join("local.json"))
            .unwrap_or_else(|| PathBuf::from("./dialtrack_data/local.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let encoded = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, encoded)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        if previous.as_deref() == Some(value) {
            return Ok(());
        }
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}
