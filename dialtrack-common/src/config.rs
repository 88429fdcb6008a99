//! Tracker configuration
//!
//! Loaded from a TOML file resolved in priority order:
//! 1. Explicit path argument (highest priority)
//! 2. `DIALTRACK_CONFIG` environment variable
//! 3. `<config_dir>/dialtrack/config.toml`
//!
//! Every section except `[numbers]` has compiled defaults. The number table
//! has none: a placeholder would replace real numbers on the page, so a
//! missing file is an error rather than a silent default.
//!
//! ```toml
//! [numbers.default]
//! id = "main"
//! display = "(555) 010-0000"
//! dialable = "+15550100000"
//!
//! [numbers.campaigns."spring sale"]
//! id = "spring"
//! display = "(555) 010-2000"
//! dialable = "+15550102000"
//! ```

use crate::tracking::{NumberTable, TableKind, TrackingNumberDefinition};
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a config file
pub const CONFIG_ENV_VAR: &str = "DIALTRACK_CONFIG";

/// One number as written in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct NumberEntry {
    pub id: String,
    pub display: String,
    pub dialable: String,
    #[serde(default)]
    pub label: Option<String>,
}

impl NumberEntry {
    fn into_definition(self, kind: TableKind) -> TrackingNumberDefinition {
        let label = self
            .label
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| kind.default_label().to_string());
        TrackingNumberDefinition::new(self.id.trim(), self.display, self.dialable, label)
    }
}

/// `[numbers]` section
#[derive(Debug, Clone, Deserialize)]
pub struct NumbersSection {
    pub default: NumberEntry,
    #[serde(default)]
    pub pages: BTreeMap<String, NumberEntry>,
    #[serde(default)]
    pub campaigns: BTreeMap<String, NumberEntry>,
    #[serde(default)]
    pub mediums: BTreeMap<String, NumberEntry>,
    #[serde(default)]
    pub sources: BTreeMap<String, NumberEntry>,
}

impl NumbersSection {
    fn into_table(self) -> NumberTable {
        let mut table = NumberTable::new(self.default.into_definition(TableKind::Default));
        let sections = [
            (TableKind::Page, self.pages),
            (TableKind::Campaign, self.campaigns),
            (TableKind::Medium, self.mediums),
            (TableKind::Source, self.sources),
        ];
        for (kind, entries) in sections {
            for (key, entry) in entries {
                table.insert(kind, &key, entry.into_definition(kind));
            }
        }
        table
    }
}

/// `[session]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_inactivity_minutes")]
    pub inactivity_minutes: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_minutes: default_inactivity_minutes(),
        }
    }
}

/// `[dom]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DomConfig {
    /// Extra dial targets whose `tel:` links are rewritten
    #[serde(default)]
    pub legacy_dialables: Vec<String>,

    /// Rewrite phone numbers in static markup not built from phone slots
    #[serde(default = "default_true")]
    pub legacy_text_substitution: bool,
}

impl Default for DomConfig {
    fn default() -> Self {
        Self {
            legacy_dialables: Vec::new(),
            legacy_text_substitution: true,
        }
    }
}

/// `[telemetry]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Collector endpoint receiving event batches
    ///
    /// Default: http://127.0.0.1:5790/collect (dialtrack-collector)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub measurement_id: Option<String>,

    #[serde(default)]
    pub api_secret: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: default_endpoint(),
            measurement_id: None,
            api_secret: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoggingConfig {
    const LEVELS: [&'static str; 5] = ["trace", "debug", "info", "warn", "error"];

    /// Filter directive for this crate's events, e.g. `dialtrack_common=debug`
    ///
    /// Embedders add it to their `EnvFilter`.
    pub fn directive(&self) -> String {
        format!("dialtrack_common={}", self.level.trim().to_lowercase())
    }

    fn validate(&self) -> Result<()> {
        let level = self.level.trim().to_lowercase();
        if Self::LEVELS.contains(&level.as_str()) {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "logging.level must be one of {}, got '{}'",
                Self::LEVELS.join(", "),
                self.level
            )))
        }
    }
}

fn default_inactivity_minutes() -> u32 {
    crate::tracking::session::DEFAULT_INACTIVITY_MINUTES
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "http://127.0.0.1:5790/collect".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// File layout as deserialized
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub numbers: NumbersSection,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub dom: DomConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Validated tracker configuration
#[derive(Debug, Clone)]
pub struct TrackingConfig {
    pub numbers: NumberTable,
    pub session: SessionConfig,
    pub dom: DomConfig,
    pub telemetry: TelemetryConfig,
    pub logging: LoggingConfig,
}

impl TrackingConfig {
    /// Configuration with only a default number; every other setting at its default
    pub fn with_numbers(numbers: NumberTable) -> Self {
        Self {
            numbers,
            session: SessionConfig::default(),
            dom: DomConfig::default(),
            telemetry: TelemetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid configuration: {}", e)))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: TomlConfig) -> Result<Self> {
        if raw.session.inactivity_minutes == 0 {
            return Err(Error::Config(
                "session.inactivity_minutes must be at least 1".to_string(),
            ));
        }
        if raw.telemetry.enabled && raw.telemetry.endpoint.trim().is_empty() {
            return Err(Error::Config(
                "telemetry.endpoint must be set when telemetry is enabled".to_string(),
            ));
        }

        raw.logging.validate()?;

        let numbers = raw.numbers.into_table();
        numbers.validate()?;

        Ok(Self {
            numbers,
            session: raw.session,
            dom: raw.dom,
            telemetry: raw.telemetry,
            logging: raw.logging,
        })
    }

    /// Resolve the config file location and load it
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(explicit)?;
        Self::load_file(&path)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded tracking configuration from {}", path.display());
        Ok(config)
    }

    /// Inactivity window before a tracking session expires
    pub fn inactivity_window(&self) -> chrono::Duration {
        crate::time::minutes(self.session.inactivity_minutes)
    }

    /// Dial targets eligible for `tel:` link rewriting
    ///
    /// Every number in the table plus the configured legacy dialables.
    pub fn known_dialables(&self) -> Vec<String> {
        let mut all = self.numbers.dialables();
        all.extend(
            self.dom
                .legacy_dialables
                .iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        );
        all.sort();
        all.dedup();
        all
    }
}

/// Platform config file location: `<config_dir>/dialtrack/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("dialtrack").join("config.toml"))
}

/// Find the config file to load
///
/// An explicit path or environment override must exist; there is no fallback
/// past a location the caller named.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: explicit argument
    if let Some(path) = explicit {
        return existing(path.to_path_buf(), "explicit path");
    }

    // Priority 2: environment variable
    if let Ok(value) = std::env::var(CONFIG_ENV_VAR) {
        if !value.trim().is_empty() {
            return existing(PathBuf::from(value), CONFIG_ENV_VAR);
        }
    }

    // Priority 3: platform config directory
    match default_config_path() {
        Some(path) if path.is_file() => {
            debug!("Using config file from config directory: {}", path.display());
            Ok(path)
        }
        Some(path) => Err(Error::Config(format!(
            "No tracking configuration found (set {} or create {})",
            CONFIG_ENV_VAR,
            path.display()
        ))),
        None => Err(Error::Config(format!(
            "No tracking configuration found (set {}; no platform config directory)",
            CONFIG_ENV_VAR
        ))),
    }
}

fn existing(path: PathBuf, source: &str) -> Result<PathBuf> {
    if path.is_file() {
        debug!("Using config file from {}: {}", source, path.display());
        Ok(path)
    } else {
        Err(Error::Config(format!(
            "Config file from {} not found: {}",
            source,
            path.display()
        )))
    }
}
