//! Tracking-number definitions, override tables, resolution and sessions
//!
//! A site has one default contact number plus optional overrides keyed by
//! landing page, campaign, medium and source. [`resolver::resolve`] picks one
//! deterministically; [`session`] keeps that pick stable for a browsing session.

pub mod resolver;
pub mod session;

pub use resolver::{resolve, MatchRule, Resolution};
pub use session::{SessionManager, SessionState, SessionTransition, TrackingSession};

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One contact number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingNumberDefinition {
    /// Stable identifier (used for sticky lookups and analytics)
    pub id: String,
    /// Human-readable form, e.g. "(555) 010-2000"
    pub display: String,
    /// Dialable form, e.g. "+15550102000"
    pub dialable: String,
    /// Provenance label, e.g. "matched by campaign"
    pub label: String,
}

impl TrackingNumberDefinition {
    pub fn new(
        id: impl Into<String>,
        display: impl Into<String>,
        dialable: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display: display.into(),
            dialable: dialable.into(),
            label: label.into(),
        }
    }

    /// `tel:` URI for this number
    pub fn tel_href(&self) -> String {
        format!("tel:{}", self.dialable)
    }

    fn same_number(&self, other: &Self) -> bool {
        self.display == other.display && self.dialable == other.dialable
    }
}

/// Which override table a definition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Page,
    Campaign,
    Medium,
    Source,
    Default,
}

impl TableKind {
    /// Provenance label used when the configuration supplies none
    pub fn default_label(&self) -> &'static str {
        match self {
            TableKind::Page => "matched by page",
            TableKind::Campaign => "matched by campaign",
            TableKind::Medium => "matched by medium",
            TableKind::Source => "matched by source",
            TableKind::Default => "default",
        }
    }
}

/// Normalize a campaign/medium/source key
///
/// Lower-cases and collapses each whitespace run to a single underscore, so
/// "Google Ads", " google  ads " and "google_ads" compare equal.
pub fn normalize_key(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("_")
}

/// Normalize a page path for the per-page table
///
/// Drops query and fragment, lower-cases, forces a leading slash, collapses
/// repeated slashes and strips a trailing slash (except for the root).
pub fn normalize_path(raw: &str) -> String {
    let path = raw
        .trim()
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_lowercase();

    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Default number plus the four override tables, with normalized keys
#[derive(Debug, Clone, PartialEq)]
pub struct NumberTable {
    default: TrackingNumberDefinition,
    pages: BTreeMap<String, TrackingNumberDefinition>,
    campaigns: BTreeMap<String, TrackingNumberDefinition>,
    mediums: BTreeMap<String, TrackingNumberDefinition>,
    sources: BTreeMap<String, TrackingNumberDefinition>,
}

impl NumberTable {
    pub fn new(default: TrackingNumberDefinition) -> Self {
        Self {
            default,
            pages: BTreeMap::new(),
            campaigns: BTreeMap::new(),
            mediums: BTreeMap::new(),
            sources: BTreeMap::new(),
        }
    }

    /// Add an override; the key is normalized for its table
    pub fn insert(&mut self, kind: TableKind, key: &str, definition: TrackingNumberDefinition) {
        match kind {
            TableKind::Page => {
                self.pages.insert(normalize_path(key), definition);
            }
            TableKind::Campaign => {
                self.campaigns.insert(normalize_key(key), definition);
            }
            TableKind::Medium => {
                self.mediums.insert(normalize_key(key), definition);
            }
            TableKind::Source => {
                self.sources.insert(normalize_key(key), definition);
            }
            TableKind::Default => self.default = definition,
        }
    }

    /// Builder form of [`NumberTable::insert`]
    pub fn with(mut self, kind: TableKind, key: &str, definition: TrackingNumberDefinition) -> Self {
        self.insert(kind, key, definition);
        self
    }

    pub fn default_definition(&self) -> &TrackingNumberDefinition {
        &self.default
    }

    /// Exact lookup of an already-normalized key
    pub fn lookup(&self, kind: TableKind, normalized_key: &str) -> Option<&TrackingNumberDefinition> {
        match kind {
            TableKind::Page => self.pages.get(normalized_key),
            TableKind::Campaign => self.campaigns.get(normalized_key),
            TableKind::Medium => self.mediums.get(normalized_key),
            TableKind::Source => self.sources.get(normalized_key),
            TableKind::Default => Some(&self.default),
        }
    }

    /// All definitions in precedence order: pages, campaigns, mediums, sources, default
    pub fn definitions(&self) -> impl Iterator<Item = &TrackingNumberDefinition> {
        self.pages
            .values()
            .chain(self.campaigns.values())
            .chain(self.mediums.values())
            .chain(self.sources.values())
            .chain(std::iter::once(&self.default))
    }

    /// Find a definition by id across every table
    pub fn find_by_id(&self, id: &str) -> Option<&TrackingNumberDefinition> {
        self.definitions().find(|d| d.id == id)
    }

    /// Every dialable form known to the table
    pub fn dialables(&self) -> Vec<String> {
        let mut out: Vec<String> = self.definitions().map(|d| d.dialable.clone()).collect();
        out.sort();
        out.dedup();
        out
    }

    /// Check that ids are non-empty and that a shared id always means the same number
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeMap<&str, &TrackingNumberDefinition> = BTreeMap::new();
        for definition in self.definitions() {
            if definition.id.trim().is_empty() {
                return Err(Error::Config("tracking number id must not be empty".to_string()));
            }
            if definition.dialable.trim().is_empty() || definition.display.trim().is_empty() {
                return Err(Error::Config(format!(
                    "tracking number '{}' needs both display and dialable forms",
                    definition.id
                )));
            }
            match seen.get(definition.id.as_str()) {
                Some(existing) if !existing.same_number(definition) => {
                    return Err(Error::Config(format!(
                        "tracking number id '{}' is used for two different numbers",
                        definition.id
                    )));
                }
                Some(_) => {}
                None => {
                    seen.insert(definition.id.as_str(), definition);
                }
            }
        }
        Ok(())
    }
}
