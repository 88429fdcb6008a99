//! Per-page-view and per-session dedup state
//!
//! [`PageViewContext`] holds the scroll thresholds and FAQ markers already
//! reported for the current page view and is reset on every navigation.
//! [`ExposureLog`] holds experiment exposures for the whole browsing session
//! and lives in session storage so it survives full page loads.

use crate::storage::{self, keys, Storage};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Scroll-depth thresholds, percent
pub const SCROLL_THRESHOLDS: [u8; 5] = [25, 50, 75, 90, 100];

#[derive(Debug, Clone, Default)]
pub struct PageViewContext {
    page_path: String,
    consumed_thresholds: BTreeSet<u8>,
    faq_seen: HashSet<(String, String)>,
}

impl PageViewContext {
    pub fn new(page_path: impl Into<String>) -> Self {
        Self {
            page_path: page_path.into(),
            ..Self::default()
        }
    }

    pub fn page_path(&self) -> &str {
        &self.page_path
    }

    /// Start a new page view; everything consumed so far is forgotten
    pub fn reset(&mut self, page_path: impl Into<String>) {
        self.page_path = page_path.into();
        self.consumed_thresholds.clear();
        self.faq_seen.clear();
    }

    /// Thresholds first reached at `percent`, marked consumed, ascending
    pub fn record_scroll(&mut self, percent: f64) -> Vec<u8> {
        if !percent.is_finite() {
            return Vec::new();
        }
        let mut reached = Vec::new();
        for threshold in SCROLL_THRESHOLDS {
            if percent >= f64::from(threshold) && self.consumed_thresholds.insert(threshold) {
                reached.push(threshold);
            }
        }
        reached
    }

    pub fn consumed_thresholds(&self) -> impl Iterator<Item = u8> + '_ {
        self.consumed_thresholds.iter().copied()
    }

    /// `true` the first time `marker` is clicked on this page
    pub fn record_faq(&mut self, marker: &str) -> bool {
        self.faq_seen
            .insert((self.page_path.clone(), marker.to_string()))
    }
}

/// Experiment exposures already reported in this browsing session
#[derive(Debug, Clone, Default)]
pub struct ExposureLog {
    seen: BTreeSet<(String, String)>,
}

impl ExposureLog {
    /// Load from session storage; malformed records read as empty
    pub fn load(storage: &mut dyn Storage) -> Self {
        let seen = storage::load_json(storage, keys::AB_EXPOSURES).unwrap_or_default();
        Self { seen }
    }

    pub fn contains(&self, experiment: &str, variant: &str) -> bool {
        self.seen
            .contains(&(experiment.to_string(), variant.to_string()))
    }

    /// `true` if this (experiment, variant) pair is new to the session
    ///
    /// Other page loads of the same session may have recorded exposures since
    /// this log was loaded, so the stored set is merged in first.
    pub fn record(&mut self, storage: &mut dyn Storage, experiment: &str, variant: &str) -> bool {
        if let Some(stored) =
            storage::load_json::<BTreeSet<(String, String)>>(storage, keys::AB_EXPOSURES)
        {
            self.seen.extend(stored);
        }

        if !self.seen.insert((experiment.to_string(), variant.to_string())) {
            debug!(experiment, variant, "Exposure already reported this session");
            return false;
        }

        if let Err(e) = storage::save_json(storage, keys::AB_EXPOSURES, &self.seen) {
            warn!("Failed to persist experiment exposures: {}", e);
        }
        true
    }
}
