//! Visit attribution capture and merge
//!
//! An [`AttributionSnapshot`] accumulates acquisition signals for the current
//! browsing session. Reconciliation is merge-only: recognized query keys
//! refresh their typed fields, every query parameter lands in the raw map,
//! and nothing already known is ever replaced by an absent or empty value.

use crate::storage::{self, keys, Storage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};
use url::Url;

/// Query parameters with a dedicated snapshot field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributionKey {
    UtmSource,
    UtmMedium,
    UtmCampaign,
    UtmTerm,
    UtmContent,
    Gclid,
    Msclkid,
    Fbclid,
}

impl AttributionKey {
    pub const ALL: [AttributionKey; 8] = [
        AttributionKey::UtmSource,
        AttributionKey::UtmMedium,
        AttributionKey::UtmCampaign,
        AttributionKey::UtmTerm,
        AttributionKey::UtmContent,
        AttributionKey::Gclid,
        AttributionKey::Msclkid,
        AttributionKey::Fbclid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionKey::UtmSource => "utm_source",
            AttributionKey::UtmMedium => "utm_medium",
            AttributionKey::UtmCampaign => "utm_campaign",
            AttributionKey::UtmTerm => "utm_term",
            AttributionKey::UtmContent => "utm_content",
            AttributionKey::Gclid => "gclid",
            AttributionKey::Msclkid => "msclkid",
            AttributionKey::Fbclid => "fbclid",
        }
    }

    pub fn from_param(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

/// Acquisition signals observed during this browsing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionSnapshot {
    #[serde(default)]
    pub utm_source: Option<String>,
    #[serde(default)]
    pub utm_medium: Option<String>,
    #[serde(default)]
    pub utm_campaign: Option<String>,
    #[serde(default)]
    pub utm_term: Option<String>,
    #[serde(default)]
    pub utm_content: Option<String>,
    #[serde(default)]
    pub gclid: Option<String>,
    #[serde(default)]
    pub msclkid: Option<String>,
    #[serde(default)]
    pub fbclid: Option<String>,
    /// Last external referrer
    #[serde(default)]
    pub referrer: Option<String>,
    /// Path of the first page seen; set once
    #[serde(default)]
    pub landing_page: Option<String>,
    /// Full URL of the most recent page
    #[serde(default)]
    pub page_url: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Every query parameter ever observed, recognized or not
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl AttributionSnapshot {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            utm_source: None,
            utm_medium: None,
            utm_campaign: None,
            utm_term: None,
            utm_content: None,
            gclid: None,
            msclkid: None,
            fbclid: None,
            referrer: None,
            landing_page: None,
            page_url: None,
            first_seen_at: now,
            last_seen_at: now,
            params: BTreeMap::new(),
        }
    }

    pub fn field(&self, key: AttributionKey) -> Option<&str> {
        let value = match key {
            AttributionKey::UtmSource => &self.utm_source,
            AttributionKey::UtmMedium => &self.utm_medium,
            AttributionKey::UtmCampaign => &self.utm_campaign,
            AttributionKey::UtmTerm => &self.utm_term,
            AttributionKey::UtmContent => &self.utm_content,
            AttributionKey::Gclid => &self.gclid,
            AttributionKey::Msclkid => &self.msclkid,
            AttributionKey::Fbclid => &self.fbclid,
        };
        value.as_deref()
    }

    fn field_mut(&mut self, key: AttributionKey) -> &mut Option<String> {
        match key {
            AttributionKey::UtmSource => &mut self.utm_source,
            AttributionKey::UtmMedium => &mut self.utm_medium,
            AttributionKey::UtmCampaign => &mut self.utm_campaign,
            AttributionKey::UtmTerm => &mut self.utm_term,
            AttributionKey::UtmContent => &mut self.utm_content,
            AttributionKey::Gclid => &mut self.gclid,
            AttributionKey::Msclkid => &mut self.msclkid,
            AttributionKey::Fbclid => &mut self.fbclid,
        }
    }

    /// Attribution fields attached to outgoing analytics events
    pub fn event_fields(&self) -> Vec<(&'static str, String)> {
        [
            AttributionKey::UtmSource,
            AttributionKey::UtmMedium,
            AttributionKey::UtmCampaign,
            AttributionKey::Gclid,
        ]
        .into_iter()
        .filter_map(|key| self.field(key).map(|v| (key.as_str(), v.to_string())))
        .collect()
    }
}

/// Path and query pairs pulled from a page URL
struct ParsedLocation {
    path: Option<String>,
    host: Option<String>,
    pairs: Vec<(String, String)>,
}

fn parse_location(raw: &str) -> ParsedLocation {
    // Relative URLs borrow a placeholder base for parsing; its host is not the page's
    let (parsed, relative) = match Url::parse(raw) {
        Ok(url) => (Ok(url), false),
        Err(_) => (
            Url::parse("http://localhost/").and_then(|base| base.join(raw)),
            true,
        ),
    };

    match parsed {
        Ok(url) => ParsedLocation {
            path: Some(url.path().to_string()),
            host: if relative {
                None
            } else {
                url.host_str().map(str::to_ascii_lowercase)
            },
            pairs: url
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect(),
        },
        Err(e) => {
            debug!("Unparseable page URL '{}': {}", raw, e);
            ParsedLocation {
                path: None,
                host: None,
                pairs: Vec::new(),
            }
        }
    }
}

/// Path of a page URL, absolute or relative
pub fn page_path(raw: &str) -> String {
    parse_location(raw)
        .path
        .unwrap_or_else(|| "/".to_string())
}

fn referrer_host(raw: &str) -> Option<String> {
    Url::parse(raw)
        .ok()
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
}

/// Merge the current page's signals into a stored snapshot
///
/// Pure: the caller persists the result. Reconciling twice with the same
/// inputs yields the same snapshot apart from `last_seen_at`.
pub fn reconcile(
    current_url: &str,
    referrer: Option<&str>,
    stored: Option<AttributionSnapshot>,
    now: DateTime<Utc>,
) -> AttributionSnapshot {
    let mut snapshot = stored.unwrap_or_else(|| AttributionSnapshot::empty(now));
    let location = parse_location(current_url);

    for (name, value) in location.pairs {
        let value = value.trim().to_string();
        if value.is_empty() {
            snapshot.params.entry(name).or_default();
            continue;
        }
        if let Some(key) = AttributionKey::from_param(&name) {
            *snapshot.field_mut(key) = Some(value.clone());
        }
        snapshot.params.insert(name, value);
    }

    if snapshot.landing_page.is_none() {
        snapshot.landing_page = location.path.clone();
    }

    if let Some(referrer) = referrer.map(str::trim).filter(|r| !r.is_empty()) {
        let internal = match (&location.host, referrer_host(referrer)) {
            (Some(page_host), Some(ref_host)) => *page_host == ref_host,
            _ => false,
        };
        if !internal {
            snapshot.referrer = Some(referrer.to_string());
        }
    }

    if !current_url.trim().is_empty() {
        snapshot.page_url = Some(current_url.to_string());
    }
    if now > snapshot.last_seen_at {
        snapshot.last_seen_at = now;
    }

    snapshot
}

/// Session-scoped attribution persistence
pub struct AttributionStore;

impl AttributionStore {
    /// Load the stored snapshot, if any; malformed records read as absent
    pub fn load(storage: &mut dyn Storage) -> Option<AttributionSnapshot> {
        storage::load_json(storage, keys::ATTRIBUTION)
    }

    /// Reconcile against the stored snapshot and persist before returning
    ///
    /// A persistence failure is logged; the merged snapshot is still returned
    /// so resolution can proceed for this page view.
    pub fn reconcile(
        storage: &mut dyn Storage,
        current_url: &str,
        referrer: Option<&str>,
        now: DateTime<Utc>,
    ) -> AttributionSnapshot {
        let stored = Self::load(storage);
        let snapshot = reconcile(current_url, referrer, stored, now);

        if let Err(e) = storage::save_json(storage, keys::ATTRIBUTION, &snapshot) {
            warn!("Failed to persist attribution snapshot: {}", e);
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn at(ts: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(ts).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_first_visit_captures_recognized_keys() {
        let now = at("2026-04-01T10:00:00Z");
        let snap = reconcile(
            "https://example.com/emergency?utm_source=google&utm_campaign=spring25&gclid=abc&x=1",
            Some("https://www.google.com/"),
            None,
            now,
        );

        assert_eq!(snap.utm_source.as_deref(), Some("google"));
        assert_eq!(snap.utm_campaign.as_deref(), Some("spring25"));
        assert_eq!(snap.gclid.as_deref(), Some("abc"));
        assert_eq!(snap.landing_page.as_deref(), Some("/emergency"));
        assert_eq!(snap.referrer.as_deref(), Some("https://www.google.com/"));
        assert_eq!(snap.params.get("x").map(String::as_str), Some("1"));
        assert_eq!(snap.first_seen_at, now);
        assert_eq!(snap.last_seen_at, now);
    }

    #[test]
    fn test_later_page_does_not_erase_fields() {
        let first = reconcile(
            "https://example.com/?utm_source=google&utm_medium=cpc",
            None,
            None,
            at("2026-04-01T10:00:00Z"),
        );
        let second = reconcile(
            "https://example.com/services?utm_source=&page=2",
            None,
            Some(first),
            at("2026-04-01T10:05:00Z"),
        );

        assert_eq!(second.utm_source.as_deref(), Some("google"));
        assert_eq!(second.utm_medium.as_deref(), Some("cpc"));
        assert_eq!(second.params.get("utm_source").map(String::as_str), Some("google"));
        assert_eq!(second.params.get("page").map(String::as_str), Some("2"));
        assert_eq!(second.landing_page.as_deref(), Some("/"));
        assert_eq!(
            second.page_url.as_deref(),
            Some("https://example.com/services?utm_source=&page=2")
        );
    }

    #[test]
    fn test_new_campaign_refreshes_typed_field() {
        let first = reconcile(
            "https://example.com/?utm_campaign=spring25",
            None,
            None,
            at("2026-04-01T10:00:00Z"),
        );
        let second = reconcile(
            "https://example.com/?utm_campaign=summer25",
            None,
            Some(first.clone()),
            at("2026-04-01T11:00:00Z"),
        );

        assert_eq!(second.utm_campaign.as_deref(), Some("summer25"));
        assert_eq!(second.first_seen_at, first.first_seen_at);
    }

    #[test]
    fn test_internal_referrer_is_ignored() {
        let first = reconcile(
            "https://example.com/",
            Some("https://news.example.org/article"),
            None,
            at("2026-04-01T10:00:00Z"),
        );
        let second = reconcile(
            "https://example.com/contact",
            Some("https://example.com/"),
            Some(first),
            at("2026-04-01T10:01:00Z"),
        );

        assert_eq!(second.referrer.as_deref(), Some("https://news.example.org/article"));
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let first = reconcile("https://example.com/", None, None, at("2026-04-01T10:00:00Z"));
        let second = reconcile(
            "https://example.com/",
            None,
            Some(first),
            at("2026-04-01T09:00:00Z"),
        );
        assert_eq!(second.last_seen_at, at("2026-04-01T10:00:00Z"));
    }

    #[test]
    fn test_relative_url_is_accepted() {
        let snap = reconcile("/pricing?utm_medium=email", None, None, at("2026-04-01T10:00:00Z"));
        assert_eq!(snap.landing_page.as_deref(), Some("/pricing"));
        assert_eq!(snap.utm_medium.as_deref(), Some("email"));
    }

    #[test]
    fn test_relative_url_keeps_localhost_referrer() {
        let snap = reconcile(
            "/pricing",
            Some("http://localhost:3000/blog"),
            None,
            at("2026-04-01T10:00:00Z"),
        );
        assert_eq!(snap.referrer.as_deref(), Some("http://localhost:3000/blog"));
        assert_eq!(snap.landing_page.as_deref(), Some("/pricing"));
    }

    #[test]
    fn test_store_persists_before_returning() {
        let mut storage = MemoryStorage::new();
        let snap = AttributionStore::reconcile(
            &mut storage,
            "https://example.com/?utm_source=bing",
            None,
            at("2026-04-01T10:00:00Z"),
        );

        assert_eq!(AttributionStore::load(&mut storage), Some(snap));
    }

    #[test]
    fn test_store_rebuilds_from_corrupt_record() {
        let mut storage = MemoryStorage::new();
        storage.set(keys::ATTRIBUTION, "{\"utm_source\":").unwrap();

        let now = at("2026-04-01T10:00:00Z");
        let snap = AttributionStore::reconcile(&mut storage, "https://example.com/a", None, now);

        assert_eq!(snap.first_seen_at, now);
        assert_eq!(snap.landing_page.as_deref(), Some("/a"));
    }

    #[test]
    fn test_event_fields_only_include_present_values() {
        let snap = reconcile(
            "https://example.com/?utm_source=google&gclid=g1",
            None,
            None,
            at("2026-04-01T10:00:00Z"),
        );
        let fields = snap.event_fields();
        assert_eq!(
            fields,
            vec![("utm_source", "google".to_string()), ("gclid", "g1".to_string())]
        );
    }
}
