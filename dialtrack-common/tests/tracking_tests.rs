//! Integration tests for attribution, resolution and session lifecycle
//!
//! Covers:
//! - Attribution reconciliation is idempotent apart from `last_seen_at`
//! - Resolution is pure and follows page > campaign > medium > source > sticky > default
//! - A changed resolution replaces the session and fires exactly one assignment
//! - Expiry after the inactivity window starts a fresh session

use chrono::{DateTime, Duration, TimeZone, Utc};
use dialtrack_common::analytics::{MemoryTransport, ParamValue};
use dialtrack_common::attribution::{self, AttributionStore};
use dialtrack_common::config::TrackingConfig;
use dialtrack_common::dom::Document;
use dialtrack_common::storage::{keys, MemoryStorage, Storage};
use dialtrack_common::time::ManualClock;
use dialtrack_common::tracking::{resolve, MatchRule, NumberTable, TableKind, TrackingNumberDefinition};
use dialtrack_common::CallTracker;
use std::sync::Arc;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap()
}

fn def(id: &str, last4: &str) -> TrackingNumberDefinition {
    TrackingNumberDefinition::new(
        id,
        format!("(555) 010-{}", last4),
        format!("+1555010{}", last4),
        "test",
    )
}

fn table() -> NumberTable {
    NumberTable::new(def("main", "0000"))
        .with(TableKind::Page, "/emergency", def("emergency", "1000"))
        .with(TableKind::Campaign, "spring25", def("spring", "2000"))
        .with(TableKind::Campaign, "fall25", def("fall", "2500"))
        .with(TableKind::Medium, "cpc", def("cpc", "3000"))
        .with(TableKind::Source, "Google Ads", def("google", "4000"))
}

struct Harness {
    tracker: CallTracker,
    transport: MemoryTransport,
    clock: ManualClock,
}

fn harness() -> Harness {
    let transport = MemoryTransport::new();
    let clock = ManualClock::new(t0());
    let tracker = CallTracker::builder(TrackingConfig::with_numbers(table()))
        .local_storage(Box::new(MemoryStorage::new()))
        .session_storage(Box::new(MemoryStorage::new()))
        .transport(Arc::new(transport.clone()))
        .clock(Arc::new(clock.clone()))
        .build();
    Harness {
        tracker,
        transport,
        clock,
    }
}

// =============================================================================
// Attribution
// =============================================================================

#[test]
fn test_reconcile_twice_is_idempotent_except_last_seen() {
    let url = "https://example.com/emergency?utm_source=google&utm_campaign=spring25&ref=abc";
    let referrer = Some("https://www.google.com/search?q=plumber");

    let mut storage = MemoryStorage::new();
    let first = AttributionStore::reconcile(&mut storage, url, referrer, t0());
    let second = AttributionStore::reconcile(&mut storage, url, referrer, t0() + Duration::minutes(3));

    assert_eq!(first.first_seen_at, second.first_seen_at);
    assert_eq!(first.landing_page, second.landing_page);
    assert_eq!(first.params, second.params);
    assert_eq!(first.utm_campaign, second.utm_campaign);
    assert_eq!(first.referrer, second.referrer);
    assert_eq!(second.last_seen_at, t0() + Duration::minutes(3));

    let mut normalized = second.clone();
    normalized.last_seen_at = first.last_seen_at;
    assert_eq!(normalized, first);
}

#[test]
fn test_parameters_accumulate_across_pages() {
    let mut storage = MemoryStorage::new();
    AttributionStore::reconcile(&mut storage, "https://example.com/?utm_source=bing&a=1", None, t0());
    let merged = AttributionStore::reconcile(
        &mut storage,
        "https://example.com/quote?b=2",
        Some("https://example.com/"),
        t0() + Duration::minutes(1),
    );

    assert_eq!(merged.utm_source.as_deref(), Some("bing"));
    assert_eq!(merged.params.len(), 3);
    assert_eq!(merged.landing_page.as_deref(), Some("/"));
    assert!(merged.referrer.is_none(), "same-host referrer is not attribution");
}

#[test]
fn test_page_path_helper() {
    assert_eq!(attribution::page_path("https://example.com/a/b?x=1#top"), "/a/b");
    assert_eq!(attribution::page_path("/faq?x=1"), "/faq");
}

// =============================================================================
// Resolution
// =============================================================================

#[test]
fn test_page_override_beats_campaign_override() {
    let table = table();
    let mut storage = MemoryStorage::new();
    let snap = AttributionStore::reconcile(
        &mut storage,
        "https://example.com/emergency?utm_campaign=spring25",
        None,
        t0(),
    );

    let resolution = resolve(&table, &snap, None);
    assert_eq!(resolution.rule, MatchRule::Page);
    assert_eq!(resolution.definition.id, "emergency");
}

#[test]
fn test_resolve_is_pure() {
    let table = table();
    let mut storage = MemoryStorage::new();
    let snap = AttributionStore::reconcile(
        &mut storage,
        "https://example.com/?utm_medium=CPC&utm_source=google%20ads",
        None,
        t0(),
    );

    let first = resolve(&table, &snap, Some("fall"));
    for _ in 0..10 {
        assert_eq!(resolve(&table, &snap, Some("fall")), first);
    }
    assert_eq!(first.definition.id, "cpc");
}

#[test]
fn test_sticky_id_survives_unmatched_page() {
    let table = table();
    let mut storage = MemoryStorage::new();
    let snap = AttributionStore::reconcile(&mut storage, "https://example.com/about", None, t0());

    assert_eq!(resolve(&table, &snap, Some("spring")).definition.id, "spring");
    assert_eq!(resolve(&table, &snap, None).definition.id, "main");
}

#[test]
fn test_source_normalization_matches_spaces_and_underscores() {
    let table = table();
    let mut storage = MemoryStorage::new();
    let snap = AttributionStore::reconcile(
        &mut storage,
        "https://example.com/?utm_source=Google_Ads",
        None,
        t0(),
    );
    assert_eq!(resolve(&table, &snap, None).rule, MatchRule::Source);
}

// =============================================================================
// Session lifecycle
// =============================================================================

#[test]
fn test_changed_resolution_replaces_session_with_one_assignment() {
    let mut h = harness();
    let mut doc = Document::new();

    let first = h
        .tracker
        .page_load(&mut doc, "https://example.com/?utm_campaign=spring25", None);
    assert_eq!(first.definition.id, "spring");

    h.clock.advance(Duration::minutes(2));
    h.transport.clear();

    let second = h
        .tracker
        .route_change(&mut doc, "https://example.com/offers?utm_campaign=fall25");

    assert!(second.assigned);
    assert_eq!(second.definition.id, "fall");
    assert_ne!(second.session_id, first.session_id);
    assert_eq!(second.replaced, first.session_id);

    assert_eq!(h.transport.events_named("tracking_number_assigned").len(), 1);
    assert!(h.transport.events_named("tracking_session_refreshed").is_empty());

    let assigned = &h.transport.events_named("tracking_number_assigned")[0];
    let replaced = first.session_id.unwrap().to_string();
    assert_eq!(
        assigned.params.get("replaced_session_id").and_then(ParamValue::as_str),
        Some(replaced.as_str())
    );
}

#[test]
fn test_same_resolution_refreshes_same_session() {
    let mut h = harness();
    let mut doc = Document::new();

    let first = h.tracker.page_load(&mut doc, "https://example.com/?utm_medium=cpc", None);
    h.clock.advance(Duration::minutes(20));
    let second = h.tracker.route_change(&mut doc, "https://example.com/services");
    h.clock.advance(Duration::minutes(20));
    let third = h.tracker.route_change(&mut doc, "https://example.com/contact");

    assert_eq!(first.session_id, second.session_id);
    assert_eq!(second.session_id, third.session_id);
    assert_eq!(
        h.tracker.current_session().unwrap().expires_at,
        t0() + Duration::minutes(40 + 30)
    );
    assert_eq!(h.transport.events_named("tracking_number_assigned").len(), 1);
    assert_eq!(h.transport.events_named("tracking_session_refreshed").len(), 2);
}

#[test]
fn test_expired_session_starts_fresh() {
    let mut h = harness();
    let mut doc = Document::new();

    let first = h.tracker.page_load(&mut doc, "https://example.com/", None);
    h.clock.advance(Duration::minutes(31));
    let second = h.tracker.route_change(&mut doc, "https://example.com/");

    assert!(second.assigned);
    assert_ne!(second.session_id, first.session_id);
    assert_eq!(second.replaced, None);
}

#[test]
fn test_sticky_session_number_kept_when_attribution_has_no_match() {
    let transport = MemoryTransport::new();
    let clock = ManualClock::new(t0());
    let mut session_storage = MemoryStorage::new();

    // Session from an earlier page load bound to the campaign number
    let table = table();
    let sessions = dialtrack_common::tracking::SessionManager::default();
    let spring = table.find_by_id("spring").unwrap().clone();
    let snap = dialtrack_common::attribution::AttributionSnapshot::empty(t0());
    let session = sessions
        .create(&dialtrack_common::uuid_utils::OsIdSource, &spring, &snap, t0())
        .unwrap();
    sessions.persist(&mut session_storage, &session).unwrap();
    assert!(session_storage.get(keys::TRACKING_SESSION).unwrap().is_some());

    let mut tracker = CallTracker::builder(TrackingConfig::with_numbers(table))
        .local_storage(Box::new(MemoryStorage::new()))
        .session_storage(Box::new(session_storage))
        .transport(Arc::new(transport.clone()))
        .clock(Arc::new(clock.clone()))
        .build();

    let mut doc = Document::new();
    let outcome = tracker.page_load(&mut doc, "https://example.com/about", None);

    assert_eq!(outcome.rule, MatchRule::Sticky);
    assert_eq!(outcome.session_id, Some(session.id));
    assert!(!outcome.assigned);
}
