//! Deterministic tracking-number resolution
//!
//! Precedence, first match wins:
//! 1. landing page (normalized path) in the per-page table
//! 2. `utm_campaign` in the per-campaign table
//! 3. `utm_medium` in the per-medium table
//! 4. `utm_source` in the per-source table
//! 5. sticky definition id, looked up across every table
//! 6. the default number
//!
//! Resolution is a pure function of its inputs.

use super::{normalize_key, normalize_path, NumberTable, TableKind, TrackingNumberDefinition};
use crate::attribution::AttributionSnapshot;

/// Which rule produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    Page,
    Campaign,
    Medium,
    Source,
    Sticky,
    Default,
}

impl MatchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchRule::Page => "page",
            MatchRule::Campaign => "campaign",
            MatchRule::Medium => "medium",
            MatchRule::Source => "source",
            MatchRule::Sticky => "sticky",
            MatchRule::Default => "default",
        }
    }
}

/// Selected definition and the rule that selected it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution<'a> {
    pub rule: MatchRule,
    pub definition: &'a TrackingNumberDefinition,
}

fn lookup_key<'a>(
    table: &'a NumberTable,
    kind: TableKind,
    raw: Option<&str>,
) -> Option<&'a TrackingNumberDefinition> {
    let key = match kind {
        TableKind::Page => normalize_path(raw?),
        _ => normalize_key(raw?),
    };
    if key.is_empty() {
        return None;
    }
    table.lookup(kind, &key)
}

/// Resolve the number to display for this attribution
pub fn resolve<'a>(
    table: &'a NumberTable,
    snapshot: &AttributionSnapshot,
    sticky_definition_id: Option<&str>,
) -> Resolution<'a> {
    let ordered = [
        (MatchRule::Page, TableKind::Page, snapshot.landing_page.as_deref()),
        (MatchRule::Campaign, TableKind::Campaign, snapshot.utm_campaign.as_deref()),
        (MatchRule::Medium, TableKind::Medium, snapshot.utm_medium.as_deref()),
        (MatchRule::Source, TableKind::Source, snapshot.utm_source.as_deref()),
    ];

    for (rule, kind, raw) in ordered {
        if let Some(definition) = lookup_key(table, kind, raw) {
            return Resolution { rule, definition };
        }
    }

    if let Some(definition) = sticky_definition_id.and_then(|id| table.find_by_id(id)) {
        return Resolution {
            rule: MatchRule::Sticky,
            definition,
        };
    }

    Resolution {
        rule: MatchRule::Default,
        definition: table.default_definition(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn def(id: &str, dialable: &str) -> TrackingNumberDefinition {
        TrackingNumberDefinition::new(id, format!("D{}", dialable), dialable, "test")
    }

    fn table() -> NumberTable {
        NumberTable::new(def("default", "+1000"))
            .with(TableKind::Page, "/emergency", def("page-emergency", "+1001"))
            .with(TableKind::Campaign, "spring25", def("camp-spring", "+1002"))
            .with(TableKind::Medium, "cpc", def("med-cpc", "+1003"))
            .with(TableKind::Source, "Google Ads", def("src-google", "+1004"))
    }

    fn snapshot() -> AttributionSnapshot {
        AttributionSnapshot::empty(Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap())
    }

    #[test]
    fn test_page_beats_campaign() {
        let table = table();
        let mut snap = snapshot();
        snap.landing_page = Some("/emergency".to_string());
        snap.utm_campaign = Some("spring25".to_string());

        let r = resolve(&table, &snap, None);
        assert_eq!(r.rule, MatchRule::Page);
        assert_eq!(r.definition.id, "page-emergency");
    }

    #[test]
    fn test_campaign_beats_medium_and_source() {
        let table = table();
        let mut snap = snapshot();
        snap.landing_page = Some("/about".to_string());
        snap.utm_campaign = Some("Spring25".to_string());
        snap.utm_medium = Some("cpc".to_string());
        snap.utm_source = Some("google_ads".to_string());

        assert_eq!(resolve(&table, &snap, None).definition.id, "camp-spring");
    }

    #[test]
    fn test_medium_beats_source() {
        let table = table();
        let mut snap = snapshot();
        snap.utm_medium = Some("CPC".to_string());
        snap.utm_source = Some("google ads".to_string());

        assert_eq!(resolve(&table, &snap, None).rule, MatchRule::Medium);
    }

    #[test]
    fn test_source_matches_after_normalization() {
        let table = table();
        let mut snap = snapshot();
        snap.utm_source = Some("google_ads".to_string());

        let r = resolve(&table, &snap, None);
        assert_eq!(r.rule, MatchRule::Source);
        assert_eq!(r.definition.id, "src-google");
    }

    #[test]
    fn test_sticky_used_only_when_nothing_matches() {
        let table = table();
        let snap = snapshot();

        let r = resolve(&table, &snap, Some("camp-spring"));
        assert_eq!(r.rule, MatchRule::Sticky);
        assert_eq!(r.definition.id, "camp-spring");

        let mut matching = snapshot();
        matching.utm_medium = Some("cpc".to_string());
        assert_eq!(
            resolve(&table, &matching, Some("camp-spring")).definition.id,
            "med-cpc"
        );
    }

    #[test]
    fn test_unknown_sticky_falls_back_to_default() {
        let table = table();
        let r = resolve(&table, &snapshot(), Some("retired-number"));
        assert_eq!(r.rule, MatchRule::Default);
        assert_eq!(r.definition.id, "default");
    }

    #[test]
    fn test_blank_attribution_values_do_not_match() {
        let table = table().with(TableKind::Campaign, "", def("blank", "+1999"));
        let mut snap = snapshot();
        snap.utm_campaign = Some("   ".to_string());
        assert_eq!(resolve(&table, &snap, None).rule, MatchRule::Default);
    }
}
