//! Keeps rendered phone references consistent with the resolved number
//!
//! Two layers, applied in order:
//! 1. **Phone slots**: elements marked `data-phone-slot` are written directly
//!    (`display` token → visible text, `dial` token → `tel:` href). Render
//!    code that can subscribe to [`NumberBroadcast`] does not need this.
//! 2. **Legacy substitution** (switchable): rewrites `tel:` links that point
//!    at a known dialable, relabels anchors whose whole visible text is a
//!    phone number, and replaces phone-number substrings in text nodes.
//!    This exists for externally authored static content.
//!
//! Every write compares before mutating, so a second application with the
//! same number changes nothing.

use super::{Document, NodeId};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::watch;
use tracing::debug;

/// Attribute marking a declarative phone slot
pub const PHONE_SLOT_ATTR: &str = "data-phone-slot";

/// Parenthesized area code, hyphenated, or space-separated US-style numbers
static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\d{3}\)\s?\d{3}-\d{4}|\b\d{3}-\d{3}-\d{4}\b|\b\d{3} \d{3} \d{4}\b")
        .expect("phone pattern is a valid regex")
});

static FULL_PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\(\d{3}\)\s?\d{3}-\d{4}|\d{3}-\d{3}-\d{4}|\d{3} \d{3} \d{4})$")
        .expect("full phone pattern is a valid regex")
});

/// Elements whose text is never rewritten
const OPAQUE_TAGS: [&str; 3] = ["script", "style", "textarea"];

/// Number currently shown to the visitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayedNumber {
    pub display: String,
    pub dialable: String,
}

/// Publishes the resolved number to subscribed render components
#[derive(Debug, Clone)]
pub struct NumberBroadcast {
    tx: watch::Sender<Option<DisplayedNumber>>,
}

impl NumberBroadcast {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DisplayedNumber>> {
        self.tx.subscribe()
    }

    /// Publish; subscribers are only notified when the number actually changes
    pub fn publish(&self, number: DisplayedNumber) -> bool {
        self.tx.send_if_modified(|current| {
            if current.as_ref() == Some(&number) {
                false
            } else {
                *current = Some(number);
                true
            }
        })
    }

    pub fn current(&self) -> Option<DisplayedNumber> {
        self.tx.borrow().clone()
    }
}

impl Default for NumberBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts of nodes changed by one application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncReport {
    pub slots_updated: usize,
    pub links_updated: usize,
    pub anchors_relabelled: usize,
    pub text_nodes_updated: usize,
}

impl SyncReport {
    pub fn changes(&self) -> usize {
        self.slots_updated + self.links_updated + self.anchors_relabelled + self.text_nodes_updated
    }
}

/// Digits of a dialable string, ignoring a leading NANP country code
fn dial_digits(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('1') {
        Some(rest) if digits.len() == 11 => rest.to_string(),
        _ => digits,
    }
}

fn tel_target(href: &str) -> Option<&str> {
    let (scheme, rest) = href.trim().split_once(':')?;
    scheme.eq_ignore_ascii_case("tel").then_some(rest)
}

/// Replace phone-number substrings with `display`, leaving existing
/// occurrences of `display` untouched
fn substitute_numbers(text: &str, display: &str) -> String {
    let protected: Vec<(usize, usize)> = if display.is_empty() {
        Vec::new()
    } else {
        text.match_indices(display)
            .map(|(start, m)| (start, start + m.len()))
            .collect()
    };

    PHONE_PATTERN
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let found = caps.get(0).map(|m| (m.start(), m.end(), m.as_str()));
            match found {
                Some((start, end, matched)) => {
                    let overlaps = protected.iter().any(|(ps, pe)| start < *pe && *ps < end);
                    if overlaps {
                        matched.to_string()
                    } else {
                        display.to_string()
                    }
                }
                None => String::new(),
            }
        })
        .into_owned()
}

/// Applies a resolved number to a document
#[derive(Debug, Clone)]
pub struct DomSynchronizer {
    known_dialables: Vec<String>,
    legacy_substitution: bool,
    broadcast: NumberBroadcast,
}

impl DomSynchronizer {
    /// `known_dialables`: dial targets that `tel:` links may be rewritten from
    pub fn new(known_dialables: Vec<String>, legacy_substitution: bool) -> Self {
        let mut known: Vec<String> = known_dialables
            .iter()
            .map(|d| dial_digits(d))
            .filter(|d| !d.is_empty())
            .collect();
        known.sort();
        known.dedup();
        Self {
            known_dialables: known,
            legacy_substitution,
            broadcast: NumberBroadcast::new(),
        }
    }

    pub fn broadcast(&self) -> &NumberBroadcast {
        &self.broadcast
    }

    fn is_known_dialable(&self, target: &str) -> bool {
        let digits = dial_digits(target);
        !digits.is_empty() && self.known_dialables.iter().any(|k| *k == digits)
    }

    /// Bring the document in line with `(display, dialable)`
    pub fn apply_number(&self, doc: &mut Document, display: &str, dialable: &str) -> SyncReport {
        self.broadcast.publish(DisplayedNumber {
            display: display.to_string(),
            dialable: dialable.to_string(),
        });

        let mut report = SyncReport::default();
        let href = format!("tel:{}", dialable);
        let elements: Vec<NodeId> = doc
            .descendants(doc.body())
            .into_iter()
            .filter(|n| doc.tag(*n).is_some())
            .collect();

        for node in &elements {
            let Some(tokens) = doc.attribute(*node, PHONE_SLOT_ATTR).map(str::to_string) else {
                continue;
            };
            let mut changed = false;
            if tokens.split_whitespace().any(|t| t == "dial") {
                changed |= doc.set_attribute(*node, "href", &href);
            }
            if tokens.split_whitespace().any(|t| t == "display") {
                changed |= doc.replace_children_with_text(*node, display);
            }
            if changed {
                report.slots_updated += 1;
            }
        }

        if !self.legacy_substitution {
            debug!(?report, "Phone slots synchronized (legacy substitution disabled)");
            return report;
        }

        for node in &elements {
            if doc.tag(*node) != Some("a") || doc.attribute(*node, PHONE_SLOT_ATTR).is_some() {
                continue;
            }

            let rewrite = doc
                .attribute(*node, "href")
                .and_then(tel_target)
                .map(|target| self.is_known_dialable(target))
                .unwrap_or(false);
            if rewrite && doc.set_attribute(*node, "href", &href) {
                report.links_updated += 1;
            }

            let visible = doc.text_content(*node);
            let visible = visible.trim();
            if visible != display
                && FULL_PHONE_PATTERN.is_match(visible)
                && doc.replace_children_with_text(*node, display)
            {
                report.anchors_relabelled += 1;
            }
        }

        let text_nodes: Vec<NodeId> = doc
            .descendants(doc.body())
            .into_iter()
            .filter(|n| doc.text(*n).is_some())
            .filter(|n| !self.inside_excluded(doc, *n))
            .collect();

        for node in text_nodes {
            let Some(current) = doc.text(node) else {
                continue;
            };
            if !PHONE_PATTERN.is_match(current) {
                continue;
            }
            let replaced = substitute_numbers(current, display);
            if doc.set_text(node, &replaced) {
                report.text_nodes_updated += 1;
            }
        }

        debug!(?report, "Phone references synchronized");
        report
    }

    fn inside_excluded(&self, doc: &Document, node: NodeId) -> bool {
        doc.ancestors(node).into_iter().any(|n| {
            doc.tag(n).map(|t| OPAQUE_TAGS.contains(&t)).unwrap_or(false)
                || doc.attribute(n, PHONE_SLOT_ATTR).is_some()
        })
    }
}
