//! Document listeners feeding the emitter
//!
//! Click listeners register at document level in the capture phase, so they
//! observe the click before any page handler can stop propagation. The
//! scroll listener is passive. Each listener only records what it saw; the
//! tracker turns observations into events after dispatch.

use crate::dom::{Document, DomEvent, DomListener, EventType, ListenerOptions, NodeId};
use crate::dom::events::EventPayload;

/// Attribute marking an FAQ entry; its value is the entry's id
pub const FAQ_MARKER_ATTR: &str = "data-faq-id";

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    CallClick { phone_number: String, link_text: String },
    Faq { marker: String, question: String },
    Scroll { percent: f64 },
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dial target of a `tel:` href
pub fn tel_number(href: &str) -> Option<&str> {
    let (scheme, number) = href.trim().split_once(':')?;
    if !scheme.eq_ignore_ascii_case("tel") {
        return None;
    }
    let number = number.trim();
    (!number.is_empty()).then_some(number)
}

fn click_target(event: &DomEvent) -> Option<NodeId> {
    match event.payload() {
        EventPayload::Click { target } => Some(target),
        EventPayload::Scroll(_) => None,
    }
}

/// Detects clicks on (or inside) `tel:` links
#[derive(Debug, Default)]
pub struct CallClickListener {
    observed: Option<Interaction>,
}

impl CallClickListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Option<Interaction> {
        self.observed.take()
    }
}

impl DomListener for CallClickListener {
    fn event_type(&self) -> EventType {
        EventType::Click
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions {
            capture: true,
            passive: false,
        }
    }

    fn handle(&mut self, doc: &Document, event: &mut DomEvent) {
        let Some(target) = click_target(event) else {
            return;
        };
        let link = doc.closest(target, |d, n| {
            d.tag(n) == Some("a") && d.attribute(n, "href").and_then(tel_number).is_some()
        });
        let Some(link) = link else {
            return;
        };
        let Some(number) = doc.attribute(link, "href").and_then(tel_number) else {
            return;
        };
        self.observed = Some(Interaction::CallClick {
            phone_number: number.to_string(),
            link_text: collapse_whitespace(&doc.text_content(link)),
        });
    }
}

/// Detects clicks inside elements carrying [`FAQ_MARKER_ATTR`]
#[derive(Debug, Default)]
pub struct FaqListener {
    observed: Option<Interaction>,
}

impl FaqListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Option<Interaction> {
        self.observed.take()
    }
}

impl DomListener for FaqListener {
    fn event_type(&self) -> EventType {
        EventType::Click
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions {
            capture: true,
            passive: false,
        }
    }

    fn handle(&mut self, doc: &Document, event: &mut DomEvent) {
        let Some(target) = click_target(event) else {
            return;
        };
        let entry = doc.closest(target, |d, n| {
            d.attribute(n, FAQ_MARKER_ATTR)
                .map(|m| !m.trim().is_empty())
                .unwrap_or(false)
        });
        let Some(entry) = entry else {
            return;
        };
        let marker = doc
            .attribute(entry, FAQ_MARKER_ATTR)
            .map(|m| m.trim().to_string())
            .unwrap_or_default();
        self.observed = Some(Interaction::Faq {
            marker,
            question: collapse_whitespace(&doc.text_content(entry)),
        });
    }
}

/// Passive scroll observer
#[derive(Debug, Default)]
pub struct ScrollListener {
    observed: Option<Interaction>,
}

impl ScrollListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&mut self) -> Option<Interaction> {
        self.observed.take()
    }
}

impl DomListener for ScrollListener {
    fn event_type(&self) -> EventType {
        EventType::Scroll
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions {
            capture: false,
            passive: true,
        }
    }

    fn handle(&mut self, _doc: &Document, event: &mut DomEvent) {
        if let EventPayload::Scroll(metrics) = event.payload() {
            // Non-scrollable pages report nothing
            if let Some(percent) = metrics.percent() {
                self.observed = Some(Interaction::Scroll { percent });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{dispatch, Scope, ScrollMetrics};

    struct Stopper {
        node: NodeId,
    }

    impl DomListener for Stopper {
        fn event_type(&self) -> EventType {
            EventType::Click
        }
        fn scope(&self) -> Scope {
            Scope::Node(self.node)
        }
        fn handle(&mut self, _doc: &Document, event: &mut DomEvent) {
            event.stop_propagation();
        }
    }

    #[test]
    fn test_tel_number() {
        assert_eq!(tel_number("tel:+15550100000"), Some("+15550100000"));
        assert_eq!(tel_number(" TEL: 555 "), Some("555"));
        assert_eq!(tel_number("mailto:a@b"), None);
        assert_eq!(tel_number("tel:"), None);
    }

    #[test]
    fn test_call_click_seen_despite_stop_propagation() {
        let mut doc = Document::new();
        let link = doc.append_element(doc.body(), "a", &[("href", "tel:+15550100000")]);
        let icon = doc.append_element(link, "span", &[]);
        doc.append_text(icon, " Call   now ");

        let mut calls = CallClickListener::new();
        let mut stopper = Stopper { node: icon };
        let mut event = DomEvent::click(icon);
        dispatch(&doc, &mut event, &mut [&mut stopper, &mut calls]);

        assert_eq!(
            calls.take(),
            Some(Interaction::CallClick {
                phone_number: "+15550100000".to_string(),
                link_text: "Call now".to_string(),
            })
        );
    }

    #[test]
    fn test_plain_link_is_not_a_call() {
        let mut doc = Document::new();
        let link = doc.append_element(doc.body(), "a", &[("href", "/contact")]);
        let mut calls = CallClickListener::new();
        dispatch(&doc, &mut DomEvent::click(link), &mut [&mut calls]);
        assert_eq!(calls.take(), None);
    }

    #[test]
    fn test_faq_marker_found_from_nested_target() {
        let mut doc = Document::new();
        let entry = doc.append_element(doc.body(), "details", &[(FAQ_MARKER_ATTR, "pricing-1")]);
        let summary = doc.append_element(entry, "summary", &[]);
        doc.append_text(summary, "How much?");

        let mut faq = FaqListener::new();
        dispatch(&doc, &mut DomEvent::click(summary), &mut [&mut faq]);

        assert!(matches!(
            faq.take(),
            Some(Interaction::Faq { marker, .. }) if marker == "pricing-1"
        ));
    }

    #[test]
    fn test_scroll_on_short_page_is_ignored() {
        let doc = Document::new();
        let mut scroll = ScrollListener::new();

        dispatch(
            &doc,
            &mut DomEvent::scroll(ScrollMetrics::new(0.0, 600.0, 800.0)),
            &mut [&mut scroll],
        );
        assert_eq!(scroll.take(), None);

        dispatch(
            &doc,
            &mut DomEvent::scroll(ScrollMetrics::new(300.0, 1400.0, 800.0)),
            &mut [&mut scroll],
        );
        assert_eq!(scroll.take(), Some(Interaction::Scroll { percent: 50.0 }));
    }
}
