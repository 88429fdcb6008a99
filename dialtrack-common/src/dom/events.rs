//! Click and scroll dispatch with capture and bubble phases
//!
//! Click order: document capture listeners, node capture listeners root→target,
//! node bubble listeners target→root, document bubble listeners.
//! `stop_propagation` lets the remaining listeners on the current node run and
//! then stops. Scroll events only reach document-scoped listeners.

use super::{Document, NodeId};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Click,
    Scroll,
}

/// Scroll position of the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollMetrics {
    pub scroll_top: f64,
    pub scroll_height: f64,
    pub viewport_height: f64,
}

impl ScrollMetrics {
    pub fn new(scroll_top: f64, scroll_height: f64, viewport_height: f64) -> Self {
        Self {
            scroll_top,
            scroll_height,
            viewport_height,
        }
    }

    /// Percent scrolled, clamped to [0, 100]
    ///
    /// `None` when the page does not scroll (content fits the viewport).
    pub fn percent(&self) -> Option<f64> {
        let scrollable = self.scroll_height - self.viewport_height;
        if !scrollable.is_finite() || scrollable <= 0.0 || !self.scroll_top.is_finite() {
            return None;
        }
        Some((self.scroll_top / scrollable * 100.0).clamp(0.0, 100.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventPayload {
    Click { target: NodeId },
    Scroll(ScrollMetrics),
}

/// An event in flight
#[derive(Debug, Clone)]
pub struct DomEvent {
    payload: EventPayload,
    propagation_stopped: bool,
    default_prevented: bool,
    in_passive_listener: bool,
}

impl DomEvent {
    pub fn click(target: NodeId) -> Self {
        Self::new(EventPayload::Click { target })
    }

    pub fn scroll(metrics: ScrollMetrics) -> Self {
        Self::new(EventPayload::Scroll(metrics))
    }

    fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            propagation_stopped: false,
            default_prevented: false,
            in_passive_listener: false,
        }
    }

    pub fn payload(&self) -> EventPayload {
        self.payload
    }

    pub fn event_type(&self) -> EventType {
        match self.payload {
            EventPayload::Click { .. } => EventType::Click,
            EventPayload::Scroll(_) => EventType::Scroll,
        }
    }

    pub fn stop_propagation(&mut self) {
        self.propagation_stopped = true;
    }

    pub fn propagation_stopped(&self) -> bool {
        self.propagation_stopped
    }

    /// Ignored inside passive listeners
    pub fn prevent_default(&mut self) {
        if self.in_passive_listener {
            debug!("prevent_default ignored in passive listener");
            return;
        }
        self.default_prevented = true;
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

/// Where a listener is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Document,
    Node(NodeId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListenerOptions {
    pub capture: bool,
    pub passive: bool,
}

pub trait DomListener {
    fn event_type(&self) -> EventType;

    fn scope(&self) -> Scope {
        Scope::Document
    }

    fn options(&self) -> ListenerOptions {
        ListenerOptions::default()
    }

    fn handle(&mut self, doc: &Document, event: &mut DomEvent);
}

fn invoke(
    doc: &Document,
    event: &mut DomEvent,
    listeners: &mut [&mut dyn DomListener],
    scope: Scope,
    capture: bool,
) {
    let event_type = event.event_type();
    for listener in listeners.iter_mut() {
        if listener.event_type() != event_type || listener.scope() != scope {
            continue;
        }
        let options = listener.options();
        if options.capture != capture {
            continue;
        }
        event.in_passive_listener = options.passive;
        listener.handle(doc, event);
        event.in_passive_listener = false;
    }
}

/// Deliver `event` to `listeners` in DOM phase order
pub fn dispatch(doc: &Document, event: &mut DomEvent, listeners: &mut [&mut dyn DomListener]) {
    let path: Vec<NodeId> = match event.payload {
        EventPayload::Click { target } => doc.ancestors(target),
        EventPayload::Scroll(_) => Vec::new(),
    };

    invoke(doc, event, listeners, Scope::Document, true);
    for node in path.iter().rev() {
        if event.propagation_stopped {
            return;
        }
        invoke(doc, event, listeners, Scope::Node(*node), true);
    }
    for node in path.iter() {
        if event.propagation_stopped {
            return;
        }
        invoke(doc, event, listeners, Scope::Node(*node), false);
    }
    if event.propagation_stopped {
        return;
    }
    invoke(doc, event, listeners, Scope::Document, false);
}
