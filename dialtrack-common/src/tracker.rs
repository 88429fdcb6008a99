//! Page-level orchestration
//!
//! [`CallTracker`] is the embedding surface. On every navigation it:
//! 1. reconciles attribution from the URL and referrer
//! 2. loads the tracking session and resolves the number (sticky on the
//!    session's definition)
//! 3. creates, replaces or refreshes the session and persists it
//! 4. brings the document's phone references in line with the number
//! 5. emits `tracking_number_assigned` or `tracking_session_refreshed`,
//!    then `page_view`
//!
//! Clicks and scrolls are routed through [`CallTracker::dispatch`]. No entry
//! point returns an error; degraded states are logged and skipped.

use crate::analytics::{
    transport, AnalyticsEmitter, CallClickListener, EventParams, EventTags, ExposureLog,
    FaqListener, Interaction, PageContext, PageViewContext, ScrollListener, StandardEvent,
    Transport,
};
use crate::attribution::{self, AttributionSnapshot, AttributionStore};
use crate::config::TrackingConfig;
use crate::dom::{self, Document, DomEvent, DomListener, DomSynchronizer, NodeId, NumberBroadcast, ScrollMetrics, SyncReport};
use crate::experiments::VariantAssigner;
use crate::identity::{self, ClientId};
use crate::storage::{JsonFileStorage, MemoryStorage, Storage};
use crate::time::{Clock, SystemClock};
use crate::tracking::{
    resolve, MatchRule, NumberTable, SessionManager, SessionState, SessionTransition,
    TrackingNumberDefinition, TrackingSession,
};
use crate::uuid_utils::{IdSource, OsIdSource};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What one navigation decided
#[derive(Debug, Clone, PartialEq)]
pub struct PageOutcome {
    pub definition: TrackingNumberDefinition,
    pub rule: MatchRule,
    /// `None` when no session could be created (no secure random source)
    pub session_id: Option<Uuid>,
    /// A session was created or replaced on this navigation
    pub assigned: bool,
    pub replaced: Option<Uuid>,
    pub sync: SyncReport,
}

/// Collects the host capabilities a tracker runs on
///
/// Unset parts default to: durable storage in the platform data directory
/// (in-memory if that cannot be opened), in-memory session storage, the
/// transport described by `[telemetry]`, the wall clock, and the OS random
/// source.
pub struct TrackerBuilder {
    config: TrackingConfig,
    local: Option<Box<dyn Storage>>,
    session: Option<Box<dyn Storage>>,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    ids: Option<Arc<dyn IdSource + Send + Sync>>,
}

impl TrackerBuilder {
    pub fn new(config: TrackingConfig) -> Self {
        Self {
            config,
            local: None,
            session: None,
            transport: None,
            clock: None,
            ids: None,
        }
    }

    /// Durable storage (client identity, experiment assignments)
    pub fn local_storage(mut self, storage: Box<dyn Storage>) -> Self {
        self.local = Some(storage);
        self
    }

    /// Session-scoped storage (attribution, tracking session, exposures)
    pub fn session_storage(mut self, storage: Box<dyn Storage>) -> Self {
        self.session = Some(storage);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_source(mut self, ids: Arc<dyn IdSource + Send + Sync>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn build(self) -> CallTracker {
        let config = self.config;

        let local = self.local.unwrap_or_else(|| {
            let path = JsonFileStorage::default_path();
            match JsonFileStorage::open(&path) {
                Ok(storage) => Box::new(storage) as Box<dyn Storage>,
                Err(e) => {
                    warn!(
                        "Durable storage at {} unavailable, identity will not persist: {}",
                        path.display(),
                        e
                    );
                    Box::new(MemoryStorage::new())
                }
            }
        });
        let mut session = self
            .session
            .unwrap_or_else(|| Box::new(MemoryStorage::new()));
        let transport = self
            .transport
            .unwrap_or_else(|| transport::from_config(&config.telemetry));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self.ids.unwrap_or_else(|| Arc::new(OsIdSource));

        let synchronizer =
            DomSynchronizer::new(config.known_dialables(), config.dom.legacy_text_substitution);
        let exposures = ExposureLog::load(session.as_mut());
        debug!(
            log_filter = %config.logging.directive(),
            inactivity_minutes = config.session.inactivity_minutes,
            "Call tracker ready"
        );

        CallTracker {
            sessions: SessionManager::new(config.inactivity_window()),
            numbers: config.numbers,
            synchronizer,
            local,
            session,
            emitter: AnalyticsEmitter::new(transport, clock.clone()),
            clock,
            ids,
            variants: VariantAssigner::new(),
            exposures,
            page: PageViewContext::default(),
            attribution: None,
            current: None,
        }
    }
}

pub struct CallTracker {
    numbers: NumberTable,
    sessions: SessionManager,
    synchronizer: DomSynchronizer,
    local: Box<dyn Storage>,
    session: Box<dyn Storage>,
    clock: Arc<dyn Clock + Send + Sync>,
    ids: Arc<dyn IdSource + Send + Sync>,
    emitter: AnalyticsEmitter,
    variants: VariantAssigner,
    exposures: ExposureLog,
    page: PageViewContext,
    attribution: Option<AttributionSnapshot>,
    current: Option<TrackingSession>,
}

impl CallTracker {
    pub fn builder(config: TrackingConfig) -> TrackerBuilder {
        TrackerBuilder::new(config)
    }

    /// Full page load; `referrer` is the document referrer, if any
    pub fn page_load(&mut self, doc: &mut Document, url: &str, referrer: Option<&str>) -> PageOutcome {
        self.navigate(doc, url, referrer)
    }

    /// Client-side navigation within the same document
    pub fn route_change(&mut self, doc: &mut Document, url: &str) -> PageOutcome {
        self.navigate(doc, url, None)
    }

    fn ensure_identity(&mut self) {
        if self.emitter.client_id().is_none() {
            let client_id = identity::get_or_create(self.local.as_mut(), self.ids.as_ref());
            self.emitter.set_client_id(client_id);
        }
    }

    fn navigate(&mut self, doc: &mut Document, url: &str, referrer: Option<&str>) -> PageOutcome {
        let now = self.clock.now();
        self.ensure_identity();

        let snapshot = AttributionStore::reconcile(self.session.as_mut(), url, referrer, now);

        let stored = self.sessions.load(self.session.as_mut(), now);
        let sticky = stored.as_ref().map(|s| s.definition.id.clone());
        let resolution = resolve(&self.numbers, &snapshot, sticky.as_deref());
        let rule = resolution.rule;
        let definition = resolution.definition.clone();
        debug!(rule = rule.as_str(), number_id = %definition.id, "Tracking number resolved");

        let state = SessionState::from_stored(stored, now);
        let transition =
            match self
                .sessions
                .reconcile(state, &definition, &snapshot, self.ids.as_ref(), now)
            {
                Ok(transition) => Some(transition),
                Err(e) => {
                    warn!("Tracking session unavailable: {}", e);
                    None
                }
            };
        if let Some(transition) = &transition {
            if let Err(e) = self.sessions.persist(self.session.as_mut(), transition.session()) {
                warn!("Failed to persist tracking session: {}", e);
            }
        }

        let path = attribution::page_path(url);
        self.page.reset(path.clone());
        self.emitter.set_page(PageContext {
            path,
            title: doc.title().to_string(),
            location: url.to_string(),
        });
        self.emitter.set_tags(EventTags {
            session_id: transition.as_ref().map(|t| t.session().id),
            number_id: Some(definition.id.clone()),
            attribution: snapshot.event_fields(),
        });

        let sync = self
            .synchronizer
            .apply_number(doc, &definition.display, &definition.dialable);

        let number_params = EventParams::new()
            .with("number_label", definition.label.as_str())
            .with("number_display", definition.display.as_str())
            .with("match_rule", rule.as_str());

        let mut outcome = PageOutcome {
            definition,
            rule,
            session_id: None,
            assigned: false,
            replaced: None,
            sync,
        };

        match transition {
            Some(SessionTransition::Assigned { session, replaced }) => {
                info!(
                    session_id = %session.id,
                    number_id = %outcome.definition.id,
                    rule = rule.as_str(),
                    "Tracking number assigned"
                );
                self.emitter.send_standard(
                    StandardEvent::TrackingNumberAssigned,
                    number_params.with_opt("replaced_session_id", replaced.map(|id| id.to_string())),
                );
                outcome.session_id = Some(session.id);
                outcome.assigned = true;
                outcome.replaced = replaced;
                self.current = Some(session);
            }
            Some(SessionTransition::Refreshed { session }) => {
                self.emitter
                    .send_standard(StandardEvent::TrackingSessionRefreshed, number_params);
                outcome.session_id = Some(session.id);
                self.current = Some(session);
            }
            None => self.current = None,
        }

        self.emitter.send_standard(
            StandardEvent::PageView,
            EventParams::new().with_opt("referrer", snapshot.referrer.clone()),
        );
        self.attribution = Some(snapshot);
        outcome
    }

    /// Deliver a DOM event to the tracker's listeners and the page's own
    ///
    /// Tracker listeners are registered first, at document level: click
    /// listeners in the capture phase, scroll passively. The event is
    /// returned so the caller can inspect propagation and default state.
    pub fn dispatch(
        &mut self,
        doc: &Document,
        mut event: DomEvent,
        page_listeners: &mut [&mut dyn DomListener],
    ) -> DomEvent {
        let mut calls = CallClickListener::new();
        let mut faq = FaqListener::new();
        let mut scroll = ScrollListener::new();
        {
            let mut listeners: Vec<&mut dyn DomListener> =
                Vec::with_capacity(page_listeners.len() + 3);
            listeners.push(&mut calls);
            listeners.push(&mut faq);
            listeners.push(&mut scroll);
            for listener in page_listeners.iter_mut() {
                listeners.push(&mut **listener);
            }
            dom::dispatch(doc, &mut event, &mut listeners);
        }

        for observed in [calls.take(), faq.take(), scroll.take()].into_iter().flatten() {
            self.record(observed);
        }
        event
    }

    pub fn click(&mut self, doc: &Document, target: NodeId) -> DomEvent {
        self.dispatch(doc, DomEvent::click(target), &mut [])
    }

    pub fn scroll(&mut self, doc: &Document, metrics: ScrollMetrics) {
        self.dispatch(doc, DomEvent::scroll(metrics), &mut []);
    }

    fn record(&mut self, observed: Interaction) {
        match observed {
            Interaction::CallClick {
                phone_number,
                link_text,
            } => {
                self.emitter.send_standard(
                    StandardEvent::CallClick,
                    EventParams::new()
                        .with("phone_number", phone_number)
                        .with("link_text", link_text),
                );
            }
            Interaction::Faq { marker, question } => {
                if self.page.record_faq(&marker) {
                    self.emitter.send_standard(
                        StandardEvent::FaqInteraction,
                        EventParams::new()
                            .with("faq_id", marker)
                            .with("faq_question", question),
                    );
                }
            }
            Interaction::Scroll { percent } => {
                for threshold in self.page.record_scroll(percent) {
                    self.emitter.send_standard(
                        StandardEvent::ScrollDepth,
                        EventParams::new().with("percent_scrolled", threshold),
                    );
                }
            }
        }
    }

    /// Variant of `experiment` for this visitor, reporting the first exposure per session
    pub fn assign_variant<S: AsRef<str>>(&mut self, experiment: &str, variants: &[S]) -> String {
        self.ensure_identity();
        let client_id = self.emitter.client_id().cloned();
        let variant =
            self.variants
                .assign(self.local.as_mut(), client_id.as_ref(), experiment, variants);
        if variants.is_empty() {
            return variant;
        }
        if client_id.is_none() {
            // Left unrecorded so the exposure is reported once identity exists
            debug!(experiment, "Exposure not reported, client identity unavailable");
            return variant;
        }

        if self
            .exposures
            .record(self.session.as_mut(), experiment, &variant)
        {
            self.emitter.send_standard(
                StandardEvent::AbTestAssignment,
                EventParams::new()
                    .with("experiment_name", experiment)
                    .with("variant_id", variant.as_str()),
            );
        }
        variant
    }

    /// Emit an application-defined event with the standard context attached
    pub fn track(&self, name: &str, params: EventParams) -> bool {
        self.emitter.send(name, params)
    }

    pub fn set_user_id(&mut self, user_id: Option<String>) {
        self.emitter.set_user_id(user_id);
    }

    /// Channel carrying the displayed number to phone-slot components
    pub fn broadcast(&self) -> &NumberBroadcast {
        self.synchronizer.broadcast()
    }

    pub fn client_id(&self) -> Option<&ClientId> {
        self.emitter.client_id()
    }

    pub fn current_session(&self) -> Option<&TrackingSession> {
        self.current.as_ref()
    }

    pub fn attribution(&self) -> Option<&AttributionSnapshot> {
        self.attribution.as_ref()
    }

    pub fn page_view(&self) -> &PageViewContext {
        &self.page
    }

    pub fn numbers(&self) -> &NumberTable {
        &self.numbers
    }
}
