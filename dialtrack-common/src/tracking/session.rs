//! Session-lifetime binding of a resolved number
//!
//! State machine:
//!
//! ```text
//! Absent --create--> Active --touch--> Active (same id, expiry extended)
//!   ^                  |
//!   +----expire--------+   (inactivity window elapsed)
//! ```
//!
//! A changed resolution never mutates a session in place: the old session is
//! dropped and a new one (new id) is created with the new definition.

use super::TrackingNumberDefinition;
use crate::attribution::AttributionSnapshot;
use crate::storage::{self, keys, Storage};
use crate::uuid_utils::IdSource;
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default inactivity window (minutes)
pub const DEFAULT_INACTIVITY_MINUTES: u32 = 30;

/// Attribution and page context captured when a session was created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SessionContext {
    pub landing_page: Option<String>,
    pub page_url: Option<String>,
    pub referrer: Option<String>,
    pub utm_source: Option<String>,
    pub utm_medium: Option<String>,
    pub utm_campaign: Option<String>,
}

impl SessionContext {
    pub fn from_snapshot(snapshot: &AttributionSnapshot) -> Self {
        Self {
            landing_page: snapshot.landing_page.clone(),
            page_url: snapshot.page_url.clone(),
            referrer: snapshot.referrer.clone(),
            utm_source: snapshot.utm_source.clone(),
            utm_medium: snapshot.utm_medium.clone(),
            utm_campaign: snapshot.utm_campaign.clone(),
        }
    }
}

/// Persisted tracking session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub definition: TrackingNumberDefinition,
    pub context: SessionContext,
}

impl TrackingSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Absent,
    Active(TrackingSession),
}

impl SessionState {
    /// Build state from a stored record, applying expiry
    pub fn from_stored(stored: Option<TrackingSession>, now: DateTime<Utc>) -> Self {
        match stored {
            Some(session) => SessionState::Active(session).expire(now),
            None => SessionState::Absent,
        }
    }

    /// Drop an active session whose inactivity window has elapsed
    pub fn expire(self, now: DateTime<Utc>) -> Self {
        match self {
            SessionState::Active(session) if session.is_expired(now) => {
                debug!(session_id = %session.id, "Tracking session expired");
                SessionState::Absent
            }
            other => other,
        }
    }

    pub fn active(&self) -> Option<&TrackingSession> {
        match self {
            SessionState::Active(session) => Some(session),
            SessionState::Absent => None,
        }
    }
}

/// Outcome of reconciling a page view against the session state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionTransition {
    /// New session; `replaced` is the id of the session it superseded, if any
    Assigned {
        session: TrackingSession,
        replaced: Option<Uuid>,
    },
    /// Same session, expiry extended
    Refreshed { session: TrackingSession },
}

impl SessionTransition {
    pub fn session(&self) -> &TrackingSession {
        match self {
            SessionTransition::Assigned { session, .. } => session,
            SessionTransition::Refreshed { session } => session,
        }
    }

    pub fn into_session(self) -> TrackingSession {
        match self {
            SessionTransition::Assigned { session, .. } => session,
            SessionTransition::Refreshed { session } => session,
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(self, SessionTransition::Assigned { .. })
    }
}

/// Creates, refreshes, loads and persists tracking sessions
#[derive(Debug, Clone, Copy)]
pub struct SessionManager {
    window: Duration,
}

impl SessionManager {
    pub fn new(inactivity_window: Duration) -> Self {
        Self {
            window: inactivity_window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Load the stored session; expired or malformed records read as absent
    pub fn load(&self, storage: &mut dyn Storage, now: DateTime<Utc>) -> Option<TrackingSession> {
        let stored: Option<TrackingSession> = storage::load_json(storage, keys::TRACKING_SESSION);
        match SessionState::from_stored(stored, now) {
            SessionState::Active(session) => Some(session),
            SessionState::Absent => {
                if let Err(e) = storage.remove(keys::TRACKING_SESSION) {
                    debug!("Could not clear tracking session record: {}", e);
                }
                None
            }
        }
    }

    /// Start a new session bound to `definition`
    pub fn create(
        &self,
        ids: &dyn IdSource,
        definition: &TrackingNumberDefinition,
        attribution: &AttributionSnapshot,
        now: DateTime<Utc>,
    ) -> Result<TrackingSession> {
        let id = ids
            .random_id()
            .ok_or_else(|| Error::Unavailable("no secure random source for session id".to_string()))?;

        Ok(TrackingSession {
            id,
            created_at: now,
            expires_at: now + self.window,
            definition: definition.clone(),
            context: SessionContext::from_snapshot(attribution),
        })
    }

    /// Extend expiry; id and definition are unchanged
    pub fn touch(&self, session: TrackingSession, now: DateTime<Utc>) -> TrackingSession {
        TrackingSession {
            expires_at: now + self.window,
            ..session
        }
    }

    pub fn persist(&self, storage: &mut dyn Storage, session: &TrackingSession) -> Result<()> {
        storage::save_json(storage, keys::TRACKING_SESSION, session)
    }

    /// Decide create / replace / refresh for the definition resolved on this page view
    pub fn reconcile(
        &self,
        state: SessionState,
        resolved: &TrackingNumberDefinition,
        attribution: &AttributionSnapshot,
        ids: &dyn IdSource,
        now: DateTime<Utc>,
    ) -> Result<SessionTransition> {
        match state.expire(now) {
            SessionState::Absent => {
                let session = self.create(ids, resolved, attribution, now)?;
                info!(
                    session_id = %session.id,
                    number_id = %resolved.id,
                    "Tracking number assigned"
                );
                Ok(SessionTransition::Assigned {
                    session,
                    replaced: None,
                })
            }
            SessionState::Active(current) if current.definition.id != resolved.id => {
                let session = self.create(ids, resolved, attribution, now)?;
                info!(
                    session_id = %session.id,
                    replaced = %current.id,
                    from = %current.definition.id,
                    to = %resolved.id,
                    "Tracking number reassigned"
                );
                Ok(SessionTransition::Assigned {
                    session,
                    replaced: Some(current.id),
                })
            }
            SessionState::Active(current) => {
                if current.definition != *resolved {
                    warn!(
                        number_id = %resolved.id,
                        "Stored session carries stale details for an unchanged number id"
                    );
                }
                // Same number id keeps the session; details follow the current table
                let session = TrackingSession {
                    definition: resolved.clone(),
                    ..self.touch(current, now)
                };
                debug!(session_id = %session.id, "Tracking session refreshed");
                Ok(SessionTransition::Refreshed { session })
            }
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(crate::time::minutes(DEFAULT_INACTIVITY_MINUTES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::uuid_utils::{OsIdSource, UnavailableIdSource};
    use chrono::TimeZone;

    fn def(id: &str) -> TrackingNumberDefinition {
        TrackingNumberDefinition::new(id, format!("({}) 555-0100", id.len()), "+15550100", "test")
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_absent_creates_assignment() {
        let manager = SessionManager::default();
        let snap = AttributionSnapshot::empty(t0());

        let transition = manager
            .reconcile(SessionState::Absent, &def("a"), &snap, &OsIdSource, t0())
            .unwrap();

        match transition {
            SessionTransition::Assigned { session, replaced } => {
                assert!(replaced.is_none());
                assert_eq!(session.expires_at, t0() + Duration::minutes(30));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_same_definition_refreshes_same_id() {
        let manager = SessionManager::default();
        let snap = AttributionSnapshot::empty(t0());
        let first = manager.create(&OsIdSource, &def("a"), &snap, t0()).unwrap();
        let later = t0() + Duration::minutes(10);

        let transition = manager
            .reconcile(SessionState::Active(first.clone()), &def("a"), &snap, &OsIdSource, later)
            .unwrap();

        assert!(!transition.is_assignment());
        assert_eq!(transition.session().id, first.id);
        assert_eq!(transition.session().expires_at, later + Duration::minutes(30));
    }

    #[test]
    fn test_refresh_carries_updated_number_details() {
        let manager = SessionManager::default();
        let snap = AttributionSnapshot::empty(t0());
        let first = manager.create(&OsIdSource, &def("a"), &snap, t0()).unwrap();
        let updated = TrackingNumberDefinition::new("a", "(800) 555-0199", "+18005550199", "test");

        let transition = manager
            .reconcile(SessionState::Active(first.clone()), &updated, &snap, &OsIdSource, t0())
            .unwrap();

        assert!(!transition.is_assignment());
        assert_eq!(transition.session().id, first.id);
        assert_eq!(transition.session().definition, updated);
    }

    #[test]
    fn test_different_definition_replaces_session() {
        let manager = SessionManager::default();
        let snap = AttributionSnapshot::empty(t0());
        let first = manager.create(&OsIdSource, &def("a"), &snap, t0()).unwrap();

        let transition = manager
            .reconcile(SessionState::Active(first.clone()), &def("b"), &snap, &OsIdSource, t0())
            .unwrap();

        match transition {
            SessionTransition::Assigned { session, replaced } => {
                assert_eq!(replaced, Some(first.id));
                assert_ne!(session.id, first.id);
                assert_eq!(session.definition.id, "b");
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_expired_session_is_not_refreshed() {
        let manager = SessionManager::new(Duration::minutes(30));
        let snap = AttributionSnapshot::empty(t0());
        let first = manager.create(&OsIdSource, &def("a"), &snap, t0()).unwrap();

        let transition = manager
            .reconcile(
                SessionState::Active(first.clone()),
                &def("a"),
                &snap,
                &OsIdSource,
                t0() + Duration::minutes(30),
            )
            .unwrap();

        match transition {
            SessionTransition::Assigned { session, replaced } => {
                assert!(replaced.is_none(), "expiry is not a replacement");
                assert_ne!(session.id, first.id);
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_load_drops_expired_record() {
        let manager = SessionManager::new(Duration::minutes(5));
        let mut storage = MemoryStorage::new();
        let snap = AttributionSnapshot::empty(t0());
        let session = manager.create(&OsIdSource, &def("a"), &snap, t0()).unwrap();
        manager.persist(&mut storage, &session).unwrap();

        assert_eq!(manager.load(&mut storage, t0() + Duration::minutes(4)), Some(session));
        assert_eq!(manager.load(&mut storage, t0() + Duration::minutes(6)), None);
        assert_eq!(storage.get(keys::TRACKING_SESSION).unwrap(), None);
    }

    #[test]
    fn test_load_discards_malformed_record() {
        let manager = SessionManager::default();
        let mut storage = MemoryStorage::new();
        storage.set(keys::TRACKING_SESSION, "not json").unwrap();
        assert_eq!(manager.load(&mut storage, t0()), None);
    }

    #[test]
    fn test_create_without_random_source_fails() {
        let manager = SessionManager::default();
        let snap = AttributionSnapshot::empty(t0());
        let result = manager.create(&UnavailableIdSource, &def("a"), &snap, t0());
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }
}
