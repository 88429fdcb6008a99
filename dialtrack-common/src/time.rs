//! Timestamp utilities and the injectable clock

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert minutes to a chrono duration
pub fn minutes(minutes: u32) -> chrono::Duration {
    chrono::Duration::minutes(i64::from(minutes))
}

/// Source of "now" for every time-dependent decision
///
/// Session expiry and attribution timestamps read the clock instead of
/// calling `Utc::now()` directly so that page-view sequences can be replayed.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}

/// Manually advanced clock
///
/// Clones share the same instant, so a test can keep one handle and hand
/// another to the tracker.
#[derive(Debug, Clone)]
pub struct ManualClock {
    instant: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            instant: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut instant) = self.instant.lock() {
            *instant += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut instant) = self.instant.lock() {
            *instant = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.instant
            .lock()
            .map(|instant| *instant)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // Should be a reasonable timestamp (after year 2000)
        assert!(timestamp.timestamp() > 946_684_800);
    }

    #[test]
    fn test_minutes_conversion() {
        assert_eq!(minutes(30), chrono::Duration::seconds(1800));
        assert_eq!(minutes(0), chrono::Duration::zero());
    }

    #[test]
    fn test_manual_clock_advances_all_clones() {
        let start = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        let shared = clock.clone();

        clock.advance(chrono::Duration::minutes(5));

        assert_eq!(shared.now(), start + chrono::Duration::minutes(5));
    }

    #[test]
    fn test_manual_clock_set() {
        let start = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let later = start + chrono::Duration::days(2);
        let clock = ManualClock::new(start);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
