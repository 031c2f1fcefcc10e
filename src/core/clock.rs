//! Time sources for entry timestamps
//!
//! The engine stamps entries with whatever clock it was built with. Readings
//! are truncated to whole microseconds, the resolution every store keeps, so
//! a timestamp read back from storage compares equal to the one written.

use crate::types::Timestamp;
use chrono::{Duration, SubsecRound, Utc};
use std::sync::Mutex;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// The current instant in UTC, truncated to microseconds
    fn now(&self) -> Timestamp;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().trunc_subsecs(6)
    }
}

/// A clock that only moves when told to
///
/// Used to replay histories at known instants.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock stopped at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start.trunc_subsecs(6)),
        }
    }

    /// Jump to `instant`
    pub fn set(&self, instant: Timestamp) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            instant.trunc_subsecs(6);
    }

    /// Move forward by `step` and return the new reading
    pub fn advance(&self, step: Duration) -> Timestamp {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = (*now + step).trunc_subsecs(6);
        *now
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_system_clock_has_microsecond_resolution() {
        let now = SystemClock.now();
        assert_eq!(now.nanosecond() % 1_000, 0);
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 1, 6, 15, 0, 0).unwrap();
        let clock = ManualClock::new(start);

        assert_eq!(clock.now(), start);
        let later = clock.advance(Duration::minutes(5));
        assert_eq!(later, start + Duration::minutes(5));
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_manual_clock_truncates_nanoseconds() {
        let start = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let clock = ManualClock::new(start);

        assert_eq!(clock.now().nanosecond(), 123_456_000);
    }
}
