//! Ledger tuning configuration
//!
//! Controls how long a transaction waits for exclusive access to an account
//! and how often the service retries an attempt that failed for a transient
//! store reason.

use std::time::Duration;

/// Default wait for an account lease (or a busy database) before giving up
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retries after the first attempt
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause before the first retry; later retries wait proportionally longer
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Configuration for the wallet service and its store
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Retries of a whole attempt after a `Conflict` or `StoreUnavailable`
    pub max_retries: u32,
    /// Pause before retry `n` is `n * retry_backoff`
    pub retry_backoff: Duration,
    /// Wait for exclusive account access before failing with `Conflict`
    pub lock_timeout: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl LedgerConfig {
    /// Create a LedgerConfig with custom values
    ///
    /// A zero lock timeout would make every contended transaction fail at
    /// once, so it falls back to the default with a warning.
    pub fn new(max_retries: u32, retry_backoff: Duration, lock_timeout: Duration) -> Self {
        let lock_timeout = if lock_timeout.is_zero() {
            tracing::warn!(
                "Invalid lock_timeout ({:?}), using default ({:?})",
                lock_timeout,
                DEFAULT_LOCK_TIMEOUT
            );
            DEFAULT_LOCK_TIMEOUT
        } else {
            lock_timeout
        };

        Self {
            max_retries,
            retry_backoff,
            lock_timeout,
        }
    }

    /// Pause before retry number `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(10));
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_zero_lock_timeout_falls_back_to_default() {
        let config = LedgerConfig::new(1, Duration::ZERO, Duration::ZERO);
        assert_eq!(config.lock_timeout, DEFAULT_LOCK_TIMEOUT);
        assert_eq!(config.max_retries, 1);
    }

    #[rstest]
    #[case::first(1, Duration::from_millis(10))]
    #[case::second(2, Duration::from_millis(20))]
    #[case::fifth(5, Duration::from_millis(50))]
    fn test_backoff_grows_linearly(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(LedgerConfig::default().backoff_for(attempt), expected);
    }
}
