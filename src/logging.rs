//! Log output for the binary
//!
//! Events go to stderr so stdout stays clean CSV. The filter comes from
//! `--log-level` when given, otherwise from `RUST_LOG`, otherwise `info`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Build the event filter from an explicit directive or the environment
pub fn env_filter(level: Option<&str>) -> EnvFilter {
    match level {
        Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|error| {
            eprintln!(
                "Warning: Invalid log level '{}' ({}), using default ({})",
                directive, error, DEFAULT_FILTER
            );
            EnvFilter::new(DEFAULT_FILTER)
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// Install the global subscriber
///
/// Calling this more than once keeps the first subscriber.
pub fn init(level: Option<&str>) {
    let installed = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();

    if installed.is_err() {
        tracing::debug!("Global subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_level_is_used() {
        assert_eq!(env_filter(Some("debug")).to_string(), "debug");
    }

    #[test]
    fn test_invalid_level_falls_back_to_default() {
        assert_eq!(env_filter(Some("rust_wallet_ledger=verbose")).to_string(), DEFAULT_FILTER);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(Some("warn"));
        init(Some("warn"));
    }
}
