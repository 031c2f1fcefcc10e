use crate::config::LedgerConfig;
use crate::strategy::BatchConfig;
use crate::types::{Timestamp, UserId};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Per-user wallet ledger with point-in-time balances
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger")]
#[command(about = "Per-user wallet ledger with point-in-time balances", long_about = None)]
pub struct CliArgs {
    /// SQLite database file; an in-memory ledger is used when omitted
    #[arg(long = "database", value_name = "PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Retries of a request that hit a transient store failure
    #[arg(long = "max-retries", value_name = "COUNT", global = true)]
    pub max_retries: Option<u32>,

    /// Pause before the first retry, in milliseconds
    #[arg(long = "retry-backoff-ms", value_name = "MS", global = true)]
    pub retry_backoff_ms: Option<u64>,

    /// How long to wait for exclusive access to an account, in milliseconds
    #[arg(long = "lock-timeout-ms", value_name = "MS", global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// Log filter directive (overrides RUST_LOG)
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Ledger operations
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open an account with a zero balance
    CreateAccount {
        #[arg(value_name = "USER")]
        user: UserId,
    },

    /// Print the current balance
    Balance {
        #[arg(value_name = "USER")]
        user: UserId,
    },

    /// Print the balance as it stood at a past instant
    BalanceAt {
        #[arg(value_name = "USER")]
        user: UserId,
        /// RFC 3339 timestamp; without an offset it is read as UTC
        #[arg(value_name = "TIMESTAMP", value_parser = parse_timestamp)]
        at: Timestamp,
    },

    /// Credit an amount and print the new balance
    Deposit {
        #[arg(value_name = "USER")]
        user: UserId,
        #[arg(value_name = "AMOUNT", value_parser = parse_amount, allow_hyphen_values = true)]
        amount: Decimal,
    },

    /// Debit an amount and print the new balance
    Withdraw {
        #[arg(value_name = "USER")]
        user: UserId,
        #[arg(value_name = "AMOUNT", value_parser = parse_amount, allow_hyphen_values = true)]
        amount: Decimal,
    },

    /// Move an amount between two users
    Transfer {
        #[arg(value_name = "FROM")]
        from: UserId,
        #[arg(value_name = "TO")]
        to: UserId,
        #[arg(value_name = "AMOUNT", value_parser = parse_amount, allow_hyphen_values = true)]
        amount: Decimal,
    },

    /// List a user's entries as CSV
    Transactions {
        #[arg(value_name = "USER")]
        user: UserId,
    },

    /// Replay a CSV file of commands and print the final accounts
    Replay(ReplayArgs),
}

/// Arguments of the replay command
#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Input CSV file with columns op,user,to_user,amount
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Replay strategy to use
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "sync",
        help = "Replay strategy: 'sync' for in-order or 'async' for per-user parallel batches"
    )]
    pub strategy: StrategyType,

    /// Number of commands per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of commands per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of partitions applied concurrently (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of partitions applied concurrently (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,
}

/// Available replay strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

/// Parse an exact decimal amount
///
/// Sign is not checked here; the ledger rejects non-positive amounts itself.
pub fn parse_amount(value: &str) -> Result<Decimal, String> {
    Decimal::from_str(value.trim()).map_err(|e| format!("invalid amount '{}': {}", value, e))
}

/// Parse a timestamp and normalise it to UTC
///
/// Accepts RFC 3339 (offsets are converted to UTC), a naive date-time with
/// `T` or a space as separator (read as UTC), or a bare date (midnight UTC).
pub fn parse_timestamp(value: &str) -> Result<Timestamp, String> {
    let value = value.trim();

    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| format!("invalid timestamp '{}': expected RFC 3339", value))
}

impl CliArgs {
    /// Build the ledger configuration from the tuning flags
    ///
    /// Flags that were not given keep their default values.
    pub fn to_ledger_config(&self) -> LedgerConfig {
        let default = LedgerConfig::default();
        LedgerConfig::new(
            self.max_retries.unwrap_or(default.max_retries),
            self.retry_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(default.retry_backoff),
            self.lock_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.lock_timeout),
        )
    }
}

impl ReplayArgs {
    /// Create a BatchConfig from the replay arguments
    ///
    /// Missing values fall back to the defaults; zero values are replaced by
    /// the defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }
}
