//! Asynchronous batch replay strategy
//!
//! Reads commands in batches with `AsyncReader` and hands each batch to a
//! `BatchProcessor`, which applies commands of users that do not affect each
//! other concurrently on tokio's blocking pool.
//!
//! # Architecture
//!
//! ```text
//! AsyncReplayStrategy
//!     ├── BatchConfig (batch_size, max_concurrent_batches)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (ordered stages, per-component partitions + spawn_blocking)
//!         └── WalletService (shared, thread-safe)
//! ```
//!
//! Batches are processed one after another and each batch is applied as if
//! its commands ran in file order, so the final accounts match a sync replay
//! of the same file.

use crate::core::{Clock, LedgerStore, WalletService};
use crate::io::async_reader::AsyncReader;
use crate::strategy::batch_processor::{summarize, BatchProcessor};
use crate::strategy::{write_final_accounts, ReplayStrategy, ReplaySummary};
use crate::types::LedgerError;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tokio_util::compat::TokioAsyncReadCompatExt;

/// Configuration for batch processing
///
/// Controls how many commands are read per batch and how many partitions of
/// a batch may run at once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of commands per batch
    pub batch_size: usize,
    /// Maximum number of partitions applied concurrently
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig with custom values
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            tracing::warn!(
                "Invalid batch_size ({}), using default ({})",
                batch_size,
                default.batch_size
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            tracing::warn!(
                "Invalid max_concurrent_batches ({}), using default ({})",
                max_concurrent_batches,
                default.max_concurrent_batches
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Batched replay with per-user parallelism
#[derive(Debug, Clone)]
pub struct AsyncReplayStrategy {
    config: BatchConfig,
}

impl AsyncReplayStrategy {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }
}

impl<S, C> ReplayStrategy<S, C> for AsyncReplayStrategy
where
    S: LedgerStore + 'static,
    C: Clock + 'static,
{
    /// Replay the file batch by batch
    ///
    /// A dedicated multi-threaded runtime is built for the replay. Its
    /// blocking pool is capped at `max_concurrent_batches`, which bounds how
    /// many partitions run at once.
    fn replay(
        &self,
        service: &WalletService<S, C>,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, LedgerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.max_concurrent_batches)
            .max_blocking_threads(self.config.max_concurrent_batches)
            .build()
            .map_err(|e| LedgerError::IoError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        let processor = BatchProcessor::new(service.clone());

        let summary = runtime.block_on(async {
            let file = tokio::fs::File::open(input_path)
                .await
                .map_err(|e| match e.kind() {
                    ErrorKind::NotFound => LedgerError::FileNotFound {
                        path: input_path.display().to_string(),
                    },
                    _ => LedgerError::IoError {
                        message: format!("Failed to open file '{}': {}", input_path.display(), e),
                    },
                })?;

            let mut reader = AsyncReader::new(file.compat());
            let mut summary = ReplaySummary::default();

            loop {
                let batch = reader.read_batch(self.config.batch_size).await;
                if batch.is_empty() {
                    break;
                }

                let batch_len = batch.len();
                let outcomes = processor.process_batch(batch).await;
                tracing::debug!(commands = batch_len, "Batch applied");
                summary += summarize(&outcomes);
            }

            Ok::<_, LedgerError>(summary)
        })?;

        tracing::info!(
            applied = summary.applied,
            rejected = summary.rejected,
            "Replay finished"
        );
        write_final_accounts(service, output)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::{InMemoryLedgerStore, SystemClock};
    use crate::strategy::SyncReplayStrategy;
    use rstest::rstest;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn get_test_service() -> WalletService<InMemoryLedgerStore, SystemClock> {
        WalletService::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(SystemClock),
            LedgerConfig::default(),
        )
    }

    #[rstest]
    #[case::one_batch(1000)]
    #[case::many_batches(2)]
    #[case::single_command_batches(1)]
    fn test_async_strategy_replays_independent_users(#[case] batch_size: usize) {
        let file = create_temp_csv(
            "op,user,to_user,amount\n\
             create,1,,\n\
             create,2,,\n\
             deposit,1,,100.00\n\
             deposit,2,,5\n\
             withdraw,1,,30.00\n\
             withdraw,2,,6\n",
        );
        let strategy = AsyncReplayStrategy::new(BatchConfig::new(batch_size, 2));
        let mut output = Vec::new();

        let summary = strategy
            .replay(&get_test_service(), file.path(), &mut output)
            .unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                applied: 5,
                rejected: 1
            }
        );
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("user,account,balance\n"));
        assert!(output.contains("\n1,"));
        assert!(output.contains(",70.00\n"));
        assert!(output.ends_with(",5\n"));
    }

    fn replay_with(
        strategy: &dyn ReplayStrategy<InMemoryLedgerStore, SystemClock>,
        input: &Path,
    ) -> String {
        let mut output = Vec::new();
        strategy
            .replay(&get_test_service(), input, &mut output)
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[rstest]
    #[case::credit_before_destination_withdraw(
        "op,user,to_user,amount\n\
         create,1,,\n\
         deposit,1,,100\n\
         withdraw,1,,30\n\
         create,2,,\n\
         transfer,1,2,70\n\
         withdraw,2,,70\n"
    )]
    #[case::transfer_chain(
        "op,user,to_user,amount\n\
         create,3,,\n\
         create,1,,\n\
         create,2,,\n\
         create,4,,\n\
         deposit,1,,100\n\
         deposit,4,,9\n\
         transfer,2,3,1\n\
         transfer,1,2,60\n\
         transfer,2,3,60\n\
         withdraw,3,,60\n\
         withdraw,1,,41\n\
         withdraw,4,,9\n\
         create,5,,\n\
         transfer,3,5,0.5\n"
    )]
    fn test_async_matches_sync_with_default_batches(#[case] content: &str) {
        let file = create_temp_csv(content);

        for _ in 0..20 {
            let sync_output = replay_with(&SyncReplayStrategy, file.path());
            let async_output =
                replay_with(&AsyncReplayStrategy::new(BatchConfig::default()), file.path());

            assert_eq!(async_output, sync_output);
        }
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let strategy = AsyncReplayStrategy::new(BatchConfig::default());
        let mut output = Vec::new();

        let result = strategy.replay(
            &get_test_service(),
            Path::new("nonexistent.csv"),
            &mut output,
        );

        assert!(matches!(result, Err(LedgerError::FileNotFound { .. })));
    }

    #[rstest]
    #[case::zero_batch_size(0, 4, 1000, 4)]
    #[case::zero_concurrency(10, 0, 10, num_cpus::get())]
    #[case::custom(10, 4, 10, 4)]
    fn test_batch_config_new(
        #[case] batch_size: usize,
        #[case] max_concurrent: usize,
        #[case] expected_batch_size: usize,
        #[case] expected_concurrent: usize,
    ) {
        let config = BatchConfig::new(batch_size, max_concurrent);

        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_concurrent);
    }
}
