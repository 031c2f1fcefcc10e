//! Synchronous replay strategy
//!
//! Reads commands one at a time with `SyncReader` and applies each to the
//! wallet service in file order, on the calling thread. Because every
//! command runs after the previous one has committed, the outcome of a
//! replay is fully determined by the file.

use crate::core::{Clock, LedgerStore, WalletService};
use crate::io::sync_reader::SyncReader;
use crate::strategy::{apply_command, write_final_accounts, ReplayStrategy, ReplaySummary};
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;

/// Single-threaded, in-order replay
#[derive(Debug, Clone, Copy)]
pub struct SyncReplayStrategy;

impl<S: LedgerStore, C: Clock> ReplayStrategy<S, C> for SyncReplayStrategy {
    fn replay(
        &self,
        service: &WalletService<S, C>,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, LedgerError> {
        let reader = SyncReader::new(input_path)?;
        let mut summary = ReplaySummary::default();

        for result in reader {
            match result {
                Ok(command) => {
                    let outcome = apply_command(service, &command);
                    summary.record(&outcome);
                }
                Err(error) => tracing::warn!(%error, "Skipping malformed record"),
            }
        }

        tracing::info!(
            applied = summary.applied,
            rejected = summary.rejected,
            "Replay finished"
        );
        write_final_accounts(service, output)?;
        Ok(summary)
    }
}
