//! Replay strategies
//!
//! A replay strategy reads a CSV file of commands, applies each one to a
//! [`WalletService`] and writes the resulting accounts. Different
//! implementations (synchronous, asynchronous batch) can be selected at
//! runtime.
//!
//! Rejected commands (insufficient funds, unknown users, ...) are logged and
//! counted; they never stop a replay. Only failures to read the input or
//! write the output do.

use crate::cli::StrategyType;
use crate::core::{Clock, LedgerStore, RequestContext, WalletService};
use crate::io::write_accounts_csv;
use crate::types::{CommandRecord, CommandType, LedgerError};
use std::io::Write;
use std::ops::AddAssign;
use std::path::Path;

pub mod r#async;
pub mod batch_processor;
pub mod sync;

pub use self::r#async::{AsyncReplayStrategy, BatchConfig};
pub use batch_processor::{BatchProcessor, CommandOutcome};
pub use sync::SyncReplayStrategy;

/// Counts of what a replay did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Commands the ledger accepted
    pub applied: usize,
    /// Commands the ledger rejected
    pub rejected: usize,
}

impl ReplaySummary {
    pub(crate) fn record(&mut self, result: &Result<(), LedgerError>) {
        match result {
            Ok(()) => self.applied += 1,
            Err(_) => self.rejected += 1,
        }
    }
}

impl AddAssign for ReplaySummary {
    fn add_assign(&mut self, other: Self) {
        self.applied += other.applied;
        self.rejected += other.rejected;
    }
}

/// Replay strategy trait for complete command replay pipelines
pub trait ReplayStrategy<S, C>: Send + Sync {
    /// Replay the commands in `input_path` and write the final accounts
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The input file cannot be opened
    /// - The final accounts cannot be listed or written to `output`
    ///
    /// Individual command failures are logged and counted in the summary.
    fn replay(
        &self,
        service: &WalletService<S, C>,
        input_path: &Path,
        output: &mut dyn Write,
    ) -> Result<ReplaySummary, LedgerError>;
}

/// Apply one command to the service under its own request context
pub fn apply_command<S: LedgerStore, C: Clock>(
    service: &WalletService<S, C>,
    command: &CommandRecord,
) -> Result<(), LedgerError> {
    let ctx = RequestContext::new();
    let op = command.op.as_str();
    let amount = || {
        command
            .amount
            .ok_or_else(|| LedgerError::missing_field(op, command.user, "amount"))
    };

    match command.op {
        CommandType::Create => service.create_account(&ctx, command.user).map(|_| ()),
        CommandType::Deposit => service.deposit(&ctx, command.user, amount()?).map(|_| ()),
        CommandType::Withdraw => service.withdraw(&ctx, command.user, amount()?).map(|_| ()),
        CommandType::Transfer => {
            let to = command
                .to_user
                .ok_or_else(|| LedgerError::missing_field(op, command.user, "to_user"))?;
            service.transfer(&ctx, command.user, to, amount()?)
        }
    }
}

/// Write every account of the service as CSV
pub(crate) fn write_final_accounts<S: LedgerStore, C: Clock>(
    service: &WalletService<S, C>,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let accounts = service.list_accounts(&RequestContext::new())?;
    write_accounts_csv(&accounts, output)
}

/// Create a replay strategy based on the specified strategy type
///
/// `config` only applies to the async strategy; `None` means defaults.
pub fn create_strategy<S, C>(
    strategy_type: StrategyType,
    config: Option<BatchConfig>,
) -> Box<dyn ReplayStrategy<S, C>>
where
    S: LedgerStore + 'static,
    C: Clock + 'static,
{
    match strategy_type {
        StrategyType::Sync => Box::new(SyncReplayStrategy),
        StrategyType::Async => Box::new(AsyncReplayStrategy::new(config.unwrap_or_default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::{InMemoryLedgerStore, SystemClock};
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn get_test_service() -> WalletService<InMemoryLedgerStore, SystemClock> {
        WalletService::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(SystemClock),
            LedgerConfig::default(),
        )
    }

    fn command(op: CommandType, user: i64, to_user: Option<i64>, amount: Option<i64>) -> CommandRecord {
        CommandRecord {
            op,
            user,
            to_user,
            amount: amount.map(Decimal::from),
        }
    }

    #[test]
    fn test_apply_command_routes_every_op() {
        let service = get_test_service();
        let ctx = RequestContext::new();

        for cmd in [
            command(CommandType::Create, 1, None, None),
            command(CommandType::Create, 2, None, None),
            command(CommandType::Deposit, 1, None, Some(100)),
            command(CommandType::Withdraw, 1, None, Some(30)),
            command(CommandType::Transfer, 1, Some(2), Some(70)),
        ] {
            apply_command(&service, &cmd).unwrap();
        }

        assert_eq!(service.get_balance(&ctx, 1).unwrap(), Decimal::ZERO);
        assert_eq!(service.get_balance(&ctx, 2).unwrap(), Decimal::from(70));
    }

    #[test]
    fn test_apply_command_reports_missing_fields() {
        let service = get_test_service();

        assert_eq!(
            apply_command(&service, &command(CommandType::Deposit, 1, None, None)),
            Err(LedgerError::missing_field("deposit", 1, "amount"))
        );
        assert_eq!(
            apply_command(&service, &command(CommandType::Transfer, 1, None, Some(5))),
            Err(LedgerError::missing_field("transfer", 1, "to_user"))
        );
    }

    #[test]
    fn test_summary_accumulates() {
        let mut summary = ReplaySummary::default();
        summary.record(&Ok(()));
        summary.record(&Err(LedgerError::account_not_found(1)));
        summary += ReplaySummary {
            applied: 2,
            rejected: 0,
        };

        assert_eq!(
            summary,
            ReplaySummary {
                applied: 3,
                rejected: 1
            }
        );
    }
}
