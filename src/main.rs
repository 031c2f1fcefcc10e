//! Wallet Ledger CLI
//!
//! Command-line interface over the wallet ledger.
//!
//! # Usage
//!
//! ```bash
//! wallet-ledger --database ledger.db create-account 1
//! wallet-ledger --database ledger.db deposit 1 100.00
//! wallet-ledger --database ledger.db transfer 1 2 70.00
//! wallet-ledger --database ledger.db balance-at 1 2025-01-06T15:00:00Z
//! wallet-ledger --database ledger.db transactions 1 > entries.csv
//! wallet-ledger replay commands.csv > accounts.csv
//! wallet-ledger replay --strategy async --batch-size 2000 commands.csv > accounts.csv
//! ```
//!
//! Results go to stdout, logs to stderr. Without `--database` the ledger
//! lives in memory for the duration of the command, which is mostly useful
//! for `replay`.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (rejected operation, file not found, database unavailable, etc.)

use rust_wallet_ledger::cli::{self, Command};
use rust_wallet_ledger::core::{
    InMemoryLedgerStore, LedgerStore, RequestContext, SqliteLedgerStore, SystemClock,
    WalletService,
};
use rust_wallet_ledger::io::{write_accounts_csv, write_entries_csv};
use rust_wallet_ledger::strategy::ReplayStrategy;
use rust_wallet_ledger::{logging, strategy, LedgerConfig, LedgerError};
use std::io::Write;
use std::process;
use std::sync::Arc;

fn main() {
    let args = cli::parse_args();
    logging::init(args.log_level.as_deref());

    let config = args.to_ledger_config();
    let result = match &args.database {
        Some(path) => SqliteLedgerStore::open(path, config.lock_timeout)
            .and_then(|store| run(store, config, &args.command)),
        None => run(
            InMemoryLedgerStore::with_lock_timeout(config.lock_timeout),
            config,
            &args.command,
        ),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run<S: LedgerStore + 'static>(
    store: S,
    config: LedgerConfig,
    command: &Command,
) -> Result<(), LedgerError> {
    let service = WalletService::new(Arc::new(store), Arc::new(SystemClock), config);
    let ctx = RequestContext::new();
    let stdout = std::io::stdout();
    let mut output = stdout.lock();

    match command {
        Command::CreateAccount { user } => {
            let account = service.create_account(&ctx, *user)?;
            write_accounts_csv(&[account], &mut output)?;
        }
        Command::Balance { user } => {
            writeln!(output, "{}", service.get_balance(&ctx, *user)?)?;
        }
        Command::BalanceAt { user, at } => {
            writeln!(output, "{}", service.get_balance_at(&ctx, *user, *at)?)?;
        }
        Command::Deposit { user, amount } => {
            writeln!(output, "{}", service.deposit(&ctx, *user, *amount)?)?;
        }
        Command::Withdraw { user, amount } => {
            writeln!(output, "{}", service.withdraw(&ctx, *user, *amount)?)?;
        }
        Command::Transfer { from, to, amount } => {
            service.transfer(&ctx, *from, *to, *amount)?;
            let accounts = [
                service.get_account(&ctx, *from)?,
                service.get_account(&ctx, *to)?,
            ];
            write_accounts_csv(&accounts, &mut output)?;
        }
        Command::Transactions { user } => {
            let entries = service.list_transactions(&ctx, *user)?;
            write_entries_csv(&entries, &mut output)?;
        }
        Command::Replay(replay) => {
            let config = match replay.strategy {
                cli::StrategyType::Async => Some(replay.to_batch_config()),
                cli::StrategyType::Sync => None,
            };
            let strategy: Box<dyn ReplayStrategy<S, SystemClock>> =
                strategy::create_strategy(replay.strategy, config);
            strategy.replay(&service, &replay.input_file, &mut output)?;
        }
    }

    output.flush()?;
    Ok(())
}
