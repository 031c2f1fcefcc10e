//! Rust Wallet Ledger Library
//! # Overview
//!
//! This library tracks per-user monetary balances as an append-only log of
//! signed entries. Each user owns exactly one account; its stored balance is
//! always the exact decimal sum of its entries, and any past balance can be
//! reconstructed from the log.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Entry, LedgerError, etc.)
//! - [`core`] - Business logic components:
//!   - [`core::registry`] - Account creation and lookup
//!   - [`core::engine`] - Deposits, withdrawals and atomic transfers
//!   - [`core::history`] - Point-in-time balances from the entry log
//!   - [`core::service`] - Caller-facing façade with request context and retries
//!   - [`core::store`] - In-memory and SQLite ledger stores
//! - [`io`] - CSV reading and writing
//! - [`strategy`] - Sync and async replay of command files
//! - [`cli`] - CLI arguments parsing
//! - [`config`] - Retry and lock tuning
//! - [`logging`] - `tracing` subscriber setup
//!
//! # Operations
//!
//! - **Create account**: Open a zero-balance account for a user
//! - **Deposit**: Credit a positive amount
//! - **Withdraw**: Debit a positive amount no larger than the balance
//! - **Transfer**: Debit one user and credit another, atomically
//! - **Balance / balance at**: Stored balance, or the sum of entries before an instant
//! - **Transactions**: A user's entries, oldest first
//!
//! # Concurrency
//!
//! Every mutation takes exclusive access to the accounts it changes before
//! reading their balances. A transfer requests both accounts at once and
//! they are acquired in ascending account id order, so opposite transfers
//! between the same two users cannot deadlock.

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod strategy;
pub mod types;

pub use config::LedgerConfig;
pub use core::{
    AccountRegistry, BalanceEngine, Clock, HistoryReconstructor, InMemoryLedgerStore,
    LedgerStore, ManualClock, RequestContext, SqliteLedgerStore, StoreTransaction, SystemClock,
    WalletService,
};
pub use io::{write_accounts_csv, write_entries_csv};
pub use types::{
    Account, AccountId, CommandRecord, CommandType, Entry, EntryId, LedgerError, NewEntry,
    Timestamp, UserId,
};
