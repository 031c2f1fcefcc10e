//! Core business logic module
//!
//! This module contains the ledger components:
//! - `traits` - The store boundary every component runs against
//! - `registry` - Account creation and user to account resolution
//! - `engine` - Deposits, withdrawals and transfers
//! - `history` - Point-in-time balances and entry listings
//! - `service` - Caller-facing façade with request context and retries
//! - `clock` - Time sources for entry timestamps
//! - `context` - Per-request identity
//! - `store` - In-memory and SQLite store implementations

pub mod clock;
pub mod context;
pub mod engine;
pub mod history;
pub mod registry;
pub mod service;
pub mod store;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::RequestContext;
pub use engine::BalanceEngine;
pub use history::HistoryReconstructor;
pub use registry::AccountRegistry;
pub use service::WalletService;
pub use store::{InMemoryLedgerStore, SqliteLedgerStore};
pub use traits::{LedgerStore, StoreTransaction};
