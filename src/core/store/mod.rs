//! Ledger store implementations
//!
//! - `memory` - In-process store on `DashMap` tables with per-account leases
//! - `lock_table` - Ascending-order exclusive leases used by the in-process store
//! - `sqlite` - Durable store on a SQLite database

pub mod lock_table;
pub mod memory;
pub mod sqlite;

pub use lock_table::LockTable;
pub use memory::{InMemoryLedgerStore, InMemoryTransaction};
pub use sqlite::{SqliteLedgerStore, SqliteTransaction};
