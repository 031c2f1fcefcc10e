//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account snapshot type
//! - `entry`: Ledger entries, identifiers and timestamps
//! - `command`: Replayable command records
//! - `error`: Error types for the wallet ledger

pub mod account;
pub mod command;
pub mod entry;
pub mod error;

pub use account::Account;
pub use command::{CommandRecord, CommandType};
pub use entry::{AccountId, Entry, EntryId, NewEntry, Timestamp, UserId};
pub use error::LedgerError;
