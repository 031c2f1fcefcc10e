//! Error types for the wallet ledger
//!
//! This module defines every error the ledger can report. Each rejection has
//! its own variant so callers can branch on the cause instead of parsing
//! messages.
//!
//! # Error Categories
//!
//! - **Input Errors**: File not found, malformed CSV, unknown commands, bad amounts
//! - **Ledger Errors**: Missing or duplicate accounts, insufficient funds, self-transfers
//! - **Arithmetic Errors**: Decimal overflow in balance calculations
//! - **Store Errors**: Conflicts and unavailability (retryable), corrupt records

use super::entry::{AccountId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the wallet ledger
///
/// Validation errors are raised before anything is written. Store errors are
/// raised after the surrounding store transaction has been rolled back, so no
/// variant ever describes a partially applied operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// File not found at the specified path
    #[error("File not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// I/O error occurred while reading or writing files
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// CSV parsing error occurred
    ///
    /// Replay skips the malformed record and continues with the next one.
    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError {
        /// Line number where the error occurred (if available)
        line: Option<u64>,
        /// Description of the parsing error
        message: String,
    },

    /// Unknown command in a replay file
    #[error("Invalid command '{op}'")]
    InvalidCommand {
        /// The unrecognised command string
        op: String,
    },

    /// A command is missing a field it requires
    #[error("{op} command for user {user} requires {field}")]
    MissingField {
        /// Command that requires the field
        op: String,
        /// Acting user
        user: UserId,
        /// Name of the missing field
        field: String,
    },

    /// Amount is not strictly positive, or could not be parsed
    #[error("Invalid amount '{amount}': must be a decimal greater than zero")]
    InvalidAmount {
        /// The rejected amount as given by the caller
        amount: String,
    },

    /// The user owns no account
    #[error("No account found for user {user}")]
    AccountNotFound {
        /// The user that was looked up
        user: UserId,
    },

    /// The user already owns an account
    #[error("User {user} already has an account")]
    DuplicateAccount {
        /// The user that already owns an account
        user: UserId,
    },

    /// Withdrawal (or transfer debit) exceeds the stored balance
    #[error("Insufficient funds for user {user}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// The user being debited
        user: UserId,
        /// Stored balance at the time of the check
        balance: Decimal,
        /// Requested amount
        requested: Decimal,
    },

    /// Source and destination of a transfer are the same user
    #[error("Cannot transfer from user {user} to itself")]
    SameAccountTransfer {
        /// The user named on both sides
        user: UserId,
    },

    /// Decimal arithmetic would overflow
    #[error("Arithmetic overflow in {operation} for user {user}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Affected user
        user: UserId,
    },

    /// A write targeted an account the transaction holds no exclusive access to
    #[error("Account {account} is not locked by this transaction")]
    AccountNotLocked {
        /// The account that was written without a lock
        account: AccountId,
    },

    /// A persisted value could not be decoded
    #[error("Corrupt record: {message}")]
    CorruptRecord {
        /// What could not be decoded
        message: String,
    },

    /// The store transaction lost a race (lock timeout, busy database)
    ///
    /// Retryable: the attempt was rolled back completely.
    #[error("Store conflict: {reason}")]
    Conflict {
        /// Why the attempt could not proceed
        reason: String,
    },

    /// The store could not complete the transaction
    ///
    /// Retryable: the attempt was rolled back completely.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the store failure
        message: String,
    },
}

impl LedgerError {
    /// Whether the whole attempt may safely be retried as-is
    ///
    /// Only transient store failures qualify. Every other error is terminal
    /// for the request: retrying it without a change of state gives the same
    /// answer.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::Conflict { .. } | LedgerError::StoreUnavailable { .. }
        )
    }
}

// Conversion from io::Error to LedgerError
impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from csv::Error to LedgerError
impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

// Conversion from csv_async::Error to LedgerError
impl From<csv_async::Error> for LedgerError {
    fn from(error: csv_async::Error) -> Self {
        LedgerError::ParseError {
            line: None,
            message: error.to_string(),
        }
    }
}

// Busy and locked databases are conflicts; anything else the engine reports
// means the store could not do its job right now.
impl From<rusqlite::Error> for LedgerError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                LedgerError::Conflict {
                    reason: error.to_string(),
                }
            }
            _ => LedgerError::StoreUnavailable {
                message: error.to_string(),
            },
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Create an AccountNotFound error
    pub fn account_not_found(user: UserId) -> Self {
        LedgerError::AccountNotFound { user }
    }

    /// Create a DuplicateAccount error
    pub fn duplicate_account(user: UserId) -> Self {
        LedgerError::DuplicateAccount { user }
    }

    /// Create an InvalidAmount error from any displayable amount
    pub fn invalid_amount(amount: impl ToString) -> Self {
        LedgerError::InvalidAmount {
            amount: amount.to_string(),
        }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(user: UserId, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            user,
            balance,
            requested,
        }
    }

    /// Create a SameAccountTransfer error
    pub fn same_account_transfer(user: UserId) -> Self {
        LedgerError::SameAccountTransfer { user }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, user: UserId) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            user,
        }
    }

    /// Create a MissingField error
    pub fn missing_field(op: &str, user: UserId, field: &str) -> Self {
        LedgerError::MissingField {
            op: op.to_string(),
            user,
            field: field.to_string(),
        }
    }

    /// Create an InvalidCommand error
    pub fn invalid_command(op: &str) -> Self {
        LedgerError::InvalidCommand { op: op.to_string() }
    }

    /// Create a Conflict error
    pub fn conflict(reason: impl Into<String>) -> Self {
        LedgerError::Conflict {
            reason: reason.into(),
        }
    }

    /// Create a StoreUnavailable error
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        LedgerError::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a CorruptRecord error
    pub fn corrupt_record(message: impl Into<String>) -> Self {
        LedgerError::CorruptRecord {
            message: message.into(),
        }
    }
}
