//! Ledger entry types and identifiers
//!
//! Entries are the append-only log behind every balance. A positive amount is
//! a credit, a negative amount a debit. Entries are never edited or removed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// User identifier
pub type UserId = i64;

/// Account identifier (assigned by the store)
pub type AccountId = i64;

/// Entry identifier (assigned by the store)
pub type EntryId = i64;

/// Absolute point in time, always normalised to UTC
pub type Timestamp = DateTime<Utc>;

/// A recorded ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Store-assigned entry identifier
    pub id: EntryId,

    /// The account this entry belongs to
    pub account: AccountId,

    /// Signed amount: positive for credits, negative for debits
    pub amount: Decimal,

    /// When the entry was recorded
    pub created_at: Timestamp,
}

/// An entry that has not been assigned an id yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub account: AccountId,
    pub amount: Decimal,
    pub created_at: Timestamp,
}

impl NewEntry {
    /// Build a credit entry of `+amount`
    pub fn credit(account: AccountId, amount: Decimal, created_at: Timestamp) -> Self {
        NewEntry {
            account,
            amount,
            created_at,
        }
    }

    /// Build a debit entry of `-amount`
    pub fn debit(account: AccountId, amount: Decimal, created_at: Timestamp) -> Self {
        NewEntry {
            account,
            amount: -amount,
            created_at,
        }
    }

    /// Attach the store-assigned id
    pub fn with_id(self, id: EntryId) -> Entry {
        Entry {
            id,
            account: self.account,
            amount: self.amount,
            created_at: self.created_at,
        }
    }
}
