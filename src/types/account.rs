//! Account-related types for the wallet ledger
//!
//! This module defines the Account structure: one per user, holding the
//! stored balance that the ledger keeps equal to the sum of its entries.

use super::entry::{AccountId, UserId};
use rust_decimal::Decimal;

/// Persisted account snapshot
///
/// Represents the state of a user's account as currently stored. The balance
/// is the materialised sum of every entry recorded against the account and is
/// only ever changed by the balance engine in the same store transaction that
/// appends the matching entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Store-assigned account identifier
    ///
    /// Also the key used to order exclusive access when several accounts are
    /// locked by one transaction.
    pub id: AccountId,

    /// The owning user (unique: one account per user)
    pub user: UserId,

    /// Current balance with exact decimal precision
    pub balance: Decimal,
}

impl Account {
    /// Create a new account with a zero balance
    ///
    /// # Arguments
    ///
    /// * `id` - The store-assigned account identifier
    /// * `user` - The user owning this account
    pub fn new(id: AccountId, user: UserId) -> Self {
        Account {
            id,
            user,
            balance: Decimal::ZERO,
        }
    }
}
