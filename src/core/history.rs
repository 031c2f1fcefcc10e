//! Point-in-time balances from the entry log
//!
//! The `HistoryReconstructor` answers "what was this balance at instant t"
//! by summing every entry recorded strictly before t. It never consults the
//! stored balance, so it doubles as an audit of it: for any instant after
//! the last entry the two agree.

use crate::core::registry::resolve;
use crate::core::traits::{LedgerStore, StoreTransaction};
use crate::types::{Entry, LedgerError, Timestamp, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Read-only queries over the entry log
#[derive(Debug)]
pub struct HistoryReconstructor<S> {
    store: Arc<S>,
}

impl<S> Clone for HistoryReconstructor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> HistoryReconstructor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Balance of the account of `user` as it stood at `at`
    ///
    /// Entries created exactly at `at` are not included. Zero when no entry
    /// qualifies, including any instant before the account existed.
    ///
    /// # Errors
    ///
    /// - `AccountNotFound` if the user owns no account
    /// - `ArithmeticOverflow` if the entries cannot be summed
    pub fn get_balance_at(&self, user: UserId, at: Timestamp) -> Result<Decimal, LedgerError> {
        self.store.transaction(|tx| {
            let account = resolve(tx, user)?;
            let entries = tx.list_entries_before(account.id, at)?;
            entries.iter().try_fold(Decimal::ZERO, |balance, entry| {
                balance
                    .checked_add(entry.amount)
                    .ok_or_else(|| LedgerError::arithmetic_overflow("balance reconstruction", user))
            })
        })
    }

    /// Every entry of the account of `user`, oldest first
    pub fn list_transactions(&self, user: UserId) -> Result<Vec<Entry>, LedgerError> {
        self.store.transaction(|tx| {
            let account = resolve(tx, user)?;
            tx.list_entries(account.id)
        })
    }
}
