//! Core traits for the ledger store
//!
//! This module defines the storage boundary the ledger runs against. The
//! balance engine, account registry and history reconstructor only ever talk
//! to a [`StoreTransaction`], so every read and write they perform belongs to
//! one transaction scope that either commits as a whole or leaves no trace.

use crate::types::{Account, AccountId, Entry, LedgerError, NewEntry, Timestamp, UserId};
use rust_decimal::Decimal;

/// A durable home for accounts and their append-only entries
///
/// Implementations can be in-process (DashMap tables with per-account leases)
/// or backed by a relational database.
pub trait LedgerStore: Send + Sync {
    /// Transaction handle borrowed from the store
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Open a new transaction scope
    fn begin(&self) -> Result<Self::Transaction<'_>, LedgerError>;

    /// Run `f` inside a transaction scope
    ///
    /// Commits when `f` returns `Ok`. When `f` fails the transaction is
    /// rolled back explicitly before the error is handed back, so the caller
    /// never observes a partially applied operation.
    fn transaction<'s, T, F>(&'s self, f: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut Self::Transaction<'s>) -> Result<T, LedgerError>,
    {
        let mut tx = self.begin()?;
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = tx.rollback() {
                    tracing::error!(%error, %rollback_error, "Rollback failed");
                }
                Err(error)
            }
        }
    }
}

/// Operations available inside one store transaction
///
/// Writes become visible to other transactions only on [`commit`]. Dropping a
/// transaction without committing behaves like [`rollback`].
///
/// [`commit`]: StoreTransaction::commit
/// [`rollback`]: StoreTransaction::rollback
pub trait StoreTransaction {
    /// Look up the account owned by `user`
    fn get_account(&mut self, user: UserId) -> Result<Option<Account>, LedgerError>;

    /// Insert a zero-balance account for `user`
    ///
    /// The store enforces one account per user itself and reports a second
    /// insert for the same user as [`LedgerError::DuplicateAccount`], either
    /// here or at commit.
    fn insert_account(&mut self, user: UserId) -> Result<Account, LedgerError>;

    /// Take exclusive access to `accounts` for the rest of the transaction
    ///
    /// Access is acquired in ascending account id order whatever order the
    /// ids are given in. Fails with [`LedgerError::Conflict`] if access cannot
    /// be obtained in time.
    fn lock_accounts(&mut self, accounts: &[AccountId]) -> Result<(), LedgerError>;

    /// Overwrite the stored balance of a locked account
    fn update_account_balance(
        &mut self,
        account: AccountId,
        balance: Decimal,
    ) -> Result<(), LedgerError>;

    /// Append an entry and return it with its assigned id
    fn insert_entry(&mut self, entry: NewEntry) -> Result<Entry, LedgerError>;

    /// Entries of `account` created strictly before `before`
    fn list_entries_before(
        &mut self,
        account: AccountId,
        before: Timestamp,
    ) -> Result<Vec<Entry>, LedgerError>;

    /// All entries of `account`, oldest first
    fn list_entries(&mut self, account: AccountId) -> Result<Vec<Entry>, LedgerError>;

    /// All accounts, ordered by user
    fn list_accounts(&mut self) -> Result<Vec<Account>, LedgerError>;

    /// Make every write of this transaction visible atomically
    fn commit(self) -> Result<(), LedgerError>;

    /// Discard every write of this transaction
    fn rollback(self) -> Result<(), LedgerError>;
}
