//! In-process ledger store
//!
//! This module provides the `InMemoryLedgerStore`, which keeps accounts and
//! entries in `DashMap` tables so that transactions touching different
//! accounts never contend on a global lock.
//!
//! # Design
//!
//! - Accounts are keyed by user. The uniqueness of user to account is enforced
//!   by the map's entry API at commit, never by a separate read-then-write.
//! - A transaction buffers its writes. Nothing it does is visible to other
//!   transactions until `commit`, which applies the whole buffer while holding
//!   the commit gate exclusively, so readers never see half a commit.
//! - Exclusive access to accounts comes from a [`LockTable`] lease that the
//!   transaction holds until it is committed, rolled back or dropped.

use super::lock_table::LockTable;
use crate::config::DEFAULT_LOCK_TIMEOUT;
use crate::core::traits::{LedgerStore, StoreTransaction};
use crate::types::{Account, AccountId, Entry, LedgerError, NewEntry, Timestamp, UserId};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Thread-safe in-memory ledger store
///
/// Share it between threads behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    /// Accounts keyed by owning user
    accounts: DashMap<UserId, Account>,

    /// Account id to owning user
    owners: DashMap<AccountId, UserId>,

    /// Append-only entry log per account, in insertion order
    entries: DashMap<AccountId, Vec<Entry>>,

    next_account_id: AtomicI64,
    next_entry_id: AtomicI64,

    locks: LockTable,

    /// Held shared by readers, exclusively while a commit is applied
    commit_gate: RwLock<()>,

    lock_timeout: Duration,
}

impl InMemoryLedgerStore {
    /// Create an empty store with the default lock timeout
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Create an empty store whose transactions give up waiting for an
    /// account lease after `lock_timeout`
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            accounts: DashMap::new(),
            owners: DashMap::new(),
            entries: DashMap::new(),
            next_account_id: AtomicI64::new(1),
            next_entry_id: AtomicI64::new(1),
            locks: LockTable::new(),
            commit_gate: RwLock::new(()),
            lock_timeout,
        }
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.commit_gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.commit_gate.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    type Transaction<'a> = InMemoryTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, LedgerError> {
        Ok(InMemoryTransaction {
            store: self,
            locked: Vec::new(),
            new_accounts: Vec::new(),
            balances: HashMap::new(),
            entries: Vec::new(),
        })
    }
}

/// A transaction against an [`InMemoryLedgerStore`]
///
/// Reads see committed state overlaid with this transaction's own writes.
#[derive(Debug)]
pub struct InMemoryTransaction<'a> {
    store: &'a InMemoryLedgerStore,

    /// Accounts leased from the lock table, ascending
    locked: Vec<AccountId>,

    /// Accounts inserted by this transaction
    new_accounts: Vec<Account>,

    /// Pending balance overwrites for existing accounts
    balances: HashMap<AccountId, Decimal>,

    /// Pending entries, in insertion order
    entries: Vec<Entry>,
}

impl InMemoryTransaction<'_> {
    fn is_new(&self, account: AccountId) -> bool {
        self.new_accounts.iter().any(|a| a.id == account)
    }

    fn ensure_writable(&self, account: AccountId) -> Result<(), LedgerError> {
        if self.locked.contains(&account) || self.is_new(account) {
            Ok(())
        } else {
            Err(LedgerError::AccountNotLocked { account })
        }
    }

    fn overlay(&self, mut account: Account) -> Account {
        if let Some(balance) = self.balances.get(&account.id) {
            account.balance = *balance;
        }
        account
    }

    fn collect_entries<P>(&self, account: AccountId, keep: P) -> Vec<Entry>
    where
        P: Fn(&Entry) -> bool,
    {
        let mut entries: Vec<Entry> = {
            let _gate = self.store.read_gate();
            self.store
                .entries
                .get(&account)
                .map(|log| log.iter().filter(|e| keep(*e)).cloned().collect())
                .unwrap_or_default()
        };
        entries.extend(
            self.entries
                .iter()
                .filter(|e| e.account == account && keep(*e))
                .cloned(),
        );
        entries.sort_by_key(|e| (e.created_at, e.id));
        entries
    }
}

impl StoreTransaction for InMemoryTransaction<'_> {
    fn get_account(&mut self, user: UserId) -> Result<Option<Account>, LedgerError> {
        if let Some(account) = self.new_accounts.iter().find(|a| a.user == user) {
            return Ok(Some(account.clone()));
        }

        let committed = {
            let _gate = self.store.read_gate();
            self.store.accounts.get(&user).map(|a| a.value().clone())
        };
        Ok(committed.map(|account| self.overlay(account)))
    }

    fn insert_account(&mut self, user: UserId) -> Result<Account, LedgerError> {
        if self.new_accounts.iter().any(|a| a.user == user)
            || self.store.accounts.contains_key(&user)
        {
            return Err(LedgerError::duplicate_account(user));
        }

        let id = self.store.next_account_id.fetch_add(1, Ordering::Relaxed);
        let account = Account::new(id, user);
        self.new_accounts.push(account.clone());
        Ok(account)
    }

    fn lock_accounts(&mut self, accounts: &[AccountId]) -> Result<(), LedgerError> {
        // Accounts created here are invisible to everyone else until commit
        let wanted: Vec<AccountId> = accounts
            .iter()
            .copied()
            .filter(|id| !self.locked.contains(id) && !self.is_new(*id))
            .collect();
        if wanted.is_empty() {
            return Ok(());
        }

        let acquired = self.store.locks.acquire(&wanted, self.store.lock_timeout)?;
        tracing::debug!(accounts = ?acquired, "Acquired account leases");
        self.locked.extend(acquired);
        self.locked.sort_unstable();
        Ok(())
    }

    fn update_account_balance(
        &mut self,
        account: AccountId,
        balance: Decimal,
    ) -> Result<(), LedgerError> {
        self.ensure_writable(account)?;

        if let Some(new_account) = self.new_accounts.iter_mut().find(|a| a.id == account) {
            new_account.balance = balance;
        } else {
            self.balances.insert(account, balance);
        }
        Ok(())
    }

    fn insert_entry(&mut self, entry: NewEntry) -> Result<Entry, LedgerError> {
        self.ensure_writable(entry.account)?;

        let id = self.store.next_entry_id.fetch_add(1, Ordering::Relaxed);
        let entry = entry.with_id(id);
        self.entries.push(entry.clone());
        Ok(entry)
    }

    fn list_entries_before(
        &mut self,
        account: AccountId,
        before: Timestamp,
    ) -> Result<Vec<Entry>, LedgerError> {
        Ok(self.collect_entries(account, |e| e.created_at < before))
    }

    fn list_entries(&mut self, account: AccountId) -> Result<Vec<Entry>, LedgerError> {
        Ok(self.collect_entries(account, |_| true))
    }

    fn list_accounts(&mut self) -> Result<Vec<Account>, LedgerError> {
        let committed: Vec<Account> = {
            let _gate = self.store.read_gate();
            self.store
                .accounts
                .iter()
                .map(|entry| entry.value().clone())
                .collect()
        };

        let mut accounts: Vec<Account> = committed
            .into_iter()
            .map(|account| self.overlay(account))
            .chain(self.new_accounts.iter().cloned())
            .collect();
        accounts.sort_by_key(|account| account.user);
        Ok(accounts)
    }

    fn commit(mut self) -> Result<(), LedgerError> {
        let store = self.store;
        let _gate = store.write_gate();

        // Validate before applying anything so a failed commit changes nothing
        let mut updates = Vec::with_capacity(self.balances.len());
        for (account, balance) in self.balances.drain() {
            let owner = store
                .owners
                .get(&account)
                .map(|owner| *owner)
                .ok_or_else(|| {
                    LedgerError::corrupt_record(format!("account {} has no owner", account))
                })?;
            updates.push((owner, balance));
        }

        let mut inserted: Vec<Account> = Vec::with_capacity(self.new_accounts.len());
        for account in self.new_accounts.drain(..) {
            let mut vacant = false;
            store.accounts.entry(account.user).or_insert_with(|| {
                vacant = true;
                account.clone()
            });

            if !vacant {
                for undo in &inserted {
                    store.accounts.remove(&undo.user);
                    store.owners.remove(&undo.id);
                }
                return Err(LedgerError::duplicate_account(account.user));
            }
            store.owners.insert(account.id, account.user);
            inserted.push(account);
        }

        for (owner, balance) in updates {
            if let Some(mut account) = store.accounts.get_mut(&owner) {
                account.balance = balance;
            }
        }

        let appended = self.entries.len();
        for entry in self.entries.drain(..) {
            store.entries.entry(entry.account).or_default().push(entry);
        }

        tracing::debug!(
            accounts_created = inserted.len(),
            entries_appended = appended,
            "Committed in-memory transaction"
        );
        Ok(())
    }

    fn rollback(self) -> Result<(), LedgerError> {
        tracing::debug!(
            discarded_entries = self.entries.len(),
            "Rolled back in-memory transaction"
        );
        Ok(())
    }
}

impl Drop for InMemoryTransaction<'_> {
    fn drop(&mut self) {
        self.store.locks.release(&self.locked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(hour: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2025, 1, 6, hour, 0, 0).unwrap()
    }

    fn store_with_account(user: UserId) -> (InMemoryLedgerStore, Account) {
        let store = InMemoryLedgerStore::new();
        let account = store.transaction(|tx| tx.insert_account(user)).unwrap();
        (store, account)
    }

    #[test]
    fn test_committed_account_is_visible() {
        let (store, account) = store_with_account(1);

        let found = store.transaction(|tx| tx.get_account(1)).unwrap();

        assert_eq!(found, Some(account));
    }

    #[test]
    fn test_account_ids_are_unique() {
        let store = InMemoryLedgerStore::new();
        let first = store.transaction(|tx| tx.insert_account(1)).unwrap();
        let second = store.transaction(|tx| tx.insert_account(2)).unwrap();

        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_uncommitted_writes_are_invisible_to_others() {
        let store = InMemoryLedgerStore::new();
        let mut writer = store.begin().unwrap();
        writer.insert_account(1).unwrap();

        let mut reader = store.begin().unwrap();
        assert_eq!(reader.get_account(1).unwrap(), None);

        writer.commit().unwrap();
        assert!(reader.get_account(1).unwrap().is_some());
    }

    #[test]
    fn test_rollback_discards_writes() {
        let (store, account) = store_with_account(1);

        let mut tx = store.begin().unwrap();
        tx.lock_accounts(&[account.id]).unwrap();
        tx.update_account_balance(account.id, Decimal::new(100, 0))
            .unwrap();
        tx.insert_entry(NewEntry::credit(account.id, Decimal::new(100, 0), at(10)))
            .unwrap();
        tx.rollback().unwrap();

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.get_account(1).unwrap().unwrap().balance, Decimal::ZERO);
        assert!(tx.list_entries(account.id).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_insert_in_same_store_is_rejected() {
        let (store, _) = store_with_account(1);

        let result = store.transaction(|tx| tx.insert_account(1));

        assert_eq!(result, Err(LedgerError::duplicate_account(1)));
    }

    #[test]
    fn test_racing_inserts_are_caught_at_commit() {
        let store = InMemoryLedgerStore::new();
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.insert_account(7).unwrap();
        second.insert_account(7).unwrap();

        first.commit().unwrap();
        let result = second.commit();

        assert_eq!(result, Err(LedgerError::duplicate_account(7)));
        let accounts = store.transaction(|tx| tx.list_accounts()).unwrap();
        assert_eq!(accounts.len(), 1);
    }

    #[test]
    fn test_write_without_lock_is_rejected() {
        let (store, account) = store_with_account(1);

        let mut tx = store.begin().unwrap();
        let result = tx.update_account_balance(account.id, Decimal::ONE);

        assert_eq!(
            result,
            Err(LedgerError::AccountNotLocked {
                account: account.id
            })
        );
    }

    #[test]
    fn test_dropping_transaction_releases_locks() {
        let (store, account) = store_with_account(1);

        {
            let mut tx = store.begin().unwrap();
            tx.lock_accounts(&[account.id]).unwrap();
            assert!(store.locks.is_held(account.id));
        }

        assert!(!store.locks.is_held(account.id));
    }

    #[test]
    fn test_second_lock_holder_times_out() {
        let store = InMemoryLedgerStore::with_lock_timeout(Duration::from_millis(20));
        let account = store.transaction(|tx| tx.insert_account(1)).unwrap();

        let mut holder = store.begin().unwrap();
        holder.lock_accounts(&[account.id]).unwrap();

        let mut waiter = store.begin().unwrap();
        let result = waiter.lock_accounts(&[account.id]);

        assert!(matches!(result, Err(LedgerError::Conflict { .. })));
    }

    #[test]
    fn test_list_entries_before_is_strict() {
        let (store, account) = store_with_account(1);
        store
            .transaction(|tx| {
                tx.lock_accounts(&[account.id])?;
                tx.insert_entry(NewEntry::credit(account.id, Decimal::new(10, 0), at(9)))?;
                tx.insert_entry(NewEntry::credit(account.id, Decimal::new(20, 0), at(10)))?;
                tx.insert_entry(NewEntry::debit(account.id, Decimal::new(5, 0), at(11)))
            })
            .unwrap();

        let before_ten = store
            .transaction(|tx| tx.list_entries_before(account.id, at(10)))
            .unwrap();
        let all = store.transaction(|tx| tx.list_entries(account.id)).unwrap();

        assert_eq!(before_ten.len(), 1);
        assert_eq!(before_ten[0].amount, Decimal::new(10, 0));
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].amount, Decimal::new(-5, 0));
    }

    #[test]
    fn test_reads_see_own_pending_writes() {
        let (store, account) = store_with_account(1);

        let mut tx = store.begin().unwrap();
        tx.lock_accounts(&[account.id]).unwrap();
        tx.update_account_balance(account.id, Decimal::new(42, 0))
            .unwrap();
        tx.insert_entry(NewEntry::credit(account.id, Decimal::new(42, 0), at(8)))
            .unwrap();

        assert_eq!(
            tx.get_account(1).unwrap().unwrap().balance,
            Decimal::new(42, 0)
        );
        assert_eq!(tx.list_entries(account.id).unwrap().len(), 1);
    }
}
