//! Per-account exclusive leases
//!
//! A `LockTable` hands out exclusive access to accounts by id. Several ids
//! requested together are always taken in ascending order, one after the
//! other, so two requests for the same pair of accounts given in opposite
//! orders queue up behind each other instead of deadlocking.

use crate::types::{AccountId, LedgerError};
use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Registry of accounts currently held by some transaction
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<AccountId>>,
    released: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take exclusive access to every id in `accounts`
    ///
    /// Ids are sorted and deduplicated first, then acquired in ascending
    /// order. If any id is still held by someone else when `timeout` runs
    /// out, the ids taken so far are handed back and a
    /// [`LedgerError::Conflict`] is returned.
    ///
    /// # Returns
    ///
    /// The ids acquired, ascending. The caller must pass them to
    /// [`release`](Self::release) once done.
    pub fn acquire(
        &self,
        accounts: &[AccountId],
        timeout: Duration,
    ) -> Result<Vec<AccountId>, LedgerError> {
        let mut ordered = accounts.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let deadline = Instant::now() + timeout;
        let mut acquired = Vec::with_capacity(ordered.len());
        let mut held = self.held();

        for account in ordered {
            while held.contains(&account) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    for id in &acquired {
                        held.remove(id);
                    }
                    drop(held);
                    self.released.notify_all();
                    return Err(LedgerError::conflict(format!(
                        "timed out after {:?} waiting for account {}",
                        timeout, account
                    )));
                }
                held = self
                    .released
                    .wait_timeout(held, remaining)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            held.insert(account);
            acquired.push(account);
        }

        Ok(acquired)
    }

    /// Give back exclusive access to `accounts`
    pub fn release(&self, accounts: &[AccountId]) {
        if accounts.is_empty() {
            return;
        }
        let mut held = self.held();
        for account in accounts {
            held.remove(account);
        }
        drop(held);
        self.released.notify_all();
    }

    /// Whether `account` is currently held by anyone
    pub fn is_held(&self, account: AccountId) -> bool {
        self.held().contains(&account)
    }

    // The set is only ever mutated by whole insert/remove calls, so a
    // poisoned guard still holds a consistent set.
    fn held(&self) -> MutexGuard<'_, HashSet<AccountId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_returns_sorted_unique_ids() {
        let table = LockTable::new();

        let acquired = table
            .acquire(&[5, 2, 5, 9], Duration::from_millis(10))
            .unwrap();

        assert_eq!(acquired, vec![2, 5, 9]);
        assert!(table.is_held(2));
        assert!(table.is_held(9));
    }

    #[test]
    fn test_release_frees_accounts() {
        let table = LockTable::new();
        let acquired = table.acquire(&[1, 2], Duration::from_millis(10)).unwrap();

        table.release(&acquired);

        assert!(!table.is_held(1));
        assert!(!table.is_held(2));
    }

    #[test]
    fn test_acquire_times_out_with_conflict() {
        let table = LockTable::new();
        table.acquire(&[3], Duration::from_millis(10)).unwrap();

        let result = table.acquire(&[1, 3], Duration::from_millis(20));

        assert!(matches!(result, Err(LedgerError::Conflict { .. })));
        // The partially acquired id is handed back
        assert!(!table.is_held(1));
        assert!(table.is_held(3));
    }

    #[test]
    fn test_waiter_proceeds_after_release() {
        let table = Arc::new(LockTable::new());
        let acquired = table.acquire(&[1], Duration::from_millis(10)).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.acquire(&[1], Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(20));
        table.release(&acquired);

        assert_eq!(waiter.join().unwrap().unwrap(), vec![1]);
    }

    #[test]
    fn test_opposite_orders_do_not_deadlock() {
        let table = Arc::new(LockTable::new());

        let handles: Vec<_> = [[1, 2], [2, 1]]
            .into_iter()
            .map(|pair| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for _ in 0..500 {
                        let acquired = table.acquire(&pair, Duration::from_secs(5)).unwrap();
                        table.release(&acquired);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!table.is_held(1));
        assert!(!table.is_held(2));
    }
}
