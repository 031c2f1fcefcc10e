//! Account registry
//!
//! This module provides the `AccountRegistry`, which maps a user to the one
//! account they own.
//!
//! The registry is responsible for:
//! - Creating accounts with a zero balance
//! - Resolving a user to the stored account snapshot
//!
//! One account per user is enforced by the store when the account is
//! inserted. The registry never checks for an existing account first and
//! then inserts, since two callers could both pass such a check.

use crate::core::traits::{LedgerStore, StoreTransaction};
use crate::types::{Account, LedgerError, UserId};
use std::sync::Arc;

/// Creates and looks up accounts
#[derive(Debug)]
pub struct AccountRegistry<S> {
    store: Arc<S>,
}

impl<S> Clone for AccountRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LedgerStore> AccountRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the account of `user` with a zero balance
    ///
    /// # Errors
    ///
    /// - `DuplicateAccount` if the user already owns an account
    /// - `Conflict` / `StoreUnavailable` on transient store failures
    pub fn create_account(&self, user: UserId) -> Result<Account, LedgerError> {
        let account = self.store.transaction(|tx| tx.insert_account(user))?;
        tracing::debug!(user, account = account.id, "Account created");
        Ok(account)
    }

    /// Current persisted snapshot of the account owned by `user`
    ///
    /// The balance is the stored one, it is not recomputed from entries.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if the user owns no account.
    pub fn resolve_account(&self, user: UserId) -> Result<Account, LedgerError> {
        self.store.transaction(|tx| resolve(tx, user))
    }

    /// Snapshot of every account, ordered by user
    pub fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        self.store.transaction(|tx| tx.list_accounts())
    }
}

/// Look up the account of `user` inside an open transaction
pub(crate) fn resolve<T: StoreTransaction>(tx: &mut T, user: UserId) -> Result<Account, LedgerError> {
    tx.get_account(user)?
        .ok_or_else(|| LedgerError::account_not_found(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{InMemoryLedgerStore, SqliteLedgerStore};
    use rust_decimal::Decimal;
    use std::thread;

    fn get_test_registry() -> AccountRegistry<InMemoryLedgerStore> {
        AccountRegistry::new(Arc::new(InMemoryLedgerStore::new()))
    }

    #[test]
    fn test_create_account_starts_at_zero() {
        let registry = get_test_registry();

        let account = registry.create_account(1).unwrap();

        assert_eq!(account.user, 1);
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[test]
    fn test_create_account_twice_is_duplicate() {
        let registry = get_test_registry();
        registry.create_account(1).unwrap();

        let result = registry.create_account(1);

        assert_eq!(result, Err(LedgerError::duplicate_account(1)));
    }

    #[test]
    fn test_resolve_returns_created_account() {
        let registry = get_test_registry();
        let created = registry.create_account(4).unwrap();

        assert_eq!(registry.resolve_account(4).unwrap(), created);
    }

    #[test]
    fn test_resolve_unknown_user_is_not_found() {
        let registry = get_test_registry();

        let result = registry.resolve_account(8);

        assert_eq!(result, Err(LedgerError::account_not_found(8)));
    }

    #[test]
    fn test_list_accounts_is_ordered_by_user() {
        let registry = get_test_registry();
        for user in [9, 2, 5] {
            registry.create_account(user).unwrap();
        }

        let users: Vec<UserId> = registry
            .list_accounts()
            .unwrap()
            .iter()
            .map(|a| a.user)
            .collect();

        assert_eq!(users, vec![2, 5, 9]);
    }

    #[test]
    fn test_concurrent_creates_yield_one_account() {
        let registry = get_test_registry();

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.create_account(3)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let created = results.iter().filter(|r| r.is_ok()).count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::DuplicateAccount { user: 3 })))
            .count();
        assert_eq!(created, 1);
        assert_eq!(duplicates, 7);
    }

    #[test]
    fn test_sqlite_registry_rejects_duplicate() {
        let registry = AccountRegistry::new(Arc::new(SqliteLedgerStore::open_in_memory().unwrap()));
        registry.create_account(1).unwrap();

        assert_eq!(
            registry.create_account(1),
            Err(LedgerError::duplicate_account(1))
        );
        assert_eq!(registry.resolve_account(1).unwrap().user, 1);
    }
}
