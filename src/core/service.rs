//! Caller-facing wallet operations
//!
//! `WalletService` is the single entry point callers use. It wires the
//! account registry, balance engine and history reconstructor to one shared
//! store and adds the request concerns around them:
//!
//! - every call takes a [`RequestContext`] and runs inside a `tracing` span
//!   tagged with its request id
//! - an attempt that failed for a transient store reason (`Conflict`,
//!   `StoreUnavailable`) is re-run as a whole, with linear backoff, up to
//!   `max_retries` times
//! - every other rejection is returned on the first attempt

use crate::config::LedgerConfig;
use crate::core::clock::Clock;
use crate::core::context::RequestContext;
use crate::core::engine::BalanceEngine;
use crate::core::history::HistoryReconstructor;
use crate::core::registry::AccountRegistry;
use crate::core::traits::LedgerStore;
use crate::types::{Account, Entry, LedgerError, Timestamp, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::thread;

/// Wallet operations over a shared ledger store
#[derive(Debug)]
pub struct WalletService<S, C> {
    registry: AccountRegistry<S>,
    engine: BalanceEngine<S, C>,
    history: HistoryReconstructor<S>,
    config: LedgerConfig,
}

impl<S, C> Clone for WalletService<S, C> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            engine: self.engine.clone(),
            history: self.history.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LedgerStore, C: Clock> WalletService<S, C> {
    /// Create a service over `store`, stamping entries with `clock`
    pub fn new(store: Arc<S>, clock: Arc<C>, config: LedgerConfig) -> Self {
        Self {
            registry: AccountRegistry::new(Arc::clone(&store)),
            engine: BalanceEngine::new(Arc::clone(&store), clock),
            history: HistoryReconstructor::new(store),
            config,
        }
    }

    /// Open an account for `user`
    pub fn create_account(&self, ctx: &RequestContext, user: UserId) -> Result<Account, LedgerError> {
        let _span = tracing::info_span!("create_account", request_id = %ctx, user).entered();
        self.with_retries(|| self.registry.create_account(user))
    }

    /// Stored snapshot of the account of `user`
    pub fn get_account(&self, ctx: &RequestContext, user: UserId) -> Result<Account, LedgerError> {
        let _span = tracing::info_span!("get_account", request_id = %ctx, user).entered();
        self.with_retries(|| self.registry.resolve_account(user))
    }

    /// Current stored balance of `user`
    pub fn get_balance(&self, ctx: &RequestContext, user: UserId) -> Result<Decimal, LedgerError> {
        let _span = tracing::info_span!("get_balance", request_id = %ctx, user).entered();
        self.with_retries(|| self.engine.get_balance(user))
    }

    /// Balance of `user` as it stood at `at`
    pub fn get_balance_at(
        &self,
        ctx: &RequestContext,
        user: UserId,
        at: Timestamp,
    ) -> Result<Decimal, LedgerError> {
        let _span =
            tracing::info_span!("get_balance_at", request_id = %ctx, user, %at).entered();
        self.with_retries(|| self.history.get_balance_at(user, at))
    }

    /// Credit `amount` to `user` and return the new balance
    pub fn deposit(
        &self,
        ctx: &RequestContext,
        user: UserId,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let _span = tracing::info_span!("deposit", request_id = %ctx, user, %amount).entered();
        self.with_retries(|| self.engine.deposit(user, amount))
    }

    /// Debit `amount` from `user` and return the new balance
    pub fn withdraw(
        &self,
        ctx: &RequestContext,
        user: UserId,
        amount: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let _span = tracing::info_span!("withdraw", request_id = %ctx, user, %amount).entered();
        self.with_retries(|| self.engine.withdraw(user, amount))
    }

    /// Move `amount` from `from` to `to`, both legs or neither
    pub fn transfer(
        &self,
        ctx: &RequestContext,
        from: UserId,
        to: UserId,
        amount: Decimal,
    ) -> Result<(), LedgerError> {
        let _span =
            tracing::info_span!("transfer", request_id = %ctx, from, to, %amount).entered();
        self.with_retries(|| self.engine.transfer(from, to, amount))
    }

    /// Entries of `user`, oldest first
    pub fn list_transactions(
        &self,
        ctx: &RequestContext,
        user: UserId,
    ) -> Result<Vec<Entry>, LedgerError> {
        let _span = tracing::info_span!("list_transactions", request_id = %ctx, user).entered();
        self.with_retries(|| self.history.list_transactions(user))
    }

    /// Every account, ordered by user
    pub fn list_accounts(&self, ctx: &RequestContext) -> Result<Vec<Account>, LedgerError> {
        let _span = tracing::info_span!("list_accounts", request_id = %ctx).entered();
        self.with_retries(|| self.registry.list_accounts())
    }

    /// Run `attempt` until it succeeds, fails terminally, or retries run out
    fn with_retries<T, F>(&self, mut attempt: F) -> Result<T, LedgerError>
    where
        F: FnMut() -> Result<T, LedgerError>,
    {
        tracing::info!("Request started");
        let mut retries = 0;

        loop {
            match attempt() {
                Ok(value) => {
                    tracing::info!(retries, "Request succeeded");
                    return Ok(value);
                }
                Err(error) if error.is_retryable() && retries < self.config.max_retries => {
                    retries += 1;
                    let backoff = self.config.backoff_for(retries);
                    tracing::warn!(%error, retries, ?backoff, "Transient store failure, retrying");
                    thread::sleep(backoff);
                }
                Err(error) => {
                    tracing::warn!(%error, retries, "Request rejected");
                    return Err(error);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::store::{InMemoryLedgerStore, InMemoryTransaction};
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` transactions with a conflict
    #[derive(Debug)]
    struct FlakyStore {
        inner: InMemoryLedgerStore,
        failures: AtomicU32,
        begun: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryLedgerStore::new(),
                failures: AtomicU32::new(failures),
                begun: AtomicU32::new(0),
            }
        }
    }

    impl LedgerStore for FlakyStore {
        type Transaction<'a> = InMemoryTransaction<'a>;

        fn begin(&self) -> Result<Self::Transaction<'_>, LedgerError> {
            self.begun.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(LedgerError::conflict("injected"));
            }
            self.inner.begin()
        }
    }

    fn get_test_service<S: LedgerStore>(store: Arc<S>) -> WalletService<S, ManualClock> {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 6, 15, 0, 0).unwrap(),
        ));
        let config = LedgerConfig::new(2, Duration::from_millis(1), Duration::from_secs(1));
        WalletService::new(store, clock, config)
    }

    #[test]
    fn test_transient_conflict_is_retried() {
        let store = Arc::new(FlakyStore::new(2));
        let service = get_test_service(Arc::clone(&store));
        let ctx = RequestContext::new();

        let account = service.create_account(&ctx, 1).unwrap();

        assert_eq!(account.user, 1);
        assert_eq!(store.begun.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_retries_are_bounded() {
        let store = Arc::new(FlakyStore::new(10));
        let service = get_test_service(Arc::clone(&store));

        let result = service.create_account(&RequestContext::new(), 1);

        assert!(matches!(result, Err(LedgerError::Conflict { .. })));
        // First attempt plus max_retries
        assert_eq!(store.begun.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_terminal_rejection_is_not_retried() {
        let store = Arc::new(FlakyStore::new(0));
        let service = get_test_service(Arc::clone(&store));
        let ctx = RequestContext::new();

        let result = service.withdraw(&ctx, 1, Decimal::ONE);

        assert_eq!(result, Err(LedgerError::account_not_found(1)));
        assert_eq!(store.begun.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_amount_never_reaches_the_store() {
        let store = Arc::new(FlakyStore::new(0));
        let service = get_test_service(Arc::clone(&store));

        let result = service.deposit(&RequestContext::new(), 1, Decimal::ZERO);

        assert_eq!(result, Err(LedgerError::invalid_amount(Decimal::ZERO)));
        assert_eq!(store.begun.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_operations_through_the_facade() {
        let service = get_test_service(Arc::new(InMemoryLedgerStore::new()));
        let ctx = RequestContext::new();

        service.create_account(&ctx, 1).unwrap();
        service.create_account(&ctx, 2).unwrap();
        service.deposit(&ctx, 1, Decimal::new(10, 0)).unwrap();
        service.transfer(&ctx, 1, 2, Decimal::new(4, 0)).unwrap();

        assert_eq!(service.get_balance(&ctx, 1).unwrap(), Decimal::new(6, 0));
        assert_eq!(service.list_transactions(&ctx, 2).unwrap().len(), 1);
        assert_eq!(service.list_accounts(&ctx).unwrap().len(), 2);
    }
}
