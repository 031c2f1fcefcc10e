//! Balance engine
//!
//! This module provides the `BalanceEngine`, which performs every balance
//! mutation of the ledger.
//!
//! The engine enforces these rules:
//! - Amounts must be strictly positive
//! - A withdrawal (or the debit leg of a transfer) never takes a balance
//!   below zero
//! - Every balance change is paired with an entry of the same amount, so the
//!   stored balance always equals the sum of the account's entries
//! - A transfer applies both legs in one store transaction or neither
//!
//! Each mutation takes exclusive access to the accounts it touches and only
//! then re-reads their balances. For a transfer both accounts are requested
//! together and the store acquires them in ascending account id order.

use crate::core::clock::Clock;
use crate::core::registry::resolve;
use crate::core::traits::{LedgerStore, StoreTransaction};
use crate::types::{Account, LedgerError, NewEntry, UserId};
use rust_decimal::Decimal;
use std::sync::Arc;

/// Deposit, withdraw and transfer against a ledger store
#[derive(Debug)]
pub struct BalanceEngine<S, C> {
    store: Arc<S>,
    clock: Arc<C>,
}

impl<S, C> Clone for BalanceEngine<S, C> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(amount));
    }
    Ok(())
}

/// Lock the account of `user` and read its balance under that lock
fn lock_and_reload<T: StoreTransaction>(tx: &mut T, user: UserId) -> Result<Account, LedgerError> {
    let account = resolve(tx, user)?;
    tx.lock_accounts(&[account.id])?;
    resolve(tx, user)
}

impl<S: LedgerStore, C: Clock> BalanceEngine<S, C> {
    pub fn new(store: Arc<S>, clock: Arc<C>) -> Self {
        Self { store, clock }
    }

    /// Credit `amount` to the account of `user`
    ///
    /// # Returns
    ///
    /// The balance after the deposit
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is zero or negative
    /// - `AccountNotFound` if the user owns no account
    /// - `ArithmeticOverflow` if the new balance cannot be represented
    pub fn deposit(&self, user: UserId, amount: Decimal) -> Result<Decimal, LedgerError> {
        ensure_positive(amount)?;

        self.store.transaction(|tx| {
            let account = lock_and_reload(tx, user)?;
            let balance = account
                .balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::arithmetic_overflow("deposit", user))?;

            tx.update_account_balance(account.id, balance)?;
            tx.insert_entry(NewEntry::credit(account.id, amount, self.clock.now()))?;
            Ok(balance)
        })
    }

    /// Debit `amount` from the account of `user`
    ///
    /// # Returns
    ///
    /// The balance after the withdrawal
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is zero or negative
    /// - `AccountNotFound` if the user owns no account
    /// - `InsufficientFunds` if `amount` exceeds the stored balance
    pub fn withdraw(&self, user: UserId, amount: Decimal) -> Result<Decimal, LedgerError> {
        ensure_positive(amount)?;

        self.store.transaction(|tx| {
            let account = lock_and_reload(tx, user)?;
            let balance = debit(&account, amount)?;

            tx.update_account_balance(account.id, balance)?;
            tx.insert_entry(NewEntry::debit(account.id, amount, self.clock.now()))?;
            Ok(balance)
        })
    }

    /// Move `amount` from the account of `from` to the account of `to`
    ///
    /// The debit leg is applied first, then the credit leg. Both legs carry
    /// the same timestamp. If anything fails after the debit was applied the
    /// store transaction is rolled back, so the source is left untouched.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is zero or negative
    /// - `SameAccountTransfer` if `from == to`
    /// - `AccountNotFound` for whichever user owns no account (source first)
    /// - `InsufficientFunds` if `amount` exceeds the source balance
    /// - `ArithmeticOverflow` if the destination balance cannot be represented
    pub fn transfer(&self, from: UserId, to: UserId, amount: Decimal) -> Result<(), LedgerError> {
        ensure_positive(amount)?;
        if from == to {
            return Err(LedgerError::same_account_transfer(from));
        }

        self.store.transaction(|tx| {
            let source = resolve(tx, from)?;
            let destination = resolve(tx, to)?;
            tx.lock_accounts(&[source.id, destination.id])?;

            let source = resolve(tx, from)?;
            let destination = resolve(tx, to)?;
            let created_at = self.clock.now();

            let source_balance = debit(&source, amount)?;
            tx.update_account_balance(source.id, source_balance)?;
            tx.insert_entry(NewEntry::debit(source.id, amount, created_at))?;

            let destination_balance = destination
                .balance
                .checked_add(amount)
                .ok_or_else(|| LedgerError::arithmetic_overflow("transfer", to))?;
            tx.update_account_balance(destination.id, destination_balance)?;
            tx.insert_entry(NewEntry::credit(destination.id, amount, created_at))?;

            Ok(())
        })
    }

    /// Stored balance of the account of `user`
    ///
    /// Reads the persisted balance; no entries are replayed.
    pub fn get_balance(&self, user: UserId) -> Result<Decimal, LedgerError> {
        self.store
            .transaction(|tx| resolve(tx, user))
            .map(|account| account.balance)
    }
}

fn debit(account: &Account, amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount > account.balance {
        return Err(LedgerError::insufficient_funds(
            account.user,
            account.balance,
            amount,
        ));
    }
    account
        .balance
        .checked_sub(amount)
        .ok_or_else(|| LedgerError::arithmetic_overflow("withdraw", account.user))
}
