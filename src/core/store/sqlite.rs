//! SQLite backed ledger store
//!
//! Accounts and entries live in two tables:
//!
//! ```text
//! account(id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL UNIQUE, balance TEXT NOT NULL)
//! entry(id INTEGER PRIMARY KEY, account_id INTEGER NOT NULL, amount TEXT NOT NULL,
//!       created_at INTEGER NOT NULL)   -- indexed on (account_id, created_at)
//! ```
//!
//! Decimals are stored as text so no precision is lost, timestamps as UTC
//! microseconds since the epoch. Every transaction is `BEGIN IMMEDIATE`, which
//! takes the database write lock up front. Within this process transactions
//! queue for the single connection; across processes SQLite serialises
//! writers. Both waits are bounded by the lock timeout and end in `Conflict`.

use crate::config::DEFAULT_LOCK_TIMEOUT;
use crate::core::traits::{LedgerStore, StoreTransaction};
use crate::types::{Account, AccountId, Entry, LedgerError, NewEntry, Timestamp, UserId};
use chrono::DateTime;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Ledger store persisted in a SQLite database
///
/// One transaction at a time owns the connection. Threads of this process
/// queue for it on a condvar for at most `lock_timeout`; other processes are
/// held off by SQLite's own busy timeout.
#[derive(Debug)]
pub struct SqliteLedgerStore {
    connection: Mutex<Connection>,
    /// Set while a transaction owns the connection
    checked_out: Mutex<bool>,
    returned: Condvar,
    lock_timeout: Duration,
}

impl SqliteLedgerStore {
    /// Open (or create) the database at `path`
    ///
    /// Transactions wait up to `lock_timeout` for another process holding the
    /// database before failing with [`LedgerError::Conflict`].
    pub fn open(path: &Path, lock_timeout: Duration) -> Result<Self, LedgerError> {
        let connection = Connection::open(path)?;
        Self::from_connection(connection, lock_timeout)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::from_connection(Connection::open_in_memory()?, DEFAULT_LOCK_TIMEOUT)
    }

    fn from_connection(connection: Connection, lock_timeout: Duration) -> Result<Self, LedgerError> {
        connection.busy_timeout(lock_timeout)?;
        Self::create_tables(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
            checked_out: Mutex::new(false),
            returned: Condvar::new(),
            lock_timeout,
        })
    }

    fn create_tables(connection: &Connection) -> Result<(), rusqlite::Error> {
        connection.execute_batch(
            "PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS account (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL UNIQUE,
                balance TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS entry (
                id INTEGER PRIMARY KEY,
                account_id INTEGER NOT NULL REFERENCES account(id),
                amount TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS entry_account_created_at
                ON entry(account_id, created_at);",
        )
    }

    /// Wait until no other transaction of this process owns the connection
    fn check_out(&self) -> Result<(), LedgerError> {
        let deadline = Instant::now() + self.lock_timeout;
        let mut checked_out = self
            .checked_out
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while *checked_out {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LedgerError::conflict(format!(
                    "timed out after {:?} waiting for the database connection",
                    self.lock_timeout
                )));
            }
            checked_out = self
                .returned
                .wait_timeout(checked_out, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *checked_out = true;
        Ok(())
    }

    fn check_in(&self) {
        *self
            .checked_out
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = false;
        self.returned.notify_one();
    }

    fn lock_connection(&self) -> MutexGuard<'_, Connection> {
        let connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        // A holder that panicked may have left its transaction open
        if !connection.is_autocommit() {
            tracing::warn!("Rolling back transaction abandoned by a panicked holder");
            if let Err(error) = connection.execute_batch("ROLLBACK") {
                tracing::error!(%error, "Could not roll back abandoned transaction");
            }
        }
        connection
    }
}

impl LedgerStore for SqliteLedgerStore {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn begin(&self) -> Result<Self::Transaction<'_>, LedgerError> {
        self.check_out()?;

        // From here on dropping the transaction hands the connection back
        let mut tx = SqliteTransaction {
            store: self,
            connection: self.lock_connection(),
            locked: Vec::new(),
            open: false,
        };
        tx.connection.execute_batch("BEGIN IMMEDIATE")?;
        tx.open = true;
        Ok(tx)
    }
}

/// An open `BEGIN IMMEDIATE` transaction
///
/// Holds the store's connection for its whole lifetime. Dropping it without
/// committing rolls back.
#[derive(Debug)]
pub struct SqliteTransaction<'a> {
    store: &'a SqliteLedgerStore,
    connection: MutexGuard<'a, Connection>,
    /// Accounts this transaction may write (locked or created here)
    locked: Vec<AccountId>,
    open: bool,
}

type AccountRow = (AccountId, UserId, String);
type EntryRow = (i64, AccountId, String, i64);

fn account_row(row: &rusqlite::Row) -> Result<AccountRow, rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn entry_row(row: &rusqlite::Row) -> Result<EntryRow, rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn parse_decimal(text: &str) -> Result<Decimal, LedgerError> {
    Decimal::from_str(text)
        .map_err(|e| LedgerError::corrupt_record(format!("invalid decimal '{}': {}", text, e)))
}

fn to_micros(timestamp: Timestamp) -> i64 {
    timestamp.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<Timestamp, LedgerError> {
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(micros.div_euclid(1_000_000), nanos).ok_or_else(|| {
        LedgerError::corrupt_record(format!("timestamp out of range: {}", micros))
    })
}

/// Smallest whole microsecond not earlier than `before`
///
/// Stored timestamps are whole microseconds, so `created_at < cutoff` is
/// exactly "created strictly before `before`".
fn cutoff_micros(before: Timestamp) -> i64 {
    let micros = to_micros(before);
    if before.timestamp_subsec_nanos() % 1_000 == 0 {
        micros
    } else {
        micros + 1
    }
}

fn into_account((id, user, balance): AccountRow) -> Result<Account, LedgerError> {
    Ok(Account {
        id,
        user,
        balance: parse_decimal(&balance)?,
    })
}

fn into_entry((id, account, amount, created_at): EntryRow) -> Result<Entry, LedgerError> {
    Ok(Entry {
        id,
        account,
        amount: parse_decimal(&amount)?,
        created_at: from_micros(created_at)?,
    })
}

impl SqliteTransaction<'_> {
    fn ensure_writable(&self, account: AccountId) -> Result<(), LedgerError> {
        if self.locked.contains(&account) {
            Ok(())
        } else {
            Err(LedgerError::AccountNotLocked { account })
        }
    }

    fn query_entries(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Entry>, LedgerError> {
        let mut statement = self.connection.prepare(sql)?;
        let entries = statement
            .query_map(params, entry_row)?
            .map(|row| into_entry(row?))
            .collect::<Result<Vec<_>, LedgerError>>();
        entries
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn get_account(&mut self, user: UserId) -> Result<Option<Account>, LedgerError> {
        self.connection
            .query_row(
                "SELECT id, user_id, balance FROM account WHERE user_id = ?1",
                params![user],
                account_row,
            )
            .optional()?
            .map(into_account)
            .transpose()
    }

    fn insert_account(&mut self, user: UserId) -> Result<Account, LedgerError> {
        let inserted = self.connection.execute(
            "INSERT INTO account (user_id, balance) VALUES (?1, ?2)",
            params![user, Decimal::ZERO.to_string()],
        );

        match inserted {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(error, _))
                if error.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                return Err(LedgerError::duplicate_account(user));
            }
            Err(error) => return Err(error.into()),
        }

        let account = Account::new(self.connection.last_insert_rowid(), user);
        self.locked.push(account.id);
        Ok(account)
    }

    // BEGIN IMMEDIATE already excludes every other writer, so exclusive
    // access only has to be recorded, not acquired.
    fn lock_accounts(&mut self, accounts: &[AccountId]) -> Result<(), LedgerError> {
        let mut ordered = accounts.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        for account in ordered {
            if self.locked.contains(&account) {
                continue;
            }
            let exists = self
                .connection
                .query_row(
                    "SELECT 1 FROM account WHERE id = ?1",
                    params![account],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            if !exists {
                return Err(LedgerError::corrupt_record(format!(
                    "account {} does not exist",
                    account
                )));
            }
            self.locked.push(account);
        }
        tracing::debug!(accounts = ?self.locked, "Accounts locked by immediate transaction");
        Ok(())
    }

    fn update_account_balance(
        &mut self,
        account: AccountId,
        balance: Decimal,
    ) -> Result<(), LedgerError> {
        self.ensure_writable(account)?;

        let updated = self.connection.execute(
            "UPDATE account SET balance = ?1 WHERE id = ?2",
            params![balance.to_string(), account],
        )?;
        if updated == 0 {
            return Err(LedgerError::corrupt_record(format!(
                "account {} does not exist",
                account
            )));
        }
        Ok(())
    }

    fn insert_entry(&mut self, entry: NewEntry) -> Result<Entry, LedgerError> {
        self.ensure_writable(entry.account)?;

        self.connection.execute(
            "INSERT INTO entry (account_id, amount, created_at) VALUES (?1, ?2, ?3)",
            params![
                entry.account,
                entry.amount.to_string(),
                to_micros(entry.created_at)
            ],
        )?;
        let id = self.connection.last_insert_rowid();
        Ok(entry.with_id(id))
    }

    fn list_entries_before(
        &mut self,
        account: AccountId,
        before: Timestamp,
    ) -> Result<Vec<Entry>, LedgerError> {
        self.query_entries(
            "SELECT id, account_id, amount, created_at FROM entry
                WHERE account_id = ?1 AND created_at < ?2
                ORDER BY created_at, id",
            params![account, cutoff_micros(before)],
        )
    }

    fn list_entries(&mut self, account: AccountId) -> Result<Vec<Entry>, LedgerError> {
        self.query_entries(
            "SELECT id, account_id, amount, created_at FROM entry
                WHERE account_id = ?1
                ORDER BY created_at, id",
            params![account],
        )
    }

    fn list_accounts(&mut self) -> Result<Vec<Account>, LedgerError> {
        let mut statement = self
            .connection
            .prepare("SELECT id, user_id, balance FROM account ORDER BY user_id")?;
        let accounts = statement
            .query_map([], account_row)?
            .map(|row| into_account(row?))
            .collect::<Result<Vec<_>, LedgerError>>();
        accounts
    }

    fn commit(mut self) -> Result<(), LedgerError> {
        self.connection.execute_batch("COMMIT")?;
        self.open = false;
        Ok(())
    }

    fn rollback(mut self) -> Result<(), LedgerError> {
        self.open = false;
        self.connection.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(error) = self.connection.execute_batch("ROLLBACK") {
                tracing::error!(%error, "Could not roll back dropped transaction");
            }
        }
        self.store.check_in();
    }
}
