//! CSV format handling for replay commands and ledger output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserializing command rows
//! - Conversion from CSV records to validated command records
//! - Serialization of accounts and entries
//!
//! All functions are pure (no file handling) for easy testing.
//!
//! # Input Format
//!
//! ```text
//! op,user,to_user,amount
//! create,1,,
//! deposit,1,,100.00
//! transfer,1,2,70.00
//! ```

use crate::types::{Account, CommandRecord, CommandType, Entry, LedgerError, UserId};
use chrono::SecondsFormat;
use csv::Writer;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns: op, user, to_user, amount.
/// `to_user` and `amount` are optional because not every command uses them.
/// The amount stays a string here so a bad value can be reported verbatim.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    pub op: String,
    pub user: UserId,
    pub to_user: Option<UserId>,
    pub amount: Option<String>,
}

/// Convert a CsvRecord to a CommandRecord
///
/// This function:
/// - Parses the op string (case-insensitive) into a CommandType
/// - Parses the amount string into a Decimal (if present)
/// - Checks that deposit, withdraw and transfer carry an amount
/// - Checks that transfer carries a destination user
///
/// Whether the amount is positive is left to the balance engine, which
/// reports it as `InvalidAmount` like any other caller would see.
///
/// # Errors
///
/// - `InvalidCommand` for an unknown op
/// - `InvalidAmount` for an amount that is not a decimal
/// - `MissingField` for a missing amount or destination
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<CommandRecord, LedgerError> {
    let op: CommandType = csv_record.op.parse()?;

    let amount = match csv_record.amount {
        Some(amount_str) if !amount_str.trim().is_empty() => Some(
            Decimal::from_str(amount_str.trim())
                .map_err(|_| LedgerError::invalid_amount(amount_str.trim()))?,
        ),
        _ => None,
    };

    match op {
        CommandType::Create => {}
        CommandType::Deposit | CommandType::Withdraw | CommandType::Transfer => {
            if amount.is_none() {
                return Err(LedgerError::missing_field(
                    op.as_str(),
                    csv_record.user,
                    "amount",
                ));
            }
        }
    }

    if op == CommandType::Transfer && csv_record.to_user.is_none() {
        return Err(LedgerError::missing_field(
            op.as_str(),
            csv_record.user,
            "to_user",
        ));
    }

    Ok(CommandRecord {
        op,
        user: csv_record.user,
        to_user: csv_record.to_user,
        amount,
    })
}

fn write_error(context: &str, error: csv::Error) -> LedgerError {
    LedgerError::IoError {
        message: format!("{}: {}", context, error),
    }
}

/// Write account snapshots to CSV format
///
/// Writes accounts with columns: user, account, balance. Accounts are sorted
/// by user for deterministic output. Balances are written exactly as stored,
/// without rounding.
pub fn write_accounts_csv(accounts: &[Account], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["user", "account", "balance"])
        .map_err(|e| write_error("Failed to write CSV header", e))?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by_key(|account| account.user);

    for account in sorted_accounts {
        writer
            .write_record(&[
                account.user.to_string(),
                account.id.to_string(),
                account.balance.to_string(),
            ])
            .map_err(|e| write_error("Failed to write account record", e))?;
    }

    writer.flush()?;
    Ok(())
}

/// Write ledger entries to CSV format
///
/// Columns: id, account, amount, created_at. Entries are written in the
/// order given; timestamps are RFC 3339 in UTC with microseconds.
pub fn write_entries_csv(entries: &[Entry], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["id", "account", "amount", "created_at"])
        .map_err(|e| write_error("Failed to write CSV header", e))?;

    for entry in entries {
        writer
            .write_record(&[
                entry.id.to_string(),
                entry.account.to_string(),
                entry.amount.to_string(),
                entry
                    .created_at
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
            ])
            .map_err(|e| write_error("Failed to write entry record", e))?;
    }

    writer.flush()?;
    Ok(())
}
