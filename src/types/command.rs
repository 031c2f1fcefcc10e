//! Replay command types for the wallet ledger
//!
//! This module defines the commands that can be replayed from an input file
//! against the ledger. Each command maps onto one caller-facing operation.

use super::entry::UserId;
use super::error::LedgerError;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Mutating operations that can be replayed from a command file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    /// Open an account with a zero balance for the user
    Create,

    /// Credit funds to the user's account
    Deposit,

    /// Debit funds from the user's account
    ///
    /// Rejected when the amount exceeds the stored balance.
    Withdraw,

    /// Move funds from the user's account to `to_user`'s account
    ///
    /// Both legs commit together or not at all.
    Transfer,
}

impl CommandType {
    /// Lowercase name used in input files and log output
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Create => "create",
            CommandType::Deposit => "deposit",
            CommandType::Withdraw => "withdraw",
            CommandType::Transfer => "transfer",
        }
    }
}

impl FromStr for CommandType {
    type Err = LedgerError;

    /// Parse an op name, ignoring case
    fn from_str(op: &str) -> Result<Self, Self::Err> {
        match op.to_lowercase().as_str() {
            "create" => Ok(CommandType::Create),
            "deposit" => Ok(CommandType::Deposit),
            "withdraw" => Ok(CommandType::Withdraw),
            "transfer" => Ok(CommandType::Transfer),
            _ => Err(LedgerError::invalid_command(op)),
        }
    }
}

/// A validated command read from an input file
///
/// `amount` is present for deposits, withdrawals and transfers;
/// `to_user` only for transfers.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRecord {
    /// The operation to perform
    pub op: CommandType,

    /// The acting user (the source of a transfer)
    pub user: UserId,

    /// Destination user of a transfer
    pub to_user: Option<UserId>,

    /// Amount for deposit, withdraw and transfer
    pub amount: Option<Decimal>,
}
