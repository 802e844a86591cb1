//! Domain-specific errors for the transfer engine.
//!
//! Contains error variants for common failure cases like:
//! - Account-related errors (duplicate id, not found)
//! - Balance mutation errors (negative amount, insufficient funds)
//! - Rejected transfers, the only kind surfaced to callers of the engine
//!
//! These errors represent business logic failures rather than
//! technical errors like I/O or parsing issues.

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum Error {
    #[error("Account id {0} already exists")]
    DuplicateAccount(String),

    #[error("Account {0} does not exist")]
    AccountNotFound(String),

    #[error("Invalid account change: cannot apply negative amount {0}")]
    InvalidAccountChange(Decimal),

    #[error("Account {account} balance {balance} is less than {amount}")]
    InsufficientFunds {
        account: String,
        balance: Decimal,
        amount: Decimal,
    },

    /// The single failure kind a rejected transfer surfaces to callers.
    /// The payload is the stable, human-readable rejection reason.
    #[error("{0}")]
    InvalidTransfer(String),
}
