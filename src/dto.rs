use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Error;

/// A single row of the operations CSV consumed by the runner.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Open,
    Transfer,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub account: String,
    pub to: Option<String>,
    pub amount: Option<Decimal>,
}

/// A validated request to move `amount` from one account to another.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRequest {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

impl TransferRequest {
    /// Builds a request, applying the structural validation that belongs to
    /// the boundary: identifiers must be non-empty and the amount strictly
    /// positive. Same-account rejection is the engine's job, not ours.
    pub fn new(from: String, to: String, amount: Decimal) -> Result<Self, Error> {
        if from.is_empty() || to.is_empty() {
            return Err(Error::InvalidTransfer(
                "Account id must not be empty".to_owned(),
            ));
        }
        if amount <= Decimal::ZERO {
            return Err(Error::InvalidTransfer(
                "Transferred amount must be positive".to_owned(),
            ));
        }
        Ok(Self { from, to, amount })
    }
}

/// Immutable record of a completed transfer, returned to the caller.
/// Not persisted anywhere.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransferExecution {
    #[serde(rename = "accountFromId")]
    pub from: String,
    #[serde(rename = "accountToId")]
    pub to: String,
    pub amount: Decimal,
    pub time: DateTime<Utc>,
}

impl TransferExecution {
    pub fn new(request: &TransferRequest, time: DateTime<Utc>) -> Self {
        Self {
            from: request.from.clone(),
            to: request.to.clone(),
            amount: request.amount,
            time,
        }
    }
}

/// Boundary-side record of a rejected transfer, carrying the reason string.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransferFailure {
    #[serde(rename = "accountFromId")]
    pub from: String,
    #[serde(rename = "accountToId")]
    pub to: String,
    pub amount: Decimal,
    pub time: DateTime<Utc>,
    #[serde(rename = "failureReason")]
    pub failure_reason: String,
}

impl TransferFailure {
    pub fn new(request: &TransferRequest, time: DateTime<Utc>, failure_reason: String) -> Self {
        Self {
            from: request.from.clone(),
            to: request.to.clone(),
            amount: request.amount,
            time,
            failure_reason,
        }
    }
}

/// Output row for the final balance report.
#[derive(Debug, Serialize, PartialEq)]
pub struct AccountRow {
    pub account: String,
    pub balance: Decimal,
}

impl From<crate::stores::Account> for AccountRow {
    fn from(account: crate::stores::Account) -> Self {
        Self {
            account: account.id,
            balance: account.balance,
        }
    }
}
