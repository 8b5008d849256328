//! Caller-facing error for ledger operations.

use thiserror::Error;

use vishwam_core::{Amount, Currency, DomainError};

use crate::account_store::StoreError;

/// Error returned by `LedgerService` and `AccountQueries`.
///
/// Every failed operation leaves balances and history exactly as they were.
/// Only `Aborted` is worth retrying unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Bad input, rejected before (or without) touching the account.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("insufficient funds: {currency} balance {available} cannot cover {requested}")]
    InsufficientFunds {
        currency: Currency,
        available: Amount,
        requested: Amount,
    },

    /// The store could not complete the unit of work (conflict, outage, corrupt data).
    #[error("ledger operation aborted: {0}")]
    Aborted(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Aborted(_))
    }

    /// Message safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            _ => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => LedgerError::Validation(msg),
            DomainError::InvalidId(msg) => LedgerError::Validation(msg),
            DomainError::InvariantViolation(msg) => LedgerError::Validation(msg),
            DomainError::InsufficientFunds {
                currency,
                available,
                requested,
            } => LedgerError::InsufficientFunds {
                currency,
                available,
                requested,
            },
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Rejected(domain) => domain.into(),
            StoreError::NotFound(user_id) => LedgerError::NotFound(format!("account {user_id}")),
            StoreError::AlreadyExists(user_id) => {
                LedgerError::Validation(format!("account {user_id} already exists"))
            }
            other => LedgerError::Aborted(other.to_string()),
        }
    }
}
