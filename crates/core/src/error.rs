//! Domain error model.

use thiserror::Error;

use crate::money::{Amount, Currency};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, insufficient funds). Storage and transport failures belong to
/// the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive amount, unknown currency).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Applying the mutation would take a balance below zero.
    #[error("insufficient funds: {currency} balance {available} cannot cover {requested}")]
    InsufficientFunds {
        currency: Currency,
        available: Amount,
        requested: Amount,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn insufficient_funds(currency: Currency, available: Amount, requested: Amount) -> Self {
        Self::InsufficientFunds {
            currency,
            available,
            requested,
        }
    }
}
