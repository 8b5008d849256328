use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use vishwam_core::{Currency, DomainError, UserId};
use vishwam_ledger::{Account, TransactionRecord};

use super::unit_of_work::AccountTx;

/// Body of an atomic unit of work.
///
/// It may run more than once (optimistic retry), so it must only touch the
/// `AccountTx` it is handed. Returning an error aborts with no effect.
pub type UnitOfWorkBody<'a> =
    &'a (dyn Fn(&mut AccountTx) -> Result<(), DomainError> + Send + Sync);

/// Outcome of a committed unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    /// Account state after the commit (version already bumped).
    pub account: Account,
    /// Records appended by this commit, in the order they were staged.
    pub records: Vec<TransactionRecord>,
    /// How many times the body ran before the commit went through.
    pub attempts: u32,
}

/// Pagination parameters for history reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Page {
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    pub fn first(limit: u32) -> Self {
        Self::new(Some(limit), None)
    }

    pub fn next(self) -> Self {
        Self {
            limit: self.limit,
            offset: self.offset.saturating_add(self.limit),
        }
    }
}

/// Account store operation error.
///
/// Storage-side failures. `Rejected` carries the domain error a unit of work
/// body returned; everything else is infrastructure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account {0} not found")]
    NotFound(UserId),

    #[error("account {0} already exists")]
    AlreadyExists(UserId),

    #[error("unit of work rejected: {0}")]
    Rejected(#[from] DomainError),

    /// Optimistic retries exhausted.
    #[error("commit conflict persisted after {attempts} attempts")]
    Conflict { attempts: u32 },

    /// A transient backend conflict (serialization failure, deadlock). The
    /// store retries these itself; callers only see them as `Conflict`.
    #[error("transient conflict: {0}")]
    Retryable(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt account document: {0}")]
    Corrupt(String),
}

/// Persistent per-user account documents with transactional read-modify-write.
///
/// ## Unit of work
///
/// `run_atomic` snapshots the account, runs the body against an `AccountTx`,
/// and commits every staged balance and record together, only if nobody
/// else committed in between. On a version mismatch the body is re-run
/// against a fresh snapshot, up to the store's attempt limit.
///
/// Implementations must:
/// - never split a balance write from its records
/// - bump the account version by exactly one per commit
/// - assign record ids and timestamps at commit
/// - return history newest first
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create the account with zero balances (sign-up).
    async fn create_account(&self, user_id: UserId) -> Result<Account, StoreError>;

    async fn get_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError>;

    async fn run_atomic(
        &self,
        user_id: UserId,
        body: UnitOfWorkBody<'_>,
    ) -> Result<Committed, StoreError>;

    /// Records for a user, newest first, optionally filtered by currency.
    async fn query_transactions(
        &self,
        user_id: UserId,
        currency: Option<Currency>,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, StoreError>;
}

#[async_trait]
impl<S> AccountStore for Arc<S>
where
    S: AccountStore + ?Sized,
{
    async fn create_account(&self, user_id: UserId) -> Result<Account, StoreError> {
        (**self).create_account(user_id).await
    }

    async fn get_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        (**self).get_account(user_id).await
    }

    async fn run_atomic(
        &self,
        user_id: UserId,
        body: UnitOfWorkBody<'_>,
    ) -> Result<Committed, StoreError> {
        (**self).run_atomic(user_id, body).await
    }

    async fn query_transactions(
        &self,
        user_id: UserId,
        currency: Option<Currency>,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        (**self).query_transactions(user_id, currency, page).await
    }
}
