//! Account store abstraction + implementations.
//!
//! The store is the source of truth for balances and transaction history.
//! Every mutation goes through `AccountStore::run_atomic`.

mod r#trait;
mod unit_of_work;

pub mod in_memory;
pub mod postgres;

pub use in_memory::{DEFAULT_MAX_COMMIT_ATTEMPTS, InMemoryAccountStore};
pub use postgres::PostgresAccountStore;
pub use r#trait::{AccountStore, Committed, Page, StoreError, UnitOfWorkBody};
pub use unit_of_work::AccountTx;
