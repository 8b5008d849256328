//! Infrastructure layer: account stores, the ledger service, queries, config.

pub mod account_store;
pub mod config;
pub mod error;
pub mod ledger_service;
pub mod queries;

pub use account_store::{
    AccountStore, AccountTx, Committed, InMemoryAccountStore, Page, PostgresAccountStore,
    StoreError,
};
pub use config::{ConfigError, LedgerConfig, StoreBackend};
pub use error::LedgerError;
pub use ledger_service::LedgerService;
pub use queries::{AccountQueries, CurrencyReconciliation, Reconciliation};
