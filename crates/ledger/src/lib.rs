//! Ledger domain (per-user multi-currency wallet).
//!
//! Pure domain logic only: no IO, no persistence concerns. The infrastructure
//! layer runs the decisions made here inside an atomic unit of work.

pub mod account;
pub mod command;
pub mod fx;
pub mod notification;
pub mod record;

pub use account::{Account, Balances};
pub use command::{CrossBorderTransfer, EntryPosted, LedgerCommand, LedgerEvent, RecordTransaction};
pub use fx::{FxQuote, FxQuoter};
pub use notification::{BalanceChanged, LedgerNotification};
pub use record::{
    Beneficiary, Category, PaymentRail, RecordDraft, RecordMetadata, TransactionRecord,
    TransactionType,
};
