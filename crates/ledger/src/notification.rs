//! Notifications pushed to sessions after a committed change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vishwam_core::UserId;
use vishwam_events::Event;

use crate::account::Balances;
use crate::record::TransactionRecord;

/// Balances after a committed unit of work, plus the records it appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChanged {
    pub user_id: UserId,
    pub balances: Balances,
    pub version: u64,
    pub records: Vec<TransactionRecord>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerNotification {
    AccountOpened {
        user_id: UserId,
        balances: Balances,
        occurred_at: DateTime<Utc>,
    },
    BalanceChanged(BalanceChanged),
}

impl LedgerNotification {
    pub fn user_id(&self) -> UserId {
        match self {
            LedgerNotification::AccountOpened { user_id, .. } => *user_id,
            LedgerNotification::BalanceChanged(e) => e.user_id,
        }
    }

    pub fn balances(&self) -> Balances {
        match self {
            LedgerNotification::AccountOpened { balances, .. } => *balances,
            LedgerNotification::BalanceChanged(e) => e.balances,
        }
    }
}

impl Event for LedgerNotification {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerNotification::AccountOpened { .. } => "ledger.account.opened",
            LedgerNotification::BalanceChanged(_) => "ledger.account.balance_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerNotification::AccountOpened { occurred_at, .. } => *occurred_at,
            LedgerNotification::BalanceChanged(e) => e.occurred_at,
        }
    }
}
