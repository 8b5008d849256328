//! Read-only account queries.
//!
//! Balances and history come straight from the account store; there is no
//! separate read model to lag behind.

use serde::{Deserialize, Serialize};

use vishwam_core::{AggregateRoot, Amount, Currency, SignedAmount, UserId};
use vishwam_ledger::{Balances, TransactionRecord};

use crate::account_store::{AccountStore, Page};
use crate::error::LedgerError;

const RECONCILE_ATTEMPTS: u32 = 3;

/// Balance versus the sum of its records, for one currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyReconciliation {
    pub currency: Currency,
    pub balance: Amount,
    pub record_total: SignedAmount,
    pub record_count: usize,
}

impl CurrencyReconciliation {
    pub fn is_balanced(&self) -> bool {
        self.record_total == SignedAmount::from(self.balance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub user_id: UserId,
    pub version: u64,
    pub currencies: Vec<CurrencyReconciliation>,
}

impl Reconciliation {
    pub fn is_balanced(&self) -> bool {
        self.currencies.iter().all(CurrencyReconciliation::is_balanced)
    }
}

#[derive(Debug, Clone)]
pub struct AccountQueries<S> {
    store: S,
}

impl<S: AccountStore> AccountQueries<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub async fn balances(&self, user_id: UserId) -> Result<Balances, LedgerError> {
        self.store
            .get_account(user_id)
            .await?
            .map(|account| account.balances())
            .ok_or_else(|| LedgerError::NotFound(format!("account {user_id}")))
    }

    pub async fn balance(&self, user_id: UserId, currency: Currency) -> Result<Amount, LedgerError> {
        Ok(self.balances(user_id).await?.get(currency))
    }

    /// History, newest first.
    pub async fn history(
        &self,
        user_id: UserId,
        currency: Option<Currency>,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        Ok(self.store.query_transactions(user_id, currency, page).await?)
    }

    /// Check that each balance equals the sum of its records.
    ///
    /// Reads are not transactional; if a commit lands mid-read the check is
    /// repeated against the newer version. A read that never sees a stable
    /// version is reported as `Aborted` rather than as an imbalance.
    pub async fn reconcile(&self, user_id: UserId) -> Result<Reconciliation, LedgerError> {
        for _ in 0..RECONCILE_ATTEMPTS {
            let (version, balances) = self.load(user_id).await?;
            let records = self.all_records(user_id).await?;
            let (current, _) = self.load(user_id).await?;

            if version == current {
                return summarize(user_id, version, balances, &records);
            }
        }
        Err(LedgerError::Aborted(format!(
            "account {user_id} kept changing during reconciliation"
        )))
    }

    async fn load(&self, user_id: UserId) -> Result<(u64, Balances), LedgerError> {
        let account = self
            .store
            .get_account(user_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("account {user_id}")))?;
        Ok((account.version(), account.balances()))
    }

    async fn all_records(&self, user_id: UserId) -> Result<Vec<TransactionRecord>, LedgerError> {
        let mut page = Page::first(Page::MAX_LIMIT);
        let mut out = Vec::new();
        loop {
            let batch = self.store.query_transactions(user_id, None, page).await?;
            let done = batch.len() < page.limit as usize;
            out.extend(batch);
            if done {
                return Ok(out);
            }
            page = page.next();
        }
    }
}

fn summarize(
    user_id: UserId,
    version: u64,
    balances: Balances,
    records: &[TransactionRecord],
) -> Result<Reconciliation, LedgerError> {
    let mut currencies = Vec::with_capacity(Currency::ALL.len());
    for (currency, balance) in balances.iter() {
        let mut total = SignedAmount::ZERO;
        let mut count = 0;
        for record in records.iter().filter(|r| r.currency == currency) {
            total = total
                .checked_add(record.signed_amount)
                .ok_or_else(|| LedgerError::Aborted(format!("{currency} record total overflows")))?;
            count += 1;
        }
        currencies.push(CurrencyReconciliation {
            currency,
            balance,
            record_total: total,
            record_count: count,
        });
    }
    Ok(Reconciliation {
        user_id,
        version,
        currencies,
    })
}
