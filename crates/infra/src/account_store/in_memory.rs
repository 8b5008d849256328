use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use vishwam_core::{AggregateRoot, Currency, UserId};
use vishwam_ledger::{Account, TransactionRecord};

use super::r#trait::{AccountStore, Committed, Page, StoreError, UnitOfWorkBody};
use super::unit_of_work::AccountTx;

pub const DEFAULT_MAX_COMMIT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
struct AccountDocument {
    account: Account,
    records: Vec<TransactionRecord>,
}

/// In-memory account store.
///
/// Intended for tests/dev. Commits are serialized by a single write lock;
/// bodies run outside the lock against a cloned snapshot.
#[derive(Debug)]
pub struct InMemoryAccountStore {
    documents: RwLock<HashMap<UserId, AccountDocument>>,
    max_attempts: u32,
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::with_max_attempts(DEFAULT_MAX_COMMIT_ATTEMPTS)
    }
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("lock poisoned".to_string())
    }

    fn snapshot(&self, user_id: UserId) -> Result<Account, StoreError> {
        let documents = self.documents.read().map_err(|_| Self::poisoned())?;
        documents
            .get(&user_id)
            .map(|doc| doc.account.clone())
            .ok_or(StoreError::NotFound(user_id))
    }

    /// Commit if the document is still at the snapshot's version.
    fn try_commit(&self, tx: AccountTx) -> Result<Option<(Account, Vec<TransactionRecord>)>, StoreError> {
        let mut documents = self.documents.write().map_err(|_| Self::poisoned())?;
        let user_id = *tx.account().id();
        let doc = documents
            .get_mut(&user_id)
            .ok_or(StoreError::NotFound(user_id))?;

        if !tx.expected_version().matches(doc.account.version()) {
            return Ok(None);
        }

        let pending = tx.finish(Utc::now());
        doc.account = pending.account.clone();
        doc.records.extend(pending.records.iter().cloned());
        Ok(Some((pending.account, pending.records)))
    }

    /// Bump a document's version as if another writer had committed.
    #[cfg(test)]
    fn interfere(&self, user_id: UserId) {
        let mut documents = self.documents.write().unwrap();
        let doc = documents.get_mut(&user_id).unwrap();
        let next = doc.account.version() + 1;
        doc.account = doc.account.clone().with_version(next);
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn create_account(&self, user_id: UserId) -> Result<Account, StoreError> {
        let mut documents = self.documents.write().map_err(|_| Self::poisoned())?;
        if documents.contains_key(&user_id) {
            return Err(StoreError::AlreadyExists(user_id));
        }
        let account = Account::open(user_id, Utc::now());
        documents.insert(
            user_id,
            AccountDocument {
                account: account.clone(),
                records: Vec::new(),
            },
        );
        Ok(account)
    }

    async fn get_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        let documents = self.documents.read().map_err(|_| Self::poisoned())?;
        Ok(documents.get(&user_id).map(|doc| doc.account.clone()))
    }

    async fn run_atomic(
        &self,
        user_id: UserId,
        body: UnitOfWorkBody<'_>,
    ) -> Result<Committed, StoreError> {
        for attempt in 1..=self.max_attempts {
            let mut tx = AccountTx::begin(self.snapshot(user_id)?);
            body(&mut tx)?;

            match self.try_commit(tx)? {
                Some((account, records)) => {
                    return Ok(Committed {
                        account,
                        records,
                        attempts: attempt,
                    });
                }
                None => {
                    tracing::debug!(%user_id, attempt, "account version moved during unit of work; retrying");
                    tokio::task::yield_now().await;
                }
            }
        }

        Err(StoreError::Conflict {
            attempts: self.max_attempts,
        })
    }

    async fn query_transactions(
        &self,
        user_id: UserId,
        currency: Option<Currency>,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let documents = self.documents.read().map_err(|_| Self::poisoned())?;
        let doc = documents
            .get(&user_id)
            .ok_or(StoreError::NotFound(user_id))?;

        let mut records: Vec<TransactionRecord> = doc
            .records
            .iter()
            .filter(|r| currency.is_none_or(|c| r.currency == c))
            .cloned()
            .collect();
        records.sort_by_key(|r| Reverse((r.timestamp, *r.id.as_uuid())));

        Ok(records
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit.min(Page::MAX_LIMIT) as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vishwam_core::{Amount, DomainError, SignedAmount};
    use vishwam_ledger::{Category, PaymentRail, RecordDraft, RecordMetadata, TransactionType};

    fn deposit_draft(user_id: UserId, currency: Currency, minor: i64) -> RecordDraft {
        RecordDraft {
            user_id,
            currency,
            signed_amount: SignedAmount::from_minor(minor),
            kind: TransactionType::Deposit,
            category: Category::Income,
            description: "Top up".to_string(),
            method: PaymentRail::BankTransfer,
            metadata: RecordMetadata::default(),
        }
    }

    fn credit(tx: &mut AccountTx, currency: Currency, minor: i64) -> Result<(), DomainError> {
        let user_id = *tx.account().id();
        let next = tx
            .balance(currency)
            .checked_add(Amount::from_minor(minor)?)?;
        tx.set_balance(currency, next);
        tx.append_record(deposit_draft(user_id, currency, minor))
    }

    #[tokio::test]
    async fn create_seeds_zero_balances_once() {
        let store = InMemoryAccountStore::new();
        let user = UserId::new();

        let account = store.create_account(user).await.unwrap();
        assert!(account.balances().iter().all(|(_, a)| a.is_zero()));

        let err = store.create_account(user).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(u) if u == user));
    }

    #[tokio::test]
    async fn commit_bumps_version_and_persists_records() {
        let store = InMemoryAccountStore::new();
        let user = UserId::new();
        store.create_account(user).await.unwrap();

        let committed = store
            .run_atomic(user, &|tx: &mut AccountTx| credit(tx, Currency::Usd, 2_500))
            .await
            .unwrap();

        assert_eq!(committed.account.version(), 1);
        assert_eq!(committed.attempts, 1);
        assert_eq!(committed.records.len(), 1);

        let stored = store.get_account(user).await.unwrap().unwrap();
        assert_eq!(stored.balance(Currency::Usd).minor(), 2_500);
        let history = store
            .query_transactions(user, None, Page::default())
            .await
            .unwrap();
        assert_eq!(history, committed.records);
    }

    #[tokio::test]
    async fn failed_body_leaves_no_trace() {
        let store = InMemoryAccountStore::new();
        let user = UserId::new();
        store.create_account(user).await.unwrap();

        let err = store
            .run_atomic(user, &|tx: &mut AccountTx| {
                credit(tx, Currency::Usd, 1_000)?;
                Err(DomainError::validation("second leg failed"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Rejected(DomainError::Validation(_))));
        let stored = store.get_account(user).await.unwrap().unwrap();
        assert_eq!(stored.version(), 0);
        assert!(stored.balance(Currency::Usd).is_zero());
        assert!(store
            .query_transactions(user, None, Page::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn missing_account_is_not_found() {
        let store = InMemoryAccountStore::new();
        let user = UserId::new();
        let err = store
            .run_atomic(user, &|_tx: &mut AccountTx| Ok(()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(u) if u == user));
    }

    #[tokio::test]
    async fn interleaved_commit_reruns_body_on_fresh_snapshot() {
        let store = InMemoryAccountStore::new();
        let user = UserId::new();
        store.create_account(user).await.unwrap();
        let runs = AtomicU32::new(0);

        let committed = store
            .run_atomic(user, &|tx: &mut AccountTx| {
                if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                    store.interfere(user);
                }
                credit(tx, Currency::Inr, 50_000)
            })
            .await
            .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(committed.attempts, 2);
        // interference took it to 1, this commit to 2
        assert_eq!(committed.account.version(), 2);
        assert_eq!(committed.account.balance(Currency::Inr).minor(), 50_000);
    }

    #[tokio::test]
    async fn persistent_interference_exhausts_attempts() {
        let store = InMemoryAccountStore::with_max_attempts(3);
        let user = UserId::new();
        store.create_account(user).await.unwrap();
        let runs = AtomicU32::new(0);

        let err = store
            .run_atomic(user, &|tx: &mut AccountTx| {
                runs.fetch_add(1, Ordering::SeqCst);
                store.interfere(user);
                credit(tx, Currency::Usd, 100)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Conflict { attempts: 3 }));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let stored = store.get_account(user).await.unwrap().unwrap();
        assert!(stored.balance(Currency::Usd).is_zero());
    }

    #[tokio::test]
    async fn history_is_newest_first_filtered_and_paged() {
        let store = InMemoryAccountStore::new();
        let user = UserId::new();
        store.create_account(user).await.unwrap();

        for minor in [100, 200, 300] {
            store
                .run_atomic(user, &move |tx: &mut AccountTx| credit(tx, Currency::Usd, minor))
                .await
                .unwrap();
        }
        store
            .run_atomic(user, &|tx: &mut AccountTx| credit(tx, Currency::Inr, 999))
            .await
            .unwrap();

        let usd = store
            .query_transactions(user, Some(Currency::Usd), Page::default())
            .await
            .unwrap();
        let amounts: Vec<i64> = usd.iter().map(|r| r.signed_amount.minor()).collect();
        assert_eq!(amounts, vec![300, 200, 100]);

        let second = store
            .query_transactions(user, Some(Currency::Usd), Page::first(2).next())
            .await
            .unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].signed_amount.minor(), 100);

        let all = store
            .query_transactions(user, None, Page::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].currency, Currency::Inr);
    }
}
