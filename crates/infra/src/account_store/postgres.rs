//! Postgres-backed account store.
//!
//! One row per account in `accounts`, one row per record in
//! `transaction_records`. A unit of work is a single database transaction:
//! the balance update is conditional on the version read at the start, and
//! the record inserts ride in the same transaction.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (check violation) | `23514` | `Rejected` | A balance would have gone negative at the database level |
//! | Database (serialization failure) | `40001` | `Retryable` | Concurrent commit; retried internally |
//! | Database (deadlock detected) | `40P01` | `Retryable` | Concurrent commit; retried internally |
//! | Database (other) | Any other | `Unavailable` | Other database errors |
//! | PoolClosed / Io / other | N/A | `Unavailable` | Connection failures |

use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use tracing::instrument;

use async_trait::async_trait;
use vishwam_core::{Amount, AggregateRoot, Currency, DomainError, SignedAmount, TransactionId, UserId};
use vishwam_ledger::{Account, Balances, RecordMetadata, TransactionRecord};

use super::r#trait::{AccountStore, Committed, Page, StoreError, UnitOfWorkBody};
use super::unit_of_work::AccountTx;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        user_id UUID PRIMARY KEY,
        usd_balance BIGINT NOT NULL DEFAULT 0 CHECK (usd_balance >= 0),
        inr_balance BIGINT NOT NULL DEFAULT 0 CHECK (inr_balance >= 0),
        version BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transaction_records (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL REFERENCES accounts (user_id),
        currency TEXT NOT NULL CHECK (currency IN ('USD', 'INR')),
        signed_amount BIGINT NOT NULL CHECK (signed_amount <> 0),
        kind TEXT NOT NULL,
        category TEXT NOT NULL,
        description TEXT NOT NULL,
        method TEXT NOT NULL,
        occurred_at TIMESTAMPTZ NOT NULL,
        metadata JSONB NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS transaction_records_history
        ON transaction_records (user_id, currency, occurred_at DESC, id DESC)
    "#,
];

/// Postgres-backed account store.
///
/// `Send + Sync`; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresAccountStore {
    pool: Arc<PgPool>,
    max_attempts: u32,
}

impl PostgresAccountStore {
    pub fn new(pool: PgPool, max_attempts: u32) -> Self {
        Self {
            pool: Arc::new(pool),
            max_attempts: max_attempts.max(1),
        }
    }

    pub async fn connect(database_url: &str, max_attempts: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, max_attempts))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn insert_account(&self, user_id: UserId) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO accounts (user_id, usd_balance, inr_balance, version, created_at)
            VALUES ($1, 0, 0, 0, NOW())
            ON CONFLICT (user_id) DO NOTHING
            RETURNING user_id, usd_balance, inr_balance, version, created_at
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;

        match row {
            Some(row) => AccountRow::from_row(&row)
                .map_err(|e| StoreError::Corrupt(format!("failed to read account row: {e}")))?
                .into_account(),
            None => Err(StoreError::AlreadyExists(user_id)),
        }
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn load_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, usd_balance, inr_balance, version, created_at
            FROM accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_account", e))?;

        row.map(|row| {
            AccountRow::from_row(&row)
                .map_err(|e| StoreError::Corrupt(format!("failed to read account row: {e}")))?
                .into_account()
        })
        .transpose()
    }

    /// Run `body` inside a database transaction, retrying on version conflicts.
    #[instrument(skip(self, body), fields(user_id = %user_id, attempts = tracing::field::Empty))]
    pub async fn commit_unit_of_work(
        &self,
        user_id: UserId,
        body: UnitOfWorkBody<'_>,
    ) -> Result<Committed, StoreError> {
        for attempt in 1..=self.max_attempts {
            match self.attempt_once(user_id, body, attempt).await {
                Ok(Some(committed)) => {
                    tracing::Span::current().record("attempts", attempt);
                    return Ok(committed);
                }
                Ok(None) => {
                    tracing::debug!(attempt, "account version moved during unit of work; retrying");
                }
                Err(StoreError::Retryable(msg)) => {
                    tracing::debug!(attempt, error = %msg, "transient conflict; retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(attempts = self.max_attempts, "commit conflict persisted");
        Err(StoreError::Conflict {
            attempts: self.max_attempts,
        })
    }

    async fn attempt_once(
        &self,
        user_id: UserId,
        body: UnitOfWorkBody<'_>,
        attempt: u32,
    ) -> Result<Option<Committed>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let row = sqlx::query(
            r#"
            SELECT user_id, usd_balance, inr_balance, version, created_at
            FROM accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("read_snapshot", e))?;

        let Some(row) = row else {
            rollback(tx).await;
            return Err(StoreError::NotFound(user_id));
        };
        let snapshot = AccountRow::from_row(&row)
            .map_err(|e| StoreError::Corrupt(format!("failed to read account row: {e}")))?
            .into_account()?;

        let mut uow = AccountTx::begin(snapshot);
        if let Err(e) = body(&mut uow) {
            rollback(tx).await;
            return Err(StoreError::Rejected(e));
        }

        let expected = uow.expected_version();
        let pending = uow.finish(Utc::now());
        let balances = pending.account.balances();

        let updated = sqlx::query(
            r#"
            UPDATE accounts
            SET usd_balance = $2, inr_balance = $3, version = $4
            WHERE user_id = $1 AND version = $5
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(balances.get(Currency::Usd).minor())
        .bind(balances.get(Currency::Inr).minor())
        .bind(to_db_version(pending.account.version())?)
        .bind(to_db_version(expected.get())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("update_account", e))?
        .rows_affected();

        if updated == 0 {
            rollback(tx).await;
            return Ok(None);
        }

        for record in &pending.records {
            insert_record(&mut tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))?;

        Ok(Some(Committed {
            account: pending.account,
            records: pending.records,
            attempts: attempt,
        }))
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn load_records(
        &self,
        user_id: UserId,
        currency: Option<Currency>,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        if self.load_account(user_id).await?.is_none() {
            return Err(StoreError::NotFound(user_id));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, user_id, currency, signed_amount, kind, category,
                   description, method, occurred_at, metadata
            FROM transaction_records
            WHERE user_id = $1 AND ($2::TEXT IS NULL OR currency = $2)
            ORDER BY occurred_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(currency.map(|c| c.code()))
        .bind(i64::from(page.limit.min(Page::MAX_LIMIT)))
        .bind(i64::from(page.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_records", e))?;

        rows.iter()
            .map(|row| {
                RecordRow::from_row(row)
                    .map_err(|e| StoreError::Corrupt(format!("failed to read record row: {e}")))?
                    .into_record()
            })
            .collect()
    }
}

#[async_trait]
impl AccountStore for PostgresAccountStore {
    async fn create_account(&self, user_id: UserId) -> Result<Account, StoreError> {
        self.insert_account(user_id).await
    }

    async fn get_account(&self, user_id: UserId) -> Result<Option<Account>, StoreError> {
        self.load_account(user_id).await
    }

    async fn run_atomic(
        &self,
        user_id: UserId,
        body: UnitOfWorkBody<'_>,
    ) -> Result<Committed, StoreError> {
        self.commit_unit_of_work(user_id, body).await
    }

    async fn query_transactions(
        &self,
        user_id: UserId,
        currency: Option<Currency>,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.load_records(user_id, currency, page).await
    }
}

async fn insert_record(
    tx: &mut Transaction<'_, Postgres>,
    record: &TransactionRecord,
) -> Result<(), StoreError> {
    let metadata = serde_json::to_value(&record.metadata)
        .map_err(|e| StoreError::Corrupt(format!("failed to serialize metadata: {e}")))?;

    sqlx::query(
        r#"
        INSERT INTO transaction_records
            (id, user_id, currency, signed_amount, kind, category,
             description, method, occurred_at, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.user_id.as_uuid())
    .bind(record.currency.code())
    .bind(record.signed_amount.minor())
    .bind(label(&record.kind)?)
    .bind(label(&record.category)?)
    .bind(&record.description)
    .bind(label(&record.method)?)
    .bind(record.timestamp)
    .bind(metadata)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_record", e))?;

    Ok(())
}

async fn rollback(tx: Transaction<'_, Postgres>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}

fn to_db_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| StoreError::Corrupt(format!("version {version} out of range")))
}

/// Text label of a unit enum, as serde writes it.
fn label<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(StoreError::Corrupt(format!("expected a text label, got {other}"))),
        Err(e) => Err(StoreError::Corrupt(e.to_string())),
    }
}

fn from_label<T: DeserializeOwned>(raw: String) -> Result<T, StoreError> {
    serde_json::from_value(serde_json::Value::String(raw))
        .map_err(|e| StoreError::Corrupt(format!("unknown label: {e}")))
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23514") => StoreError::Rejected(DomainError::invariant(msg)),
                Some("40001") | Some("40P01") => StoreError::Retryable(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Unavailable(format!("connection pool closed during {}", operation))
        }
        other => StoreError::Unavailable(format!("{} failed: {}", operation, other)),
    }
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    user_id: uuid::Uuid,
    usd_balance: i64,
    inr_balance: i64,
    version: i64,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AccountRow {
            user_id: row.try_get("user_id")?,
            usd_balance: row.try_get("usd_balance")?,
            inr_balance: row.try_get("inr_balance")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl AccountRow {
    fn into_account(self) -> Result<Account, StoreError> {
        let corrupt = |e: DomainError| StoreError::Corrupt(e.to_string());
        let balances = Balances::new(
            Amount::from_minor(self.usd_balance).map_err(corrupt)?,
            Amount::from_minor(self.inr_balance).map_err(corrupt)?,
        );
        let version = u64::try_from(self.version)
            .map_err(|_| StoreError::Corrupt(format!("negative version {}", self.version)))?;
        Ok(Account::restore(
            UserId::from_uuid(self.user_id),
            balances,
            version,
            self.created_at,
        ))
    }
}

#[derive(Debug)]
struct RecordRow {
    id: uuid::Uuid,
    user_id: uuid::Uuid,
    currency: String,
    signed_amount: i64,
    kind: String,
    category: String,
    description: String,
    method: String,
    occurred_at: DateTime<Utc>,
    metadata: serde_json::Value,
}

impl<'r> FromRow<'r, PgRow> for RecordRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(RecordRow {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            currency: row.try_get("currency")?,
            signed_amount: row.try_get("signed_amount")?,
            kind: row.try_get("kind")?,
            category: row.try_get("category")?,
            description: row.try_get("description")?,
            method: row.try_get("method")?,
            occurred_at: row.try_get("occurred_at")?,
            metadata: row.try_get("metadata")?,
        })
    }
}

impl RecordRow {
    fn into_record(self) -> Result<TransactionRecord, StoreError> {
        let currency: Currency = self
            .currency
            .parse()
            .map_err(|e: DomainError| StoreError::Corrupt(e.to_string()))?;
        let metadata: RecordMetadata = serde_json::from_value(self.metadata)
            .map_err(|e| StoreError::Corrupt(format!("failed to deserialize metadata: {e}")))?;

        Ok(TransactionRecord {
            id: TransactionId::from_uuid(self.id),
            user_id: UserId::from_uuid(self.user_id),
            currency,
            signed_amount: SignedAmount::from_minor(self.signed_amount),
            kind: from_label(self.kind)?,
            category: from_label(self.category)?,
            description: self.description,
            method: from_label(self.method)?,
            timestamp: self.occurred_at,
            metadata,
        })
    }
}
