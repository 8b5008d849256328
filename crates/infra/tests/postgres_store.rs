//! Postgres account store tests.
//!
//! Need a reachable database:
//! `DATABASE_URL=postgres://... cargo test -p vishwam-infra -- --ignored`

use std::sync::Arc;

use vishwam_core::{AggregateRoot, Currency, SignedAmount, UserId};
use vishwam_events::{EventEnvelope, InMemoryEventBus};
use vishwam_infra::{
    AccountStore, LedgerError, LedgerService, Page, PostgresAccountStore, StoreError,
};
use vishwam_ledger::{Beneficiary, Category, LedgerNotification, RecordMetadata, RecordTransaction, TransactionType};

type Bus = InMemoryEventBus<EventEnvelope<LedgerNotification>>;

async fn store() -> Arc<PostgresAccountStore> {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for postgres tests");
    let store = PostgresAccountStore::connect(&url, 5).await.unwrap();
    store.ensure_schema().await.unwrap();
    Arc::new(store)
}

fn money(raw: &str) -> SignedAmount {
    raw.parse().unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn account_lifecycle_round_trips_through_postgres() {
    let store = store().await;
    let service = LedgerService::new(store.clone(), Arc::new(Bus::new()));
    let user = UserId::new();

    service.open_account(user).await.unwrap();
    assert!(matches!(
        store.create_account(user).await,
        Err(StoreError::AlreadyExists(_))
    ));

    service
        .record_transaction(RecordTransaction::new(
            user,
            money("200.00"),
            Currency::Usd,
            TransactionType::Deposit,
            "Salary",
        ))
        .await
        .unwrap();
    service
        .record_transaction(
            RecordTransaction::new(user, money("12.50"), Currency::Usd, TransactionType::Spend, "Lunch")
                .with_metadata(RecordMetadata::categorized(Category::Food)),
        )
        .await
        .unwrap();

    let account = store.get_account(user).await.unwrap().unwrap();
    assert_eq!(account.version(), 2);
    assert_eq!(account.balance(Currency::Usd).to_string(), "187.50");

    let records = store
        .query_transactions(user, Some(Currency::Usd), Page::default())
        .await
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].description, "Lunch");
    assert_eq!(records[0].category, Category::Food);
    assert_eq!(records[0].metadata, RecordMetadata::categorized(Category::Food));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn overdraft_and_remittance_are_atomic_in_postgres() {
    let store = store().await;
    let service = LedgerService::new(store.clone(), Arc::new(Bus::new()));
    let user = UserId::new();
    service.open_account(user).await.unwrap();
    service
        .record_transaction(RecordTransaction::new(
            user,
            money("50.00"),
            Currency::Usd,
            TransactionType::Deposit,
            "Top up",
        ))
        .await
        .unwrap();

    let err = service
        .record_transaction(RecordTransaction::new(
            user,
            money("75.00"),
            Currency::Usd,
            TransactionType::Withdrawal,
            "ATM",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));

    let quote = service
        .quote(Currency::Usd, Currency::Inr, money("40.00"))
        .unwrap();
    let committed = service
        .remit_with_quote(user, &quote, "Family", Beneficiary::named("Asha"))
        .await
        .unwrap();
    assert_eq!(committed.records.len(), 2);

    let reconciliation = service.queries().reconcile(user).await.unwrap();
    assert!(reconciliation.is_balanced(), "{reconciliation:?}");
    assert_eq!(
        store.get_account(user).await.unwrap().unwrap().balance(Currency::Usd).to_string(),
        "10.00"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_withdrawals_serialize_in_postgres() {
    let store = store().await;
    let service = Arc::new(LedgerService::new(store.clone(), Arc::new(Bus::new())));
    let user = UserId::new();
    service.open_account(user).await.unwrap();
    service
        .record_transaction(RecordTransaction::new(
            user,
            money("100.00"),
            Currency::Usd,
            TransactionType::Deposit,
            "Top up",
        ))
        .await
        .unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = service.clone();
            tokio::spawn(async move {
                service
                    .record_transaction(RecordTransaction::new(
                        user,
                        money("60.00"),
                        Currency::Usd,
                        TransactionType::Withdrawal,
                        "ATM",
                    ))
                    .await
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LedgerError::InsufficientFunds { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(succeeded, 1);
    let account = store.get_account(user).await.unwrap().unwrap();
    assert_eq!(account.balance(Currency::Usd).to_string(), "40.00");
}
