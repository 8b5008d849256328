use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;

use vishwam_core::{Currency, SignedAmount, UserId};
use vishwam_events::{EventEnvelope, InMemoryEventBus};
use vishwam_infra::{InMemoryAccountStore, LedgerService, Page, AccountStore};
use vishwam_ledger::{Beneficiary, LedgerNotification, RecordTransaction, TransactionType};

type Bus = InMemoryEventBus<EventEnvelope<LedgerNotification>>;
type Service = LedgerService<Arc<InMemoryAccountStore>, Arc<Bus>>;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("tokio runtime")
}

fn service() -> Service {
    LedgerService::new(Arc::new(InMemoryAccountStore::new()), Arc::new(Bus::new()))
}

fn deposit(user: UserId, minor: i64) -> RecordTransaction {
    RecordTransaction::new(
        user,
        SignedAmount::from_minor(minor),
        Currency::Usd,
        TransactionType::Deposit,
        "bench",
    )
}

fn bench_record_transaction(c: &mut Criterion) {
    let rt = runtime();
    let service = service();
    let user = UserId::new();
    rt.block_on(service.open_account(user)).expect("open");

    c.bench_function("record_transaction/deposit", |b| {
        b.iter(|| {
            rt.block_on(service.record_transaction(black_box(deposit(user, 100))))
                .expect("deposit")
        })
    });
}

fn bench_cross_border(c: &mut Criterion) {
    let rt = runtime();
    let service = service();
    let user = UserId::new();
    rt.block_on(service.open_account(user)).expect("open");
    rt.block_on(service.record_transaction(deposit(user, i64::MAX / 4)))
        .expect("fund");
    let quote = service
        .quote(Currency::Usd, Currency::Inr, SignedAmount::from_minor(10_000))
        .expect("quote");

    c.bench_function("remit_with_quote", |b| {
        b.iter(|| {
            rt.block_on(service.remit_with_quote(
                user,
                black_box(&quote),
                "bench",
                Beneficiary::named("Self"),
            ))
            .expect("remit")
        })
    });
}

fn bench_history(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("query_transactions");

    for records in [100usize, 1_000, 10_000] {
        let service = service();
        let user = UserId::new();
        rt.block_on(async {
            service.open_account(user).await.expect("open");
            for _ in 0..records {
                service
                    .record_transaction(deposit(user, 1))
                    .await
                    .expect("deposit");
            }
        });

        group.throughput(Throughput::Elements(50));
        group.bench_with_input(BenchmarkId::from_parameter(records), &records, |b, _| {
            b.iter(|| {
                rt.block_on(service.store().query_transactions(
                    user,
                    Some(Currency::Usd),
                    Page::default(),
                ))
                .expect("history")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_record_transaction, bench_cross_border, bench_history);
criterion_main!(benches);
