//! Wiring: pick a store backend from config and assemble the ledger.

use std::sync::Arc;

use anyhow::Context;

use vishwam_events::{EventEnvelope, InMemoryEventBus};
use vishwam_infra::{
    AccountStore, InMemoryAccountStore, LedgerConfig, LedgerService, PostgresAccountStore,
    StoreBackend,
};
use vishwam_ledger::LedgerNotification;

pub type NotificationBus = InMemoryEventBus<EventEnvelope<LedgerNotification>>;

/// Ledger over a backend chosen at runtime.
pub type AppLedger = LedgerService<Arc<dyn AccountStore>, Arc<NotificationBus>>;

/// Process entry point: logging, config from the environment, services.
pub async fn bootstrap() -> anyhow::Result<Arc<AppLedger>> {
    vishwam_observability::init();
    let config = LedgerConfig::from_env().context("invalid ledger configuration")?;
    build_ledger(&config).await
}

pub async fn build_ledger(config: &LedgerConfig) -> anyhow::Result<Arc<AppLedger>> {
    let store: Arc<dyn AccountStore> = match &config.store {
        StoreBackend::Memory => {
            tracing::info!("using in-memory account store");
            Arc::new(InMemoryAccountStore::with_max_attempts(
                config.max_commit_attempts,
            ))
        }
        StoreBackend::Postgres { database_url } => {
            tracing::info!("using postgres account store");
            let store = PostgresAccountStore::connect(database_url, config.max_commit_attempts)
                .await
                .context("failed to connect to postgres")?;
            store
                .ensure_schema()
                .await
                .context("failed to prepare ledger schema")?;
            Arc::new(store)
        }
    };

    let bus = Arc::new(NotificationBus::new());
    Ok(Arc::new(
        LedgerService::new(store, bus).with_quoter(config.quoter()),
    ))
}
