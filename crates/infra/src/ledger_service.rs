//! Ledger mutation pipeline (application-level orchestration).
//!
//! ```text
//! Request
//!   ↓
//! 1. Validate input (no storage access)
//!   ↓
//! 2. run_atomic: snapshot account → Account::handle → stage events
//!   ↓
//! 3. Commit (balances + records together, or nothing)
//!   ↓
//! 4. Publish BalanceChanged to the bus (best-effort)
//! ```
//!
//! The decision logic lives in `vishwam_ledger`; this module only composes
//! the `AccountStore` and `EventBus` around it.

use chrono::Utc;
use tracing::instrument;

use vishwam_core::{Aggregate, AggregateRoot, Amount, Currency, DomainError, SignedAmount, UserId};
use vishwam_events::{EventBus, EventEnvelope};
use vishwam_ledger::{
    Account, BalanceChanged, Beneficiary, CrossBorderTransfer, FxQuote, FxQuoter, LedgerCommand,
    LedgerNotification, RecordTransaction,
};

use crate::account_store::{AccountStore, AccountTx, Committed};
use crate::error::LedgerError;
use crate::queries::AccountQueries;

/// Executes ledger mutations against an account store.
///
/// ## Execution guarantees
///
/// - Balances never go negative; a failing check aborts with no effect
/// - A cross-border transfer writes both legs or neither
/// - Notifications go out only after the commit
///
/// Requests are **not** idempotent: submitting the same request twice
/// applies it twice.
#[derive(Debug)]
pub struct LedgerService<S, B> {
    store: S,
    bus: B,
    quoter: FxQuoter,
}

impl<S, B> LedgerService<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            quoter: FxQuoter::default(),
        }
    }

    pub fn with_quoter(mut self, quoter: FxQuoter) -> Self {
        self.quoter = quoter;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn quoter(&self) -> &FxQuoter {
        &self.quoter
    }

    /// Read side over the same store.
    pub fn queries(&self) -> AccountQueries<S>
    where
        S: AccountStore + Clone,
    {
        AccountQueries::new(self.store.clone())
    }
}

impl<S, B> LedgerService<S, B>
where
    S: AccountStore,
    B: EventBus<EventEnvelope<LedgerNotification>>,
{
    /// Sign-up: create the account with zero balances.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn open_account(&self, user_id: UserId) -> Result<Account, LedgerError> {
        let account = self.store.create_account(user_id).await?;
        tracing::info!("account opened");

        let notification = LedgerNotification::AccountOpened {
            user_id,
            balances: account.balances(),
            occurred_at: account.created_at(),
        };
        self.publish(EventEnvelope::wrap(user_id, account.version(), notification));
        Ok(account)
    }

    /// Apply a single-currency mutation (deposit, withdrawal, spend, bill payment, ...).
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            kind = ?request.kind,
            currency = %request.currency,
            amount = %request.amount
        )
    )]
    pub async fn record_transaction(
        &self,
        request: RecordTransaction,
    ) -> Result<Committed, LedgerError> {
        self.execute(LedgerCommand::Record(request)).await
    }

    /// Debit one currency wallet and credit another in one unit of work.
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            from = %request.from,
            to = %request.to,
            amount_in = %request.amount_in,
            amount_out = %request.amount_out
        )
    )]
    pub async fn record_cross_border_transaction(
        &self,
        request: CrossBorderTransfer,
    ) -> Result<Committed, LedgerError> {
        self.execute(LedgerCommand::CrossBorder(request)).await
    }

    /// Price a conversion. Pure: nothing is stored.
    pub fn quote(
        &self,
        from: Currency,
        to: Currency,
        amount_in: SignedAmount,
    ) -> Result<FxQuote, LedgerError> {
        let amount_in: Amount = amount_in
            .to_amount()
            .filter(|a| a.is_positive())
            .ok_or_else(|| DomainError::validation("amount must be positive"))?;
        Ok(self.quoter.quote(from, to, amount_in, Utc::now())?)
    }

    /// Execute a remittance at the terms of an earlier quote.
    ///
    /// Quote expiry is advisory: an expired quote is logged and still honoured.
    #[instrument(skip(self, quote, description, beneficiary), fields(user_id = %user_id, quote_id = %quote.id))]
    pub async fn remit_with_quote(
        &self,
        user_id: UserId,
        quote: &FxQuote,
        description: impl Into<String>,
        beneficiary: Beneficiary,
    ) -> Result<Committed, LedgerError> {
        if quote.is_expired(Utc::now()) {
            tracing::warn!(expires_at = %quote.expires_at, "executing remittance on an expired quote");
        }

        self.execute(LedgerCommand::CrossBorder(CrossBorderTransfer {
            user_id,
            from: quote.from,
            to: quote.to,
            amount_in: quote.amount_in.credit(),
            amount_out: quote.amount_out.credit(),
            rate: quote.rate,
            fees: quote.fee.credit(),
            description: description.into(),
            beneficiary,
        }))
        .await
    }

    async fn execute(&self, command: LedgerCommand) -> Result<Committed, LedgerError> {
        // 1) Stateless checks; a bad request never reaches the store.
        if let Err(e) = command.validate() {
            tracing::warn!(error = %e, "request rejected");
            return Err(e.into());
        }

        // 2-3) Decide and stage inside the unit of work.
        let user_id = command.user_id();
        let body = |tx: &mut AccountTx| -> Result<(), DomainError> {
            let events = tx.account().handle(&command)?;
            for event in &events {
                tx.post(event)?;
            }
            Ok(())
        };

        let committed = match self.store.run_atomic(user_id, &body).await {
            Ok(committed) => committed,
            Err(e) => {
                let err = LedgerError::from(e);
                match &err {
                    LedgerError::Aborted(msg) => tracing::error!(error = %msg, "unit of work aborted"),
                    other => tracing::warn!(error = %other, "mutation refused"),
                }
                return Err(err);
            }
        };

        tracing::info!(
            version = committed.account.version(),
            records = committed.records.len(),
            attempts = committed.attempts,
            "mutation committed"
        );

        // 4) Publish after commit.
        let notification = LedgerNotification::BalanceChanged(BalanceChanged {
            user_id,
            balances: committed.account.balances(),
            version: committed.account.version(),
            records: committed.records.clone(),
            occurred_at: Utc::now(),
        });
        self.publish(EventEnvelope::wrap(
            user_id,
            committed.account.version(),
            notification,
        ));

        Ok(committed)
    }

    /// The commit already happened; a lost notification is only logged.
    fn publish(&self, envelope: EventEnvelope<LedgerNotification>) {
        let event_id = envelope.event_id();
        if let Err(e) = self.bus.publish(envelope) {
            tracing::warn!(%event_id, error = ?e, "failed to publish ledger notification");
        }
    }
}
