use std::sync::Arc;

use vishwam_core::{AggregateRoot, Amount, Currency, SignedAmount, UserId};
use vishwam_events::{EventBus, EventEnvelope, Subscription};
use vishwam_infra::{AccountStore, Committed, LedgerError, LedgerService, Page};
use vishwam_ledger::{
    Account, Balances, Beneficiary, Category, FxQuote, LedgerNotification, RecordMetadata,
    RecordTransaction, TransactionRecord, TransactionType,
};

const RECENT_LIMIT: usize = 20;
const LOAD_ATTEMPTS: u32 = 3;

/// What the UI renders: balances and the most recent records, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub balances: Balances,
    pub version: u64,
    pub recent: Vec<TransactionRecord>,
}

impl AccountSnapshot {
    /// Apply a newer account state. Returns `false` for stale or duplicate versions.
    fn absorb(&mut self, version: u64, balances: Balances, records: &[TransactionRecord]) -> bool {
        if version <= self.version {
            return false;
        }
        self.version = version;
        self.balances = balances;
        for record in records {
            self.recent.insert(0, record.clone());
        }
        self.recent.truncate(RECENT_LIMIT);
        true
    }
}

/// A signed-in user's view of their account.
///
/// Mutations go through the shared `LedgerService`; the snapshot follows
/// the store through pushed notifications, including changes made by other
/// sessions of the same user.
pub struct Session<S, B> {
    user_id: UserId,
    ledger: Arc<LedgerService<S, B>>,
    updates: Subscription<EventEnvelope<LedgerNotification>>,
    snapshot: AccountSnapshot,
    missed_updates: bool,
}

impl<S, B> Session<S, B>
where
    S: AccountStore + Clone,
    B: EventBus<EventEnvelope<LedgerNotification>>,
{
    /// Attach to an existing account.
    pub async fn start(user_id: UserId, ledger: Arc<LedgerService<S, B>>) -> Result<Self, LedgerError> {
        // Subscribe before reading so nothing committed in between is lost.
        let updates = ledger.bus().subscribe();
        let snapshot = load_snapshot(&ledger, user_id).await?;
        tracing::debug!(%user_id, version = snapshot.version, "session started");

        Ok(Self {
            user_id,
            ledger,
            updates,
            snapshot,
            missed_updates: false,
        })
    }

    /// Open a fresh account, then attach to it.
    pub async fn sign_up(user_id: UserId, ledger: Arc<LedgerService<S, B>>) -> Result<Self, LedgerError> {
        ledger.open_account(user_id).await?;
        Self::start(user_id, ledger).await
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn snapshot(&self) -> &AccountSnapshot {
        &self.snapshot
    }

    pub fn balance(&self, currency: Currency) -> Amount {
        self.snapshot.balances.get(currency)
    }

    /// Whether a version gap was seen; `refresh` reloads the recent list.
    pub fn has_missed_updates(&self) -> bool {
        self.missed_updates
    }

    /// Apply queued notifications for this user. Returns how many advanced the snapshot.
    pub fn poll_updates(&mut self) -> usize {
        let mut applied = 0;
        for envelope in self.updates.drain() {
            if envelope.user_id() != self.user_id {
                continue;
            }
            if envelope.sequence_number() > self.snapshot.version + 1 {
                self.missed_updates = true;
            }
            let (balances, records) = match envelope.payload() {
                LedgerNotification::AccountOpened { balances, .. } => (*balances, &[][..]),
                LedgerNotification::BalanceChanged(changed) => (changed.balances, &changed.records[..]),
            };
            if self.snapshot.absorb(envelope.sequence_number(), balances, records) {
                applied += 1;
            }
        }
        applied
    }

    /// Reload balances and recent history from the store.
    pub async fn refresh(&mut self) -> Result<(), LedgerError> {
        self.snapshot = load_snapshot(&self.ledger, self.user_id).await?;
        self.missed_updates = false;
        Ok(())
    }

    pub async fn deposit(
        &mut self,
        currency: Currency,
        amount: SignedAmount,
        description: &str,
    ) -> Result<Committed, LedgerError> {
        self.record(RecordTransaction::new(
            self.user_id,
            amount,
            currency,
            TransactionType::Deposit,
            description,
        ))
        .await
    }

    pub async fn withdraw(
        &mut self,
        currency: Currency,
        amount: SignedAmount,
        description: &str,
    ) -> Result<Committed, LedgerError> {
        self.record(RecordTransaction::new(
            self.user_id,
            amount,
            currency,
            TransactionType::Withdrawal,
            description,
        ))
        .await
    }

    pub async fn spend(
        &mut self,
        currency: Currency,
        amount: SignedAmount,
        merchant: &str,
        category: Category,
    ) -> Result<Committed, LedgerError> {
        self.record(
            RecordTransaction::new(self.user_id, amount, currency, TransactionType::Spend, merchant)
                .with_metadata(RecordMetadata::categorized(category)),
        )
        .await
    }

    pub async fn pay_bill(
        &mut self,
        currency: Currency,
        amount: SignedAmount,
        biller: &str,
        consumer_number: &str,
    ) -> Result<Committed, LedgerError> {
        self.record(
            RecordTransaction::new(
                self.user_id,
                amount,
                currency,
                TransactionType::BillPay,
                format!("{biller} bill"),
            )
            .with_metadata(RecordMetadata::BillPayment {
                biller: biller.to_string(),
                consumer_number: consumer_number.to_string(),
                category: Some(Category::Bills),
                method: None,
            }),
        )
        .await
    }

    pub async fn receive_income(
        &mut self,
        currency: Currency,
        amount: SignedAmount,
        source: &str,
    ) -> Result<Committed, LedgerError> {
        self.record(RecordTransaction::new(
            self.user_id,
            amount,
            currency,
            TransactionType::Income,
            source,
        ))
        .await
    }

    /// USD → INR quote for a remittance.
    pub fn quote_remittance(&self, amount: SignedAmount) -> Result<FxQuote, LedgerError> {
        self.ledger.quote(Currency::Usd, Currency::Inr, amount)
    }

    pub async fn send_remittance(
        &mut self,
        quote: &FxQuote,
        beneficiary: Beneficiary,
    ) -> Result<Committed, LedgerError> {
        let description = format!("Remittance to {}", beneficiary.name);
        let committed = self
            .ledger
            .remit_with_quote(self.user_id, quote, description, beneficiary)
            .await?;
        self.absorb(&committed);
        Ok(committed)
    }

    pub async fn history(
        &self,
        currency: Option<Currency>,
        page: Page,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        self.ledger.queries().history(self.user_id, currency, page).await
    }

    async fn record(&mut self, request: RecordTransaction) -> Result<Committed, LedgerError> {
        let committed = self.ledger.record_transaction(request).await?;
        self.absorb(&committed);
        Ok(committed)
    }

    /// Apply our own commit without waiting for its notification.
    fn absorb(&mut self, committed: &Committed) {
        if committed.account.version() > self.snapshot.version + 1 {
            self.missed_updates = true;
        }
        self.snapshot.absorb(
            committed.account.version(),
            committed.account.balances(),
            &committed.records,
        );
    }
}

async fn load_snapshot<S, B>(
    ledger: &LedgerService<S, B>,
    user_id: UserId,
) -> Result<AccountSnapshot, LedgerError>
where
    S: AccountStore + Clone,
{
    // Account and history are separate reads; only keep a pair taken at one version.
    let queries = ledger.queries();
    for _ in 0..LOAD_ATTEMPTS {
        let account = load_account(ledger, user_id).await?;
        let recent = queries
            .history(user_id, None, Page::first(RECENT_LIMIT as u32))
            .await?;
        let current = load_account(ledger, user_id).await?;

        if current.version() == account.version() {
            return Ok(AccountSnapshot {
                balances: account.balances(),
                version: account.version(),
                recent,
            });
        }
        tracing::debug!(%user_id, "account changed while loading snapshot; retrying");
    }
    Err(LedgerError::Aborted(format!(
        "account {user_id} kept changing while loading"
    )))
}

async fn load_account<S, B>(ledger: &LedgerService<S, B>, user_id: UserId) -> Result<Account, LedgerError>
where
    S: AccountStore,
{
    ledger
        .store()
        .get_account(user_id)
        .await?
        .ok_or_else(|| LedgerError::NotFound(format!("account {user_id}")))
}
