//! Ledger commands and the pure decision logic behind them.

use serde::{Deserialize, Serialize};

use vishwam_core::{
    Aggregate, AggregateRoot, Amount, Currency, DomainError, DomainResult, Rate, SignedAmount,
    UserId,
};

use crate::account::Account;
use crate::record::{
    Beneficiary, Category, PaymentRail, RecordDraft, RecordMetadata, TransactionType,
};

/// Sender label on the credit leg of a remittance into the user's own wallet.
pub const SELF_SENDER: &str = "Self";

/// Command: record a single-currency deposit, withdrawal, spend, etc.
///
/// `amount` is the caller's decimal input; it must be strictly positive. The
/// sign of the resulting record comes from `kind`, never from the input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub user_id: UserId,
    pub amount: SignedAmount,
    pub currency: Currency,
    pub kind: TransactionType,
    pub description: String,
    pub metadata: Option<RecordMetadata>,
}

impl RecordTransaction {
    pub fn new(
        user_id: UserId,
        amount: SignedAmount,
        currency: Currency,
        kind: TransactionType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            amount,
            currency,
            kind,
            description: description.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: RecordMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Input checks that need no account state.
    pub fn validate(&self) -> DomainResult<Amount> {
        let amount = positive(self.amount, "amount")?;
        if let Some(metadata) = &self.metadata {
            if !metadata.accepts(self.kind) {
                return Err(DomainError::validation(format!(
                    "metadata does not apply to {:?} transactions",
                    self.kind
                )));
            }
        }
        Ok(amount)
    }
}

/// Command: move value between the user's own currency wallets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossBorderTransfer {
    pub user_id: UserId,
    pub from: Currency,
    pub to: Currency,
    pub amount_in: SignedAmount,
    pub amount_out: SignedAmount,
    pub rate: Rate,
    pub fees: SignedAmount,
    pub description: String,
    pub beneficiary: Beneficiary,
}

/// Validated amounts of a cross-border transfer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransferAmounts {
    pub amount_in: Amount,
    pub amount_out: Amount,
    pub fees: Amount,
}

impl CrossBorderTransfer {
    pub fn validate(&self) -> DomainResult<TransferAmounts> {
        if self.from == self.to {
            return Err(DomainError::validation(format!(
                "cross-border transfer needs two different currencies (got {} -> {})",
                self.from, self.to
            )));
        }
        let fees = self
            .fees
            .to_amount()
            .ok_or_else(|| DomainError::validation("fees must not be negative"))?;
        Ok(TransferAmounts {
            amount_in: positive(self.amount_in, "amount_in")?,
            amount_out: positive(self.amount_out, "amount_out")?,
            fees,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Record(RecordTransaction),
    CrossBorder(CrossBorderTransfer),
}

impl LedgerCommand {
    pub fn user_id(&self) -> UserId {
        match self {
            LedgerCommand::Record(cmd) => cmd.user_id,
            LedgerCommand::CrossBorder(cmd) => cmd.user_id,
        }
    }

    /// Stateless validation; run before any storage access.
    pub fn validate(&self) -> DomainResult<()> {
        match self {
            LedgerCommand::Record(cmd) => cmd.validate().map(|_| ()),
            LedgerCommand::CrossBorder(cmd) => cmd.validate().map(|_| ()),
        }
    }
}

/// Event: one record posted, with the balance it leaves behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPosted {
    pub record: RecordDraft,
    pub balance_after: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    EntryPosted(EntryPosted),
}

impl Aggregate for Account {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::EntryPosted(e) => self.set_balance(e.record.currency, e.balance_after),
        }
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.user_id() != *self.id() {
            return Err(DomainError::invariant("command targets a different account"));
        }
        match command {
            LedgerCommand::Record(cmd) => self.handle_record(cmd),
            LedgerCommand::CrossBorder(cmd) => self.handle_cross_border(cmd),
        }
    }
}

impl Account {
    fn handle_record(&self, cmd: &RecordTransaction) -> DomainResult<Vec<LedgerEvent>> {
        let amount = cmd.validate()?;
        let current = self.balance(cmd.currency);
        let signed = cmd.kind.signed(amount);

        let balance_after = current
            .offset_by(signed)?
            .to_amount()
            .ok_or_else(|| DomainError::insufficient_funds(cmd.currency, current, amount))?;

        let metadata = cmd.metadata.clone().unwrap_or_default();
        let category = if cmd.kind == TransactionType::Deposit {
            Category::Income
        } else {
            metadata.category().unwrap_or(Category::General)
        };
        let method = metadata.method().unwrap_or(cmd.kind.default_rail());

        Ok(vec![LedgerEvent::EntryPosted(EntryPosted {
            record: RecordDraft {
                user_id: cmd.user_id,
                currency: cmd.currency,
                signed_amount: signed,
                kind: cmd.kind,
                category,
                description: cmd.description.clone(),
                method,
                metadata,
            },
            balance_after,
        })])
    }

    fn handle_cross_border(&self, cmd: &CrossBorderTransfer) -> DomainResult<Vec<LedgerEvent>> {
        let TransferAmounts {
            amount_in,
            amount_out,
            fees,
        } = cmd.validate()?;

        let source = self.balance(cmd.from);
        let source_after = source
            .checked_sub(amount_in)
            .ok_or_else(|| DomainError::insufficient_funds(cmd.from, source, amount_in))?;
        let dest_after = self.balance(cmd.to).checked_add(amount_out)?;

        let debit = RecordDraft {
            user_id: cmd.user_id,
            currency: cmd.from,
            signed_amount: amount_in.debit(),
            kind: TransactionType::Remittance,
            category: Category::Transfer,
            description: cmd.description.clone(),
            method: PaymentRail::Swift,
            metadata: RecordMetadata::Remittance {
                rate: cmd.rate,
                fees,
                beneficiary: cmd.beneficiary.clone(),
            },
        };
        let credit = RecordDraft {
            user_id: cmd.user_id,
            currency: cmd.to,
            signed_amount: amount_out.credit(),
            kind: TransactionType::Income,
            category: Category::Income,
            description: cmd.description.clone(),
            method: PaymentRail::Swift,
            metadata: RecordMetadata::RemittanceCredit {
                rate: cmd.rate,
                fees,
                sender: SELF_SENDER.to_string(),
            },
        };

        Ok(vec![
            LedgerEvent::EntryPosted(EntryPosted {
                record: debit,
                balance_after: source_after,
            }),
            LedgerEvent::EntryPosted(EntryPosted {
                record: credit,
                balance_after: dest_after,
            }),
        ])
    }
}

fn positive(value: SignedAmount, field: &str) -> DomainResult<Amount> {
    match value.to_amount() {
        Some(amount) if amount.is_positive() => Ok(amount),
        _ => Err(DomainError::validation(format!(
            "{field} must be positive (got {value})"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn money(raw: &str) -> SignedAmount {
        raw.parse().unwrap()
    }

    fn amount(raw: &str) -> Amount {
        raw.parse().unwrap()
    }

    fn account_with(user_id: UserId, usd: &str, inr: &str) -> Account {
        let mut account = Account::open(user_id, Utc::now());
        account.set_balance(Currency::Usd, amount(usd));
        account.set_balance(Currency::Inr, amount(inr));
        account
    }

    fn posted(events: &[LedgerEvent]) -> Vec<&EntryPosted> {
        events
            .iter()
            .map(|e| match e {
                LedgerEvent::EntryPosted(p) => p,
            })
            .collect()
    }

    #[test]
    fn deposit_credits_and_is_categorized_as_income() {
        let user = UserId::new();
        let account = account_with(user, "0", "0");
        let cmd = RecordTransaction::new(
            user,
            money("100.00"),
            Currency::Usd,
            TransactionType::Deposit,
            "Test Deposit",
        )
        .with_metadata(RecordMetadata::categorized(Category::Shopping));

        let events = account.handle(&LedgerCommand::Record(cmd)).unwrap();
        let entries = posted(&events);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.signed_amount, money("100.00"));
        assert_eq!(entries[0].record.category, Category::Income);
        assert_eq!(entries[0].record.method, PaymentRail::BankTransfer);
        assert_eq!(entries[0].balance_after, amount("100.00"));
    }

    #[test]
    fn withdrawal_beyond_balance_is_insufficient_funds() {
        let user = UserId::new();
        let account = account_with(user, "50.00", "0");
        let cmd = RecordTransaction::new(
            user,
            money("75.00"),
            Currency::Usd,
            TransactionType::Withdrawal,
            "ATM",
        );

        let err = account.handle(&LedgerCommand::Record(cmd)).unwrap_err();
        assert_eq!(
            err,
            DomainError::insufficient_funds(Currency::Usd, amount("50.00"), amount("75.00"))
        );
    }

    #[test]
    fn spend_uses_caller_category_or_general() {
        let user = UserId::new();
        let account = account_with(user, "20.00", "0");

        let tagged = RecordTransaction::new(
            user,
            money("5.00"),
            Currency::Usd,
            TransactionType::Spend,
            "Cafe",
        )
        .with_metadata(RecordMetadata::categorized(Category::Food));
        let events = account.handle(&LedgerCommand::Record(tagged)).unwrap();
        assert_eq!(posted(&events)[0].record.category, Category::Food);
        assert_eq!(posted(&events)[0].record.signed_amount, money("-5.00"));

        let untagged = RecordTransaction::new(
            user,
            money("5.00"),
            Currency::Usd,
            TransactionType::Spend,
            "Kiosk",
        );
        let events = account.handle(&LedgerCommand::Record(untagged)).unwrap();
        assert_eq!(posted(&events)[0].record.category, Category::General);
        assert_eq!(posted(&events)[0].record.method, PaymentRail::Card);
    }

    #[test]
    fn non_positive_amounts_are_validation_errors() {
        let user = UserId::new();
        let account = account_with(user, "10.00", "0");
        for raw in ["-5.00", "0"] {
            let cmd = RecordTransaction::new(
                user,
                money(raw),
                Currency::Usd,
                TransactionType::Deposit,
                "bad",
            );
            assert!(matches!(
                account.handle(&LedgerCommand::Record(cmd)),
                Err(DomainError::Validation(_))
            ));
        }
    }

    #[test]
    fn mismatched_metadata_is_rejected() {
        let user = UserId::new();
        let cmd = RecordTransaction::new(
            user,
            money("1.00"),
            Currency::Inr,
            TransactionType::Spend,
            "Electricity",
        )
        .with_metadata(RecordMetadata::BillPayment {
            biller: "BESCOM".into(),
            consumer_number: "99".into(),
            category: None,
            method: None,
        });
        assert!(matches!(cmd.validate(), Err(DomainError::Validation(_))));
    }

    #[test]
    fn cross_border_posts_a_debit_and_a_credit() {
        let user = UserId::new();
        let account = account_with(user, "200.00", "0");
        let cmd = CrossBorderTransfer {
            user_id: user,
            from: Currency::Usd,
            to: Currency::Inr,
            amount_in: money("100.00"),
            amount_out: money("8450.00"),
            rate: "84.50".parse().unwrap(),
            fees: money("1.00"),
            description: "Remit".into(),
            beneficiary: Beneficiary::named("Self"),
        };

        let events = account.handle(&LedgerCommand::CrossBorder(cmd)).unwrap();
        let entries = posted(&events);
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].record.currency, Currency::Usd);
        assert_eq!(entries[0].record.signed_amount, money("-100.00"));
        assert_eq!(entries[0].record.category, Category::Transfer);
        assert_eq!(entries[0].balance_after, amount("100.00"));

        assert_eq!(entries[1].record.currency, Currency::Inr);
        assert_eq!(entries[1].record.signed_amount, money("8450.00"));
        assert_eq!(entries[1].record.category, Category::Income);
        assert_eq!(entries[1].balance_after, amount("8450.00"));
        match &entries[1].record.metadata {
            RecordMetadata::RemittanceCredit { sender, fees, .. } => {
                assert_eq!(sender, SELF_SENDER);
                assert_eq!(*fees, amount("1.00"));
            }
            other => panic!("unexpected credit metadata {other:?}"),
        }
    }

    #[test]
    fn cross_border_requires_two_currencies_and_funds() {
        let user = UserId::new();
        let account = account_with(user, "10.00", "0");
        let mut cmd = CrossBorderTransfer {
            user_id: user,
            from: Currency::Usd,
            to: Currency::Usd,
            amount_in: money("5.00"),
            amount_out: money("5.00"),
            rate: "1".parse().unwrap(),
            fees: money("0"),
            description: "loop".into(),
            beneficiary: Beneficiary::named("Self"),
        };
        assert!(matches!(
            account.handle(&LedgerCommand::CrossBorder(cmd.clone())),
            Err(DomainError::Validation(_))
        ));

        cmd.to = Currency::Inr;
        cmd.amount_in = money("10.01");
        assert!(matches!(
            account.handle(&LedgerCommand::CrossBorder(cmd)),
            Err(DomainError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn command_for_another_user_is_an_invariant_violation() {
        let account = account_with(UserId::new(), "10.00", "0");
        let cmd = RecordTransaction::new(
            UserId::new(),
            money("1.00"),
            Currency::Usd,
            TransactionType::Deposit,
            "x",
        );
        assert!(matches!(
            account.handle(&LedgerCommand::Record(cmd)),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    fn arb_kind() -> impl Strategy<Value = TransactionType> {
        prop_oneof![
            Just(TransactionType::Deposit),
            Just(TransactionType::Withdrawal),
            Just(TransactionType::Spend),
            Just(TransactionType::BillPay),
            Just(TransactionType::Income),
            Just(TransactionType::FxConversion),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of commands is handled and applied,
        /// balances stay non-negative and equal the sum of posted records.
        #[test]
        fn balances_track_posted_records(
            ops in prop::collection::vec((arb_kind(), 1i64..50_000i64, any::<bool>()), 1..40)
        ) {
            let user = UserId::new();
            let mut account = Account::open(user, Utc::now());
            let mut sums = [0i128; 2];

            for (kind, minor, usd) in ops {
                let currency = if usd { Currency::Usd } else { Currency::Inr };
                let cmd = RecordTransaction::new(
                    user,
                    SignedAmount::from_minor(minor),
                    currency,
                    kind,
                    "prop",
                );
                match account.handle(&LedgerCommand::Record(cmd)) {
                    Ok(events) => {
                        for e in &events {
                            let LedgerEvent::EntryPosted(p) = e;
                            let idx = if p.record.currency == Currency::Usd { 0 } else { 1 };
                            sums[idx] += p.record.signed_amount.minor() as i128;
                            account.apply(e);
                        }
                    }
                    Err(DomainError::InsufficientFunds { .. }) => {}
                    Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                }
            }

            prop_assert_eq!(account.balance(Currency::Usd).minor() as i128, sums[0]);
            prop_assert_eq!(account.balance(Currency::Inr).minor() as i128, sums[1]);
        }
    }
}
