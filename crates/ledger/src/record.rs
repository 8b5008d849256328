//! Transaction records: the append-only history behind every balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vishwam_core::{Amount, Currency, Rate, SignedAmount, TransactionId, UserId};

/// Kind of ledger event a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Remittance,
    BillPay,
    FxConversion,
    Spend,
    Income,
}

impl TransactionType {
    /// Whether this type takes money out of the account.
    pub fn is_debit(self) -> bool {
        matches!(
            self,
            TransactionType::Withdrawal
                | TransactionType::Spend
                | TransactionType::BillPay
                | TransactionType::Remittance
        )
    }

    /// Signed effect of `amount` under this type.
    pub fn signed(self, amount: Amount) -> SignedAmount {
        if self.is_debit() {
            amount.debit()
        } else {
            amount.credit()
        }
    }

    /// Payment rail recorded when the caller does not name one.
    pub fn default_rail(self) -> PaymentRail {
        match self {
            TransactionType::Deposit | TransactionType::Withdrawal | TransactionType::Income => {
                PaymentRail::BankTransfer
            }
            TransactionType::Spend => PaymentRail::Card,
            TransactionType::BillPay => PaymentRail::Upi,
            TransactionType::Remittance => PaymentRail::Swift,
            TransactionType::FxConversion => PaymentRail::Wallet,
        }
    }
}

/// Semantic tag shown in spend analytics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Income,
    Transfer,
    Shopping,
    Food,
    Bills,
    Travel,
    Entertainment,
    Health,
    General,
}

/// Payment rail label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentRail {
    #[serde(rename = "UPI")]
    Upi,
    Card,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
    #[serde(rename = "SWIFT")]
    Swift,
    Wallet,
}

impl core::fmt::Display for PaymentRail {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            PaymentRail::Upi => "UPI",
            PaymentRail::Card => "Card",
            PaymentRail::BankTransfer => "Bank Transfer",
            PaymentRail::Swift => "SWIFT",
            PaymentRail::Wallet => "Wallet",
        })
    }
}

/// Recipient details carried on the debit leg of a remittance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub name: String,
    pub account_ref: Option<String>,
    pub bank: Option<String>,
    pub country: Option<String>,
}

impl Beneficiary {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_ref: None,
            bank: None,
            country: None,
        }
    }
}

/// Auxiliary fields, typed per transaction kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordMetadata {
    Standard {
        category: Option<Category>,
        method: Option<PaymentRail>,
        note: Option<String>,
    },
    BillPayment {
        biller: String,
        consumer_number: String,
        category: Option<Category>,
        method: Option<PaymentRail>,
    },
    Remittance {
        rate: Rate,
        fees: Amount,
        beneficiary: Beneficiary,
    },
    RemittanceCredit {
        rate: Rate,
        fees: Amount,
        sender: String,
    },
    FxConversion {
        rate: Rate,
        fees: Amount,
    },
}

impl Default for RecordMetadata {
    fn default() -> Self {
        RecordMetadata::Standard {
            category: None,
            method: None,
            note: None,
        }
    }
}

impl RecordMetadata {
    pub fn categorized(category: Category) -> Self {
        RecordMetadata::Standard {
            category: Some(category),
            method: None,
            note: None,
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            RecordMetadata::Standard { category, .. }
            | RecordMetadata::BillPayment { category, .. } => *category,
            _ => None,
        }
    }

    pub fn method(&self) -> Option<PaymentRail> {
        match self {
            RecordMetadata::Standard { method, .. }
            | RecordMetadata::BillPayment { method, .. } => *method,
            _ => None,
        }
    }

    /// Whether this metadata shape may accompany a single-currency record of
    /// the given type. Remittance shapes are only produced by the cross-border
    /// path, never accepted from callers.
    pub fn accepts(&self, kind: TransactionType) -> bool {
        match self {
            RecordMetadata::Standard { .. } => true,
            RecordMetadata::BillPayment { .. } => kind == TransactionType::BillPay,
            RecordMetadata::FxConversion { .. } => kind == TransactionType::FxConversion,
            RecordMetadata::Remittance { .. } | RecordMetadata::RemittanceCredit { .. } => false,
        }
    }
}

/// A record decided by the domain, not yet persisted (no id or timestamp).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub user_id: UserId,
    pub currency: Currency,
    pub signed_amount: SignedAmount,
    pub kind: TransactionType,
    pub category: Category,
    pub description: String,
    pub method: PaymentRail,
    pub metadata: RecordMetadata,
}

impl RecordDraft {
    pub fn into_record(self, id: TransactionId, timestamp: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            id,
            user_id: self.user_id,
            currency: self.currency,
            signed_amount: self.signed_amount,
            kind: self.kind,
            category: self.category,
            description: self.description,
            method: self.method,
            timestamp,
            metadata: self.metadata,
        }
    }
}

/// An immutable, committed ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub user_id: UserId,
    pub currency: Currency,
    pub signed_amount: SignedAmount,
    pub kind: TransactionType,
    pub category: Category,
    pub description: String,
    pub method: PaymentRail,
    pub timestamp: DateTime<Utc>,
    pub metadata: RecordMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_types_are_exactly_the_outflows() {
        let debits: Vec<_> = [
            TransactionType::Deposit,
            TransactionType::Withdrawal,
            TransactionType::Remittance,
            TransactionType::BillPay,
            TransactionType::FxConversion,
            TransactionType::Spend,
            TransactionType::Income,
        ]
        .into_iter()
        .filter(|t| t.is_debit())
        .collect();

        assert_eq!(
            debits,
            vec![
                TransactionType::Withdrawal,
                TransactionType::Remittance,
                TransactionType::BillPay,
                TransactionType::Spend,
            ]
        );
    }

    #[test]
    fn metadata_shape_must_fit_the_type() {
        let bill = RecordMetadata::BillPayment {
            biller: "BESCOM".into(),
            consumer_number: "1234".into(),
            category: Some(Category::Bills),
            method: None,
        };
        assert!(bill.accepts(TransactionType::BillPay));
        assert!(!bill.accepts(TransactionType::Spend));
        assert!(RecordMetadata::default().accepts(TransactionType::Deposit));

        let remit = RecordMetadata::Remittance {
            rate: Rate::from_scaled(845_000).unwrap(),
            fees: Amount::ZERO,
            beneficiary: Beneficiary::named("Self"),
        };
        assert!(!remit.accepts(TransactionType::Remittance));
    }

    #[test]
    fn metadata_is_tagged_on_the_wire() {
        let json = serde_json::to_value(RecordMetadata::categorized(Category::Food)).unwrap();
        assert_eq!(json["kind"], "standard");
        assert_eq!(json["category"], "Food");
    }

    #[test]
    fn transaction_type_uses_upper_snake_case() {
        assert_eq!(
            serde_json::to_string(&TransactionType::BillPay).unwrap(),
            "\"BILL_PAY\""
        );
    }
}
