use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vishwam_core::{AggregateRoot, Amount, Currency, UserId};

/// One balance per supported currency, always present.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    #[serde(rename = "USD")]
    usd: Amount,
    #[serde(rename = "INR")]
    inr: Amount,
}

impl Balances {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn new(usd: Amount, inr: Amount) -> Self {
        Self { usd, inr }
    }

    pub fn get(&self, currency: Currency) -> Amount {
        match currency {
            Currency::Usd => self.usd,
            Currency::Inr => self.inr,
        }
    }

    pub fn set(&mut self, currency: Currency, amount: Amount) {
        match currency {
            Currency::Usd => self.usd = amount,
            Currency::Inr => self.inr = amount,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Currency, Amount)> + '_ {
        Currency::ALL.into_iter().map(|c| (c, self.get(c)))
    }
}

/// Aggregate root: a user's wallet account (one document per user).
///
/// Balances are held directly on the document; the transaction records that
/// justify them live alongside in the store and always sum to the balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    user_id: UserId,
    balances: Balances,
    version: u64,
    created_at: DateTime<Utc>,
}

impl Account {
    /// A freshly opened account: zero in every currency, version 0.
    pub fn open(user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balances: Balances::zero(),
            version: 0,
            created_at,
        }
    }

    /// Rebuild an account from persisted state.
    pub fn restore(
        user_id: UserId,
        balances: Balances,
        version: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            balances,
            version,
            created_at,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn balances(&self) -> Balances {
        self.balances
    }

    pub fn balance(&self, currency: Currency) -> Amount {
        self.balances.get(currency)
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn set_balance(&mut self, currency: Currency, amount: Amount) {
        self.balances.set(currency, amount);
    }

    /// Same account at a new document version (assigned by the store on commit).
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }
}

impl AggregateRoot for Account {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.user_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
