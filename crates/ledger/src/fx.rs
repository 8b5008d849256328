//! FX quoting: pure computation, nothing persisted.
//!
//! A quote locks a rate and fee for a prospective remittance. Its expiry is
//! advisory; nothing downstream refuses an expired quote.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vishwam_core::{Amount, Currency, DomainError, DomainResult, Rate};

/// INR per USD used when no rate is configured.
pub const DEFAULT_USD_INR: Rate = Rate::from_scaled_const(845_000);
/// 1%.
pub const DEFAULT_FEE_BPS: u32 = 100;
pub const DEFAULT_QUOTE_TTL_SECS: i64 = 300;

/// A locked exchange rate, fee, and resulting output amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxQuote {
    pub id: Uuid,
    pub from: Currency,
    pub to: Currency,
    pub amount_in: Amount,
    pub fee: Amount,
    pub rate: Rate,
    pub amount_out: Amount,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FxQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Issues quotes from a fixed rate table and fee schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxQuoter {
    usd_inr: Rate,
    fee_bps: u32,
    validity: Duration,
}

impl Default for FxQuoter {
    fn default() -> Self {
        Self {
            usd_inr: DEFAULT_USD_INR,
            fee_bps: DEFAULT_FEE_BPS,
            validity: Duration::seconds(DEFAULT_QUOTE_TTL_SECS),
        }
    }
}

impl FxQuoter {
    pub fn new(usd_inr: Rate, fee_bps: u32, validity: Duration) -> Self {
        Self {
            usd_inr,
            fee_bps,
            validity,
        }
    }

    pub fn fee_bps(&self) -> u32 {
        self.fee_bps
    }

    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Rate for converting `from` into `to`.
    pub fn rate(&self, from: Currency, to: Currency) -> DomainResult<Rate> {
        match (from, to) {
            (Currency::Usd, Currency::Inr) => Ok(self.usd_inr),
            (Currency::Inr, Currency::Usd) => self.usd_inr.inverse(),
            _ => Err(DomainError::validation(format!(
                "no exchange rate for {from} -> {to}"
            ))),
        }
    }

    /// Quote converting `amount_in` of `from` into `to`.
    ///
    /// The fee is taken from the input before conversion:
    /// `amount_out = rate × (amount_in − fee)`.
    pub fn quote(
        &self,
        from: Currency,
        to: Currency,
        amount_in: Amount,
        now: DateTime<Utc>,
    ) -> DomainResult<FxQuote> {
        let rate = self.rate(from, to)?;
        let fee = amount_in.basis_points(self.fee_bps)?;
        let net = amount_in
            .checked_sub(fee)
            .filter(|net| net.is_positive())
            .ok_or_else(|| {
                DomainError::validation(format!("amount {amount_in} does not cover the fee {fee}"))
            })?;

        Ok(FxQuote {
            id: Uuid::now_v7(),
            from,
            to,
            amount_in,
            fee,
            rate,
            amount_out: rate.convert(net)?,
            issued_at: now,
            expires_at: now + self.validity,
        })
    }
}
