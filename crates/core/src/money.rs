//! Fixed-point money primitives.
//!
//! Balances and transaction amounts are kept in **minor units** (cents, paise)
//! as `i64`, never as floating point. Both supported currencies use two
//! fractional digits. Exchange rates carry four fractional digits.

use core::fmt;
use core::ops::Neg;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

const AMOUNT_DIGITS: u32 = 2;
const RATE_DIGITS: u32 = 4;
const RATE_SCALE: i128 = 10_000;

/// Supported wallet currency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "USD")]
    Usd,
    #[serde(rename = "INR")]
    Inr,
}

impl Currency {
    /// Every currency an account holds a balance for.
    pub const ALL: [Currency; 2] = [Currency::Usd, Currency::Inr];

    pub fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Inr => "INR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::Usd),
            "INR" => Ok(Currency::Inr),
            other => Err(DomainError::validation(format!(
                "unsupported currency '{other}'"
            ))),
        }
    }
}

/// A non-negative amount of money in minor units.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub fn from_minor(minor: i64) -> DomainResult<Self> {
        if minor < 0 {
            return Err(DomainError::validation(format!(
                "amount must not be negative (got {minor} minor units)"
            )));
        }
        Ok(Self(minor))
    }

    pub fn from_major(units: i64) -> DomainResult<Self> {
        let minor = units
            .checked_mul(10_i64.pow(AMOUNT_DIGITS))
            .ok_or_else(|| DomainError::validation("amount overflow"))?;
        Self::from_minor(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Amount) -> DomainResult<Amount> {
        self.0
            .checked_add(other.0)
            .map(Amount)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    /// Subtract, returning `None` if the result would be negative.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        let diff = self.0 - other.0;
        (diff >= 0).then_some(Amount(diff))
    }

    /// This amount as a credit (positive signed amount).
    pub fn credit(self) -> SignedAmount {
        SignedAmount(self.0)
    }

    /// This amount as a debit (negative signed amount).
    pub fn debit(self) -> SignedAmount {
        SignedAmount(-self.0)
    }

    /// Apply a signed delta. The result may be negative; callers decide
    /// whether that is an insufficient-funds failure.
    pub fn offset_by(self, delta: SignedAmount) -> DomainResult<SignedAmount> {
        self.0
            .checked_add(delta.0)
            .map(SignedAmount)
            .ok_or_else(|| DomainError::validation("balance overflow"))
    }

    /// Fraction of this amount expressed in basis points, rounded half-up.
    pub fn basis_points(self, bps: u32) -> DomainResult<Amount> {
        let scaled = (self.0 as i128 * bps as i128 + 5_000) / 10_000;
        i64::try_from(scaled)
            .map(Amount)
            .map_err(|_| DomainError::validation("amount overflow"))
    }
}

impl TryFrom<i64> for Amount {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_minor(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_minor(parse_fixed(s, AMOUNT_DIGITS, "amount")?)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_fixed(f, self.0, AMOUNT_DIGITS)
    }
}

/// A signed amount in minor units (positive = credit, negative = debit).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignedAmount(i64);

impl SignedAmount {
    pub const ZERO: SignedAmount = SignedAmount(0);

    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub const fn minor(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn is_credit(self) -> bool {
        self.0 > 0
    }

    /// Absolute value as an `Amount`.
    pub fn magnitude(self) -> Amount {
        Amount(self.0.checked_abs().unwrap_or(i64::MAX))
    }

    /// Convert to an `Amount`, or `None` if negative.
    pub fn to_amount(self) -> Option<Amount> {
        (self.0 >= 0).then_some(Amount(self.0))
    }

    pub fn checked_add(self, other: SignedAmount) -> Option<SignedAmount> {
        self.0.checked_add(other.0).map(SignedAmount)
    }
}

impl Neg for SignedAmount {
    type Output = SignedAmount;

    fn neg(self) -> Self::Output {
        SignedAmount(-self.0)
    }
}

impl From<Amount> for SignedAmount {
    fn from(value: Amount) -> Self {
        value.credit()
    }
}

impl FromStr for SignedAmount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_fixed(s, AMOUNT_DIGITS, "amount").map(SignedAmount)
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 > 0 {
            f.write_str("+")?;
        }
        fmt_fixed(f, self.0, AMOUNT_DIGITS)
    }
}

/// Exchange rate: units of the destination currency per unit of the source,
/// with four fractional digits. Always strictly positive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rate(i64);

impl Rate {
    /// Compile-time constructor for known-good constants.
    pub const fn from_scaled_const(scaled: i64) -> Self {
        assert!(scaled > 0, "exchange rate must be positive");
        Self(scaled)
    }

    pub fn from_scaled(scaled: i64) -> DomainResult<Self> {
        if scaled <= 0 {
            return Err(DomainError::validation("exchange rate must be positive"));
        }
        Ok(Self(scaled))
    }

    pub const fn scaled(self) -> i64 {
        self.0
    }

    /// Convert an amount in the source currency, rounding half-up to the
    /// destination's minor unit.
    pub fn convert(self, amount: Amount) -> DomainResult<Amount> {
        let product = amount.0 as i128 * self.0 as i128;
        let rounded = (product + RATE_SCALE / 2) / RATE_SCALE;
        i64::try_from(rounded)
            .map(Amount)
            .map_err(|_| DomainError::validation("converted amount overflow"))
    }

    /// The reverse-direction rate, rounded half-up to four digits.
    pub fn inverse(self) -> DomainResult<Rate> {
        let numerator = RATE_SCALE * RATE_SCALE;
        let inverted = (numerator + self.0 as i128 / 2) / self.0 as i128;
        let scaled = i64::try_from(inverted)
            .map_err(|_| DomainError::validation("exchange rate overflow"))?;
        if scaled == 0 {
            return Err(DomainError::validation("exchange rate too large to invert"));
        }
        Ok(Self(scaled))
    }
}

impl TryFrom<i64> for Rate {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_scaled(value)
    }
}

impl From<Rate> for i64 {
    fn from(value: Rate) -> Self {
        value.0
    }
}

impl FromStr for Rate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_scaled(parse_fixed(s, RATE_DIGITS, "rate")?)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_fixed(f, self.0, RATE_DIGITS)
    }
}

fn parse_fixed(raw: &str, digits: u32, what: &str) -> DomainResult<i64> {
    let invalid = || DomainError::validation(format!("invalid {what} '{raw}'"));

    let s = raw.trim();
    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((_, "")) => return Err(invalid()),
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };

    if int_part.is_empty()
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    if frac_part.len() > digits as usize {
        return Err(DomainError::validation(format!(
            "{what} '{raw}' has more than {digits} fractional digits"
        )));
    }

    let int: i64 = int_part.parse().map_err(|_| invalid())?;
    let mut frac: i64 = 0;
    for b in frac_part.bytes() {
        frac = frac * 10 + i64::from(b - b'0');
    }
    frac *= 10_i64.pow(digits - frac_part.len() as u32);

    let value = int
        .checked_mul(10_i64.pow(digits))
        .and_then(|v| v.checked_add(frac))
        .ok_or_else(|| DomainError::validation(format!("{what} '{raw}' is out of range")))?;

    Ok(if negative { -value } else { value })
}

fn fmt_fixed(f: &mut fmt::Formatter<'_>, value: i64, digits: u32) -> fmt::Result {
    let scale = 10_u64.pow(digits);
    let abs = value.unsigned_abs();
    let sign = if value < 0 { "-" } else { "" };
    write!(
        f,
        "{sign}{}.{:0width$}",
        abs / scale,
        abs % scale,
        width = digits as usize
    )
}
