//! Runtime configuration from environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `VISHWAM_STORE` | `memory` (`postgres` needs `DATABASE_URL`) |
//! | `VISHWAM_MAX_COMMIT_ATTEMPTS` | `5` |
//! | `VISHWAM_FX_USD_INR` | `84.50` |
//! | `VISHWAM_FX_FEE_BPS` | `100` |
//! | `VISHWAM_FX_QUOTE_TTL_SECS` | `300` |

use chrono::Duration;
use thiserror::Error;

use vishwam_core::Rate;
use vishwam_ledger::FxQuoter;
use vishwam_ledger::fx::{DEFAULT_FEE_BPS, DEFAULT_QUOTE_TTL_SECS, DEFAULT_USD_INR};

use crate::account_store::DEFAULT_MAX_COMMIT_ATTEMPTS;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} must be set when VISHWAM_STORE=postgres")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub store: StoreBackend,
    pub max_commit_attempts: u32,
    pub fx_usd_inr: Rate,
    pub fx_fee_bps: u32,
    pub fx_quote_ttl: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            max_commit_attempts: DEFAULT_MAX_COMMIT_ATTEMPTS,
            fx_usd_inr: DEFAULT_USD_INR,
            fx_fee_bps: DEFAULT_FEE_BPS,
            fx_quote_ttl: Duration::seconds(DEFAULT_QUOTE_TTL_SECS),
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let store = match get("VISHWAM_STORE").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("memory") => StoreBackend::Memory,
            Some("postgres") => StoreBackend::Postgres {
                database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "VISHWAM_STORE",
                    reason: format!("unknown backend '{other}' (expected memory or postgres)"),
                });
            }
        };

        let max_commit_attempts = match get("VISHWAM_MAX_COMMIT_ATTEMPTS") {
            Some(raw) => parse_number("VISHWAM_MAX_COMMIT_ATTEMPTS", &raw)?,
            None => defaults.max_commit_attempts,
        };
        if max_commit_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "VISHWAM_MAX_COMMIT_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }

        let fx_usd_inr = match get("VISHWAM_FX_USD_INR") {
            Some(raw) => raw.parse::<Rate>().map_err(|e| ConfigError::Invalid {
                key: "VISHWAM_FX_USD_INR",
                reason: e.to_string(),
            })?,
            None => defaults.fx_usd_inr,
        };

        let fx_fee_bps: u32 = match get("VISHWAM_FX_FEE_BPS") {
            Some(raw) => parse_number("VISHWAM_FX_FEE_BPS", &raw)?,
            None => defaults.fx_fee_bps,
        };
        if fx_fee_bps >= 10_000 {
            return Err(ConfigError::Invalid {
                key: "VISHWAM_FX_FEE_BPS",
                reason: "fee must be below 10000 basis points".to_string(),
            });
        }

        let fx_quote_ttl = match get("VISHWAM_FX_QUOTE_TTL_SECS") {
            Some(raw) => Duration::seconds(parse_number::<u32>("VISHWAM_FX_QUOTE_TTL_SECS", &raw)?.into()),
            None => defaults.fx_quote_ttl,
        };

        Ok(Self {
            store,
            max_commit_attempts,
            fx_usd_inr,
            fx_fee_bps,
            fx_quote_ttl,
        })
    }

    pub fn quoter(&self) -> FxQuoter {
        FxQuoter::new(self.fx_usd_inr, self.fx_fee_bps, self.fx_quote_ttl)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: format!("'{raw}' is not a valid number: {e}"),
    })
}
