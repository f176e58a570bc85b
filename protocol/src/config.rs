//! # Protocol Configuration & Constants
//!
//! Every magic number in Vouch lives here. Components take an
//! [`EngineConfig`] at construction; the constants below are its defaults
//! and the hard limits it is validated against.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::vault::unit::{Amount, GWEI};

// ---------------------------------------------------------------------------
// Protocol Version
// ---------------------------------------------------------------------------

pub const PROTOCOL_VERSION: &str = "0.1.0";

/// Domain context for pledge fingerprints. Bump the suffix if the
/// fingerprint preimage layout ever changes, so old signatures stop
/// matching instead of matching the wrong thing.
pub const FINGERPRINT_CONTEXT: &str = "vouch pledge fingerprint v1";

// ---------------------------------------------------------------------------
// Pledge Parameters
// ---------------------------------------------------------------------------

/// Maximum judge panel size.
pub const MAX_JUDGES: u8 = 3;

/// Minimum judge panel size.
pub const MIN_JUDGES: u8 = 1;

/// Default minimum pot: 1 gwei.
pub const DEFAULT_MIN_POT: Amount = GWEI;

/// Judgement window after a pledge's end date: 7 days.
pub const DEFAULT_JUDGEMENT_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Fee Parameters
// ---------------------------------------------------------------------------

/// Fee = floor(pot / divider). 1000 means 0.1%.
pub const DEFAULT_FEE_DIVIDER: Amount = 1_000;

// ---------------------------------------------------------------------------
// Development Yield
// ---------------------------------------------------------------------------

/// Interest the development yield source mints on every join.
pub const DEV_YIELD_INTEREST_PER_JOIN: Amount = 5;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Errors from configuration validation or parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("fee divider must be non-zero")]
    ZeroFeeDivider,

    #[error("minimum pot must be non-zero")]
    ZeroMinPot,

    #[error("judgement period must be non-zero")]
    ZeroJudgementPeriod,

    #[error("config parse error: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Tunable parameters for the bank and the pledge engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Seconds after `end_date` during which judges may vote.
    pub judgement_period_secs: u64,
    /// Fee divider applied at deposit.
    pub fee_divider: Amount,
    /// Smallest pot a pledge may lock.
    pub min_pot: Amount,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            judgement_period_secs: DEFAULT_JUDGEMENT_PERIOD_SECS,
            fee_divider: DEFAULT_FEE_DIVIDER,
            min_pot: DEFAULT_MIN_POT,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fee_divider == 0 {
            return Err(ConfigError::ZeroFeeDivider);
        }
        if self.min_pot == 0 {
            return Err(ConfigError::ZeroMinPot);
        }
        if self.judgement_period_secs == 0 {
            return Err(ConfigError::ZeroJudgementPeriod);
        }
        Ok(())
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The fee withheld from a deposit of `amount`.
    pub fn fee_for(&self, amount: Amount) -> Amount {
        amount / self.fee_divider
    }
}
