//! Engine parameters and process settings

use chrono::TimeDelta;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// Policy parameters fixed at engine construction.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Seed for the stored default profit rate, and the fallback when the
    /// ledger has never stored one.
    pub default_profit_rate: Decimal,
    /// Time from effective date to expiration date.
    pub policy_term: TimeDelta,
    /// Minimum time between two accepted premium payments.
    pub min_payment_interval: TimeDelta,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_profit_rate: dec!(13),
            policy_term: TimeDelta::minutes(5),
            min_payment_interval: TimeDelta::seconds(10),
        }
    }
}

/// Settings for the command line host, read from `POLICY_LEDGER_*`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: PathBuf,
    pub log_level: String,
    pub default_profit_rate: Decimal,
    pub policy_term_secs: i64,
    pub min_payment_interval_secs: i64,
}

impl Settings {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .set_default("db_path", "policy-ledger.db")?
            .set_default("log_level", "info")?
            .set_default("default_profit_rate", "13")?
            .set_default("policy_term_secs", 300)?
            .set_default("min_payment_interval_secs", 10)?
            .add_source(config::Environment::with_prefix("POLICY_LEDGER"))
            .build()?
            .try_deserialize::<Self>()
            .and_then(|settings| settings.validate().map(|_| settings))
    }

    /// Durations must be positive: a negative term would expire a policy
    /// before it takes effect.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.policy_term_secs <= 0 {
            return Err(config::ConfigError::Message(format!(
                "policy_term_secs must be positive, got {}",
                self.policy_term_secs
            )));
        }
        if self.min_payment_interval_secs <= 0 {
            return Err(config::ConfigError::Message(format!(
                "min_payment_interval_secs must be positive, got {}",
                self.min_payment_interval_secs
            )));
        }
        Ok(())
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            default_profit_rate: self.default_profit_rate,
            policy_term: TimeDelta::try_seconds(self.policy_term_secs).unwrap_or(TimeDelta::MAX),
            min_payment_interval: TimeDelta::try_seconds(self.min_payment_interval_secs)
                .unwrap_or(TimeDelta::MAX),
        }
    }
}
