use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::core_types::AccountId;
use crate::money::Currency;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Io { .. } => "config_io",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid(_) => "config_invalid",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub fx: FxConfig,
    #[serde(default)]
    pub settlement: SettlementConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// PostgreSQL connection URL for the ledger. In-memory ledger when absent.
    #[serde(default)]
    pub postgres_url: Option<String>,
    /// Accounts bulk-upserted into the ledger at startup
    #[serde(default)]
    pub accounts: Vec<AccountSeed>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub dir: String,
    pub file: String,
    pub use_json: bool,
    /// "hourly", "daily" or anything else for a single file
    pub rotation: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: "./logs".to_string(),
            file: "settlement.log".to_string(),
            use_json: false,
            rotation: "daily".to_string(),
        }
    }
}

/// Amount bounds in minor units of the request currency
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct AmountLimits {
    pub min_amount: i64,
    pub max_amount: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RiskConfig {
    pub min_amount: i64,
    pub max_amount: i64,
    /// Random rejection probability in 1/1000 (20 = 2%)
    pub random_reject_per_mille: u32,
    /// Score at or above which an accepted transfer is flagged REVIEW
    pub review_score: u8,
    /// Per-currency overrides of min/max
    pub currency_limits: HashMap<Currency, AmountLimits>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            min_amount: 1_000,
            max_amount: 10_000_000,
            random_reject_per_mille: 20,
            review_score: 80,
            currency_limits: HashMap::new(),
        }
    }
}

impl RiskConfig {
    /// Limits that apply to a request in `currency`
    pub fn limits_for(&self, currency: Currency) -> AmountLimits {
        self.currency_limits
            .get(&currency)
            .copied()
            .unwrap_or(AmountLimits {
                min_amount: self.min_amount,
                max_amount: self.max_amount,
            })
    }
}

/// One published rate: 1 unit of `base` = `rate` units of `quote`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RateSeed {
    pub base: Currency,
    pub quote: Currency,
    /// Decimal string, e.g. "15500.25"
    pub rate: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FxConfig {
    pub rates: Vec<RateSeed>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SettlementConfig {
    /// Currency the ledger settles in
    pub currency: Currency,
    /// Deadline for each downstream call (risk, fx, ledger)
    pub step_deadline_ms: u64,
    /// How long terminal outcomes are replayed from memory
    pub replay_ttl_secs: u64,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            currency: Currency::Idr,
            step_deadline_ms: 2_000,
            replay_ttl_secs: 600,
        }
    }
}

impl SettlementConfig {
    pub fn step_deadline(&self) -> Duration {
        Duration::from_millis(self.step_deadline_ms)
    }

    pub fn replay_ttl(&self) -> Duration {
        Duration::from_secs(self.replay_ttl_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BridgeConfig {
    /// How long an ingress caller waits for its result
    pub wait_timeout_ms: u64,
    /// How long an unclaimed result is retained for a late waiter
    pub grace_period_ms: u64,
    pub channel_capacity: usize,
    /// Sagas the worker runs concurrently
    pub max_in_flight: usize,
    /// Period of the retained-result sweep
    pub sweep_interval_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: 5_000,
            grace_period_ms: 30_000,
            channel_capacity: 1_024,
            max_in_flight: 64,
            sweep_interval_ms: 1_000,
        }
    }
}

impl BridgeConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccountSeed {
    pub account_id: AccountId,
    pub balance: i64,
    pub currency: Currency,
}

impl AppConfig {
    /// Load and validate a YAML config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |limits: AmountLimits, label: &str| {
            if limits.min_amount < 0 || limits.min_amount > limits.max_amount {
                return Err(ConfigError::Invalid(format!(
                    "{label}: min_amount {} / max_amount {} out of order",
                    limits.min_amount, limits.max_amount
                )));
            }
            Ok(())
        };
        check(
            AmountLimits {
                min_amount: self.risk.min_amount,
                max_amount: self.risk.max_amount,
            },
            "risk",
        )?;
        for (currency, limits) in &self.risk.currency_limits {
            check(*limits, &format!("risk.currency_limits.{currency}"))?;
        }
        if self.risk.random_reject_per_mille > 1_000 {
            return Err(ConfigError::Invalid(
                "risk.random_reject_per_mille must be <= 1000".to_string(),
            ));
        }
        if self.risk.review_score > 100 {
            return Err(ConfigError::Invalid(
                "risk.review_score must be <= 100".to_string(),
            ));
        }

        for seed in &self.fx.rates {
            let positive = seed
                .rate
                .parse::<rust_decimal::Decimal>()
                .map(|r| r > rust_decimal::Decimal::ZERO)
                .unwrap_or(false);
            if !positive {
                return Err(ConfigError::Invalid(format!(
                    "fx rate {}/{} must be a positive decimal, got '{}'",
                    seed.base, seed.quote, seed.rate
                )));
            }
        }

        if self.settlement.step_deadline_ms == 0 {
            return Err(ConfigError::Invalid(
                "settlement.step_deadline_ms must be > 0".to_string(),
            ));
        }
        if self.bridge.wait_timeout_ms == 0 || self.bridge.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "bridge.wait_timeout_ms and bridge.channel_capacity must be > 0".to_string(),
            ));
        }
        if self.bridge.max_in_flight == 0 || self.bridge.sweep_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "bridge.max_in_flight and bridge.sweep_interval_ms must be > 0".to_string(),
            ));
        }

        for seed in &self.accounts {
            if seed.account_id.trim().is_empty() || seed.balance < 0 {
                return Err(ConfigError::Invalid(format!(
                    "account seed '{}' needs an id and a non-negative balance",
                    seed.account_id
                )));
            }
        }
        Ok(())
    }
}
