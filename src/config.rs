//! Configuration types for riskcore

use anyhow::Context;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::risk::{
    ConfidenceScaling, PerformanceConfig, RiskError, RiskLimits, VolatilityConfig,
};
use crate::telemetry::LogFormat;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub limits: RiskLimits,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub volatility: VolatilityConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Account configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Initial capital in account currency
    #[serde(default = "default_account_size")]
    pub account_size: Decimal,
}

fn default_account_size() -> Decimal {
    dec!(100000)
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            account_size: default_account_size(),
        }
    }
}

/// Position sizing configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// How confidence combines with the Kelly fraction
    #[serde(default)]
    pub confidence_scaling: ConfidenceScaling,
}

/// Telemetry configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("loading config {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the engine cannot run with
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.account.account_size <= dec!(0) {
            return Err(RiskError::InvalidInput(format!(
                "account_size must be positive, got {}",
                self.account.account_size
            )));
        }
        self.limits.validate()?;
        if let ConfidenceScaling::Edge { payoff_ratio } = self.sizing.confidence_scaling {
            if payoff_ratio <= dec!(0) {
                return Err(RiskError::InvalidInput(format!(
                    "payoff_ratio must be positive, got {payoff_ratio}"
                )));
            }
        }
        self.volatility.validate()?;
        let factor = self.performance.annualization_factor;
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RiskError::InvalidInput(format!(
                "annualization_factor must be positive, got {factor}"
            )));
        }
        Ok(())
    }
}
