//! Risk limits and the drawdown circuit breaker
//!
//! Transition table (first matching row wins, evaluated top-down):
//!
//! | Level    | Condition                                         |
//! |----------|---------------------------------------------------|
//! | SHUTDOWN | max_drawdown >= shutdown_max_drawdown             |
//! | CRITICAL | max_drawdown >= critical_max_drawdown, or daily >= critical_daily_drawdown |
//! | ALERT    | max_drawdown >= alert_max_drawdown, or daily >= alert_daily_drawdown |
//! | NORMAL   | otherwise                                         |
//!
//! The monitor only ever moves up this table. Moving down requires
//! [`RiskLimitMonitor::reset`].

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::position::AccountState;
use super::types::{RiskError, RiskStatus};

/// Drawdown levels that drive the circuit breaker, as fractions (0.10 = 10%)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawdownThresholds {
    pub alert_max_drawdown: Decimal,
    pub alert_daily_drawdown: Decimal,
    pub critical_max_drawdown: Decimal,
    pub critical_daily_drawdown: Decimal,
    pub shutdown_max_drawdown: Decimal,
}

impl Default for DrawdownThresholds {
    fn default() -> Self {
        Self {
            alert_max_drawdown: dec!(0.10),
            alert_daily_drawdown: dec!(0.08),
            critical_max_drawdown: dec!(0.20),
            critical_daily_drawdown: dec!(0.15),
            shutdown_max_drawdown: dec!(0.30),
        }
    }
}

impl DrawdownThresholds {
    /// Map drawdown readings to a level, with the metric that triggered it
    pub fn classify(
        &self,
        max_drawdown: Decimal,
        daily_drawdown: Decimal,
    ) -> (RiskStatus, Option<RiskTrigger>) {
        if max_drawdown >= self.shutdown_max_drawdown {
            return (
                RiskStatus::Shutdown,
                Some(RiskTrigger::MaxDrawdown(max_drawdown)),
            );
        }
        if max_drawdown >= self.critical_max_drawdown {
            return (
                RiskStatus::Critical,
                Some(RiskTrigger::MaxDrawdown(max_drawdown)),
            );
        }
        if daily_drawdown >= self.critical_daily_drawdown {
            return (
                RiskStatus::Critical,
                Some(RiskTrigger::DailyDrawdown(daily_drawdown)),
            );
        }
        if max_drawdown >= self.alert_max_drawdown {
            return (
                RiskStatus::Alert,
                Some(RiskTrigger::MaxDrawdown(max_drawdown)),
            );
        }
        if daily_drawdown >= self.alert_daily_drawdown {
            return (
                RiskStatus::Alert,
                Some(RiskTrigger::DailyDrawdown(daily_drawdown)),
            );
        }
        (RiskStatus::Normal, None)
    }

    fn validate(&self) -> Result<(), RiskError> {
        let all = [
            ("alert_max_drawdown", self.alert_max_drawdown),
            ("alert_daily_drawdown", self.alert_daily_drawdown),
            ("critical_max_drawdown", self.critical_max_drawdown),
            ("critical_daily_drawdown", self.critical_daily_drawdown),
            ("shutdown_max_drawdown", self.shutdown_max_drawdown),
        ];
        for (name, value) in all {
            ensure_fraction(name, value)?;
        }
        if !(self.alert_max_drawdown < self.critical_max_drawdown
            && self.critical_max_drawdown < self.shutdown_max_drawdown)
        {
            return Err(RiskError::InvalidInput(
                "max drawdown thresholds must increase alert < critical < shutdown".into(),
            ));
        }
        if self.alert_daily_drawdown >= self.critical_daily_drawdown {
            return Err(RiskError::InvalidInput(
                "daily drawdown thresholds must increase alert < critical".into(),
            ));
        }
        Ok(())
    }
}

/// Immutable risk configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Kelly fraction (e.g., 0.25 for quarter Kelly)
    pub kelly_fraction: Decimal,
    /// Maximum position notional as a fraction of account size
    pub max_position_pct: Decimal,
    /// Maximum dollar risk per trade as a fraction of account size
    pub max_risk_per_trade_pct: Decimal,
    /// Maximum committed risk across open positions as a fraction of account size
    pub max_portfolio_heat_pct: Decimal,
    /// Size multiplier applied at ALERT
    pub alert_size_multiplier: Decimal,
    /// Minimum confidence accepted at ALERT
    pub alert_min_confidence: Decimal,
    /// Circuit breaker levels
    pub thresholds: DrawdownThresholds,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            kelly_fraction: dec!(0.25),
            max_position_pct: dec!(0.10),
            max_risk_per_trade_pct: dec!(0.02),
            max_portfolio_heat_pct: dec!(0.06),
            alert_size_multiplier: dec!(0.5),
            alert_min_confidence: dec!(0.75),
            thresholds: DrawdownThresholds::default(),
        }
    }
}

impl RiskLimits {
    /// Reject fractions outside (0, 1] and unordered thresholds
    pub fn validate(&self) -> Result<(), RiskError> {
        ensure_fraction("kelly_fraction", self.kelly_fraction)?;
        ensure_fraction("max_position_pct", self.max_position_pct)?;
        ensure_fraction("max_risk_per_trade_pct", self.max_risk_per_trade_pct)?;
        ensure_fraction("max_portfolio_heat_pct", self.max_portfolio_heat_pct)?;
        ensure_fraction("alert_size_multiplier", self.alert_size_multiplier)?;
        if self.alert_min_confidence < dec!(0) || self.alert_min_confidence > dec!(1) {
            return Err(RiskError::InvalidInput(format!(
                "alert_min_confidence must be within [0, 1], got {}",
                self.alert_min_confidence
            )));
        }
        self.thresholds.validate()
    }

    /// Per-trade dollar risk cap for `account_size`
    pub fn max_risk_dollars(&self, account_size: Decimal) -> Decimal {
        self.max_risk_per_trade_pct * account_size
    }

    /// Per-position notional cap for `account_size`
    pub fn max_position_dollars(&self, account_size: Decimal) -> Decimal {
        self.max_position_pct * account_size
    }

    /// Portfolio heat cap in dollars for `account_size`
    pub fn max_heat_dollars(&self, account_size: Decimal) -> Decimal {
        self.max_portfolio_heat_pct * account_size
    }
}

fn ensure_fraction(name: &str, value: Decimal) -> Result<(), RiskError> {
    if value <= dec!(0) || value > dec!(1) {
        return Err(RiskError::InvalidInput(format!(
            "{name} must be within (0, 1], got {value}"
        )));
    }
    Ok(())
}

/// The metric that put the monitor at its level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RiskTrigger {
    /// Decline from peak equity
    MaxDrawdown(Decimal),
    /// Decline from session start equity
    DailyDrawdown(Decimal),
}

/// Result of a risk limit check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskCheck {
    /// Level after this check
    pub status: RiskStatus,
    /// Level before this check
    pub previous: RiskStatus,
    /// Metric responsible for the current level, if any
    pub trigger: Option<RiskTrigger>,
    pub max_drawdown: Decimal,
    pub daily_drawdown: Decimal,
    pub portfolio_heat: Decimal,
    /// Open symbols awaiting manual closure (SHUTDOWN only)
    pub flagged_for_closure: Vec<String>,
}

impl RiskCheck {
    /// Whether this check raised the level
    pub fn escalated(&self) -> bool {
        self.status > self.previous
    }
}

/// Four-level circuit breaker over drawdown
#[derive(Debug, Clone)]
pub struct RiskLimitMonitor {
    thresholds: DrawdownThresholds,
    status: RiskStatus,
    trigger: Option<RiskTrigger>,
}

impl RiskLimitMonitor {
    /// Create a monitor at NORMAL
    pub fn new(thresholds: DrawdownThresholds) -> Self {
        Self {
            thresholds,
            status: RiskStatus::Normal,
            trigger: None,
        }
    }

    /// Current level
    pub fn status(&self) -> RiskStatus {
        self.status
    }

    /// Metric that set the current level
    pub fn trigger(&self) -> Option<RiskTrigger> {
        self.trigger
    }

    /// Level the account would be at right now, without mutating.
    ///
    /// Never lower than the latched level.
    pub fn evaluate(&self, account: &AccountState) -> RiskStatus {
        let (computed, _) = self
            .thresholds
            .classify(account.max_drawdown(), account.daily_drawdown());
        self.status.max(computed)
    }

    /// Recompute drawdowns and heat, escalating if a threshold is crossed.
    pub fn check_risk_limits(&mut self, account: &AccountState) -> RiskCheck {
        let max_drawdown = account.max_drawdown();
        let daily_drawdown = account.daily_drawdown();
        let previous = self.status;
        let (computed, trigger) = self.thresholds.classify(max_drawdown, daily_drawdown);

        if computed > self.status {
            self.status = computed;
            self.trigger = trigger;
            match computed {
                RiskStatus::Shutdown => error!(
                    from = %previous,
                    to = %computed,
                    max_drawdown = %max_drawdown,
                    "Risk SHUTDOWN: manual intervention required"
                ),
                _ => warn!(
                    from = %previous,
                    to = %computed,
                    max_drawdown = %max_drawdown,
                    daily_drawdown = %daily_drawdown,
                    "Risk status escalated"
                ),
            }
        }

        RiskCheck {
            status: self.status,
            previous,
            trigger: self.trigger,
            max_drawdown,
            daily_drawdown,
            portfolio_heat: account.portfolio_heat(),
            flagged_for_closure: self.flagged_for_closure(account),
        }
    }

    /// Open symbols flagged for manual closure
    pub fn flagged_for_closure(&self, account: &AccountState) -> Vec<String> {
        if self.status == RiskStatus::Shutdown {
            account.positions.keys().cloned().collect()
        } else {
            Vec::new()
        }
    }

    /// Operator reset. Drops the latched level to whatever the current
    /// readings imply; a live breach stays in force.
    pub fn reset(&mut self, account: &AccountState, operator: &str) -> RiskStatus {
        let previous = self.status;
        let (computed, trigger) = self
            .thresholds
            .classify(account.max_drawdown(), account.daily_drawdown());
        self.status = computed;
        self.trigger = trigger;
        info!(
            operator = operator,
            from = %previous,
            to = %computed,
            "Risk status reset by operator"
        );
        computed
    }
}

impl Default for RiskLimitMonitor {
    fn default() -> Self {
        Self::new(DrawdownThresholds::default())
    }
}
