//! Position sizing
//!
//! [`PositionSizer`] owns the account, the circuit breaker and the trade
//! history. Sizing itself runs on a [`SizingSnapshot`] so it can be computed
//! outside any lock from a copy of the few fields it reads.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::kelly::{ConfidenceScaling, KellyCalculator};
use super::limits::{RiskCheck, RiskLimitMonitor, RiskLimits};
use super::performance::{PerformanceConfig, PerformanceStats, PerformanceTracker};
use super::position::{AccountState, ClosedTrade, Position, PositionRequest};
use super::types::{ensure_confidence, ensure_positive, Direction, RiskError, RiskStatus};
use super::volatility::{StopLevels, VolatilityConfig, VolatilityStopCalculator};
use crate::config::Config;
use crate::telemetry::{self, CounterMetric};

/// The cap that determined the final share count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingCap {
    /// Kelly target risk, below the per-trade cap
    Kelly,
    /// Per-trade dollar risk cap
    RiskPerTrade,
    /// Per-position notional cap
    PositionSize,
    /// Remaining portfolio heat budget
    PortfolioHeat,
}

/// Why a sizing decision came out at zero shares
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    /// ALERT level requires a minimum confidence
    ConfidenceBelowAlertThreshold {
        confidence: Decimal,
        required: Decimal,
    },
    /// CRITICAL level blocks new positions
    CriticalRisk,
    /// SHUTDOWN level blocks new positions
    Shutdown,
    /// Symbol already has an open position
    PositionAlreadyOpen,
    /// Open positions already use the full heat budget
    HeatBudgetExhausted,
    /// Caps leave less than one share (includes zero confidence)
    SizeBelowOneShare,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ConfidenceBelowAlertThreshold { .. } => {
                f.write_str("confidence below ALERT threshold")
            }
            RejectReason::CriticalRisk => f.write_str("no new positions - critical risk"),
            RejectReason::Shutdown => f.write_str("shutdown - manual intervention required"),
            RejectReason::PositionAlreadyOpen => f.write_str("position already open"),
            RejectReason::HeatBudgetExhausted => f.write_str("portfolio heat limit reached"),
            RejectReason::SizeBelowOneShare => f.write_str("size below one share"),
        }
    }
}

/// Outcome of a sizing request. Both variants are valid decisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SizingOutcome {
    /// At least one share
    Approved,
    /// Zero shares, with the reason
    Rejected(RejectReason),
}

/// How the share count was derived
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingDetails {
    pub direction: Direction,
    /// |entry - stop|
    pub stop_distance: Decimal,
    /// Kelly fraction after confidence scaling
    pub effective_fraction: Decimal,
    /// Dollar risk target after the per-trade cap
    pub target_risk: Decimal,
    pub shares_by_risk: u64,
    pub shares_by_position_cap: u64,
    pub shares_by_heat: u64,
    pub binding_cap: BindingCap,
    /// Risk level consulted
    pub risk_status: RiskStatus,
}

/// A sizing decision for one candidate trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingDecision {
    pub symbol: String,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub confidence: Decimal,
    pub shares: u64,
    /// shares * |entry - stop|
    pub risk_amount: Decimal,
    pub outcome: SizingOutcome,
    pub details: SizingDetails,
}

impl SizingDecision {
    /// Whether the decision carries at least one share
    pub fn is_approved(&self) -> bool {
        matches!(self.outcome, SizingOutcome::Approved)
    }

    /// Reason for a zero-share decision
    pub fn rejection(&self) -> Option<RejectReason> {
        match self.outcome {
            SizingOutcome::Approved => None,
            SizingOutcome::Rejected(reason) => Some(reason),
        }
    }

    /// Notional value at entry
    pub fn notional(&self) -> Decimal {
        Decimal::from(self.shares) * self.entry_price
    }

    /// Build an open request from an approved decision
    pub fn to_request(
        &self,
        take_profit: Option<Decimal>,
        entry_time: DateTime<Utc>,
    ) -> PositionRequest {
        PositionRequest {
            symbol: self.symbol.clone(),
            entry_price: self.entry_price,
            stop_loss: self.stop_loss,
            take_profit,
            shares: self.shares,
            confidence: self.confidence,
            entry_time,
        }
    }
}

/// Sizing from an ATR-derived stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrSizing {
    pub stops: StopLevels,
    pub decision: SizingDecision,
}

impl AtrSizing {
    /// Open request with the ATR target as take-profit
    pub fn to_request(&self, entry_time: DateTime<Utc>) -> PositionRequest {
        self.decision
            .to_request(Some(self.stops.take_profit), entry_time)
    }
}

/// The inputs sizing reads, copied out of the sizer
#[derive(Debug, Clone)]
pub struct SizingSnapshot {
    pub limits: RiskLimits,
    pub kelly: KellyCalculator,
    pub account_size: Decimal,
    pub committed_risk: Decimal,
    pub risk_status: RiskStatus,
    pub open_symbols: BTreeSet<String>,
}

impl SizingSnapshot {
    /// Size a candidate trade. Pure: identical inputs give identical output.
    pub fn calculate_position_size(
        &self,
        symbol: &str,
        entry_price: Decimal,
        stop_loss_price: Decimal,
        confidence: Decimal,
    ) -> Result<SizingDecision, RiskError> {
        if symbol.trim().is_empty() {
            return Err(RiskError::InvalidInput("symbol must not be empty".into()));
        }
        ensure_positive("entry_price", entry_price)?;
        ensure_positive("stop_loss_price", stop_loss_price)?;
        ensure_confidence(confidence)?;
        let direction = Direction::from_stop(entry_price, stop_loss_price).ok_or_else(|| {
            RiskError::InvalidInput("stop_loss_price must differ from entry_price".into())
        })?;

        let stop_distance = (entry_price - stop_loss_price).abs();
        let effective_fraction = self.kelly.effective_fraction(confidence);

        let kelly_risk = effective_fraction * self.account_size;
        let max_risk = self.limits.max_risk_dollars(self.account_size);
        let (target_risk, risk_cap) = if kelly_risk > max_risk {
            (max_risk, BindingCap::RiskPerTrade)
        } else {
            (kelly_risk, BindingCap::Kelly)
        };

        let shares_by_risk = whole_units(target_risk, stop_distance);
        let shares_by_position_cap = whole_units(
            self.limits.max_position_dollars(self.account_size),
            entry_price,
        );
        let heat_budget = (self.limits.max_heat_dollars(self.account_size)
            - self.committed_risk)
            .max(dec!(0));
        let shares_by_heat = whole_units(heat_budget, stop_distance);

        let (mut shares, binding_cap) = [
            (shares_by_risk, risk_cap),
            (shares_by_position_cap, BindingCap::PositionSize),
            (shares_by_heat, BindingCap::PortfolioHeat),
        ]
        .into_iter()
        .fold((u64::MAX, risk_cap), |best, candidate| {
            if candidate.0 < best.0 {
                candidate
            } else {
                best
            }
        });

        let mut rejection = match self.risk_status {
            RiskStatus::Shutdown => Some(RejectReason::Shutdown),
            RiskStatus::Critical => Some(RejectReason::CriticalRisk),
            _ if self.open_symbols.contains(symbol) => Some(RejectReason::PositionAlreadyOpen),
            RiskStatus::Alert if confidence < self.limits.alert_min_confidence => {
                Some(RejectReason::ConfidenceBelowAlertThreshold {
                    confidence,
                    required: self.limits.alert_min_confidence,
                })
            }
            RiskStatus::Alert => {
                shares = (Decimal::from(shares) * self.limits.alert_size_multiplier)
                    .floor()
                    .to_u64()
                    .unwrap_or(0);
                None
            }
            RiskStatus::Normal => None,
        };

        if rejection.is_none() && shares == 0 {
            let heat_bound = shares_by_heat == 0 && binding_cap == BindingCap::PortfolioHeat;
            rejection = Some(if heat_bound {
                RejectReason::HeatBudgetExhausted
            } else {
                RejectReason::SizeBelowOneShare
            });
        }

        let outcome = match rejection {
            Some(reason) => {
                shares = 0;
                SizingOutcome::Rejected(reason)
            }
            None => SizingOutcome::Approved,
        };

        let decision = SizingDecision {
            symbol: symbol.to_string(),
            entry_price,
            stop_loss: stop_loss_price,
            confidence,
            shares,
            risk_amount: Decimal::from(shares) * stop_distance,
            outcome,
            details: SizingDetails {
                direction,
                stop_distance,
                effective_fraction,
                target_risk,
                shares_by_risk,
                shares_by_position_cap,
                shares_by_heat,
                binding_cap,
                risk_status: self.risk_status,
            },
        };

        debug!(
            symbol = symbol,
            shares = decision.shares,
            risk_amount = %decision.risk_amount,
            binding_cap = ?binding_cap,
            risk_status = %self.risk_status,
            "Calculated position size"
        );

        Ok(decision)
    }
}

/// floor(amount / unit) as whole shares; saturates instead of overflowing
fn whole_units(amount: Decimal, unit: Decimal) -> u64 {
    if amount <= dec!(0) {
        return 0;
    }
    amount
        .checked_div(unit)
        .and_then(|q| q.floor().to_u64())
        .unwrap_or(u64::MAX)
}

/// Kelly-based position sizer and owner of the account state
#[derive(Debug, Clone)]
pub struct PositionSizer {
    limits: RiskLimits,
    kelly: KellyCalculator,
    volatility: VolatilityStopCalculator,
    account: AccountState,
    monitor: RiskLimitMonitor,
    performance: PerformanceTracker,
}

impl PositionSizer {
    /// Create a sizer for `account_size` of initial capital
    pub fn new(account_size: Decimal, limits: RiskLimits) -> Result<Self, RiskError> {
        ensure_positive("account_size", account_size)?;
        limits.validate()?;

        Ok(Self {
            kelly: KellyCalculator::new(limits.kelly_fraction, ConfidenceScaling::Linear),
            volatility: VolatilityStopCalculator::default(),
            account: AccountState::new(account_size),
            monitor: RiskLimitMonitor::new(limits.thresholds.clone()),
            performance: PerformanceTracker::new(account_size, PerformanceConfig::default()),
            limits,
        })
    }

    /// Create from a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self, RiskError> {
        config.validate()?;
        Ok(Self::new(config.account.account_size, config.limits.clone())?
            .with_confidence_scaling(config.sizing.confidence_scaling)
            .with_volatility(config.volatility.clone())
            .with_performance(config.performance.clone()))
    }

    /// Set how confidence combines with the Kelly fraction
    pub fn with_confidence_scaling(mut self, scaling: ConfidenceScaling) -> Self {
        self.kelly.scaling = scaling;
        self
    }

    /// Set ATR stop settings
    pub fn with_volatility(mut self, config: VolatilityConfig) -> Self {
        self.volatility = VolatilityStopCalculator::new(config);
        self
    }

    /// Set statistics settings
    pub fn with_performance(mut self, config: PerformanceConfig) -> Self {
        self.performance = PerformanceTracker::new(self.account.account_size, config);
        self
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    pub fn account(&self) -> &AccountState {
        &self.account
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.performance
    }

    pub fn volatility(&self) -> &VolatilityStopCalculator {
        &self.volatility
    }

    /// Risk level as sizing sees it: the latched level or worse
    pub fn risk_status(&self) -> RiskStatus {
        self.monitor.evaluate(&self.account)
    }

    /// Copy the fields sizing depends on
    pub fn sizing_snapshot(&self) -> SizingSnapshot {
        SizingSnapshot {
            limits: self.limits.clone(),
            kelly: self.kelly.clone(),
            account_size: self.account.account_size,
            committed_risk: self.account.committed_risk(),
            risk_status: self.risk_status(),
            open_symbols: self.account.positions.keys().cloned().collect(),
        }
    }

    /// Size a candidate trade against a caller-supplied stop
    pub fn calculate_position_size(
        &self,
        symbol: &str,
        entry_price: Decimal,
        stop_loss_price: Decimal,
        confidence: Decimal,
    ) -> Result<SizingDecision, RiskError> {
        self.sizing_snapshot()
            .calculate_position_size(symbol, entry_price, stop_loss_price, confidence)
    }

    /// Size a candidate trade with the stop placed from ATR
    pub fn calculate_position_size_with_atr(
        &self,
        symbol: &str,
        entry_price: Decimal,
        atr: Decimal,
        direction: Direction,
        confidence: Decimal,
    ) -> Result<AtrSizing, RiskError> {
        let stops = self.volatility.stops_for(entry_price, atr, direction)?;
        let decision =
            self.calculate_position_size(symbol, entry_price, stops.stop_loss, confidence)?;
        Ok(AtrSizing { stops, decision })
    }

    /// Open a position. Re-checks every cap; nothing changes on failure.
    pub fn open_position(&mut self, request: PositionRequest) -> Result<Position, RiskError> {
        let direction = request.validate()?;

        if self.account.has_position(&request.symbol) {
            return Err(RiskError::DuplicatePosition(request.symbol));
        }

        let status = self.risk_status();
        if !status.allows_new_positions() {
            return Err(RiskError::TradingHalted(status));
        }

        let account_size = self.account.account_size;
        let risk_amount = request.risk_amount()?;
        let max_risk = self.limits.max_risk_dollars(account_size);
        if risk_amount > max_risk {
            return Err(RiskError::RiskPerTradeExceeded {
                symbol: request.symbol,
                risk: risk_amount,
                limit: max_risk,
            });
        }

        let notional = request.notional()?;
        let max_notional = self.limits.max_position_dollars(account_size);
        if notional > max_notional {
            return Err(RiskError::PositionTooLarge {
                symbol: request.symbol,
                notional,
                limit: max_notional,
            });
        }

        let heat_after = self.account.committed_risk() + risk_amount;
        if heat_after > self.limits.max_heat_dollars(account_size) {
            return Err(RiskError::PortfolioHeatExceeded {
                heat: heat_after / account_size,
                limit: self.limits.max_portfolio_heat_pct,
            });
        }

        let position = Position {
            id: Uuid::new_v4(),
            symbol: request.symbol,
            direction,
            entry_price: request.entry_price,
            shares: request.shares,
            stop_loss: request.stop_loss,
            take_profit: request.take_profit,
            risk_amount,
            confidence: request.confidence,
            entry_time: request.entry_time,
            current_price: request.entry_price,
            unrealized_pnl: dec!(0),
        };
        self.account.insert(position.clone());
        telemetry::increment_counter(CounterMetric::PositionsOpened);
        self.after_mutation();

        info!(
            symbol = %position.symbol,
            direction = %position.direction,
            shares = position.shares,
            entry_price = %position.entry_price,
            stop_loss = %position.stop_loss,
            risk_amount = %position.risk_amount,
            "Opened position"
        );

        Ok(position)
    }

    /// Close a position, book its P&L and record the trade
    pub fn close_position(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
    ) -> Result<ClosedTrade, RiskError> {
        ensure_positive("exit_price", exit_price)?;
        let trade = self.account.close(symbol, exit_price, exit_time)?;
        self.performance.record_trade(trade.clone());
        telemetry::increment_counter(CounterMetric::PositionsClosed);
        self.after_mutation();

        info!(
            symbol = symbol,
            exit_price = %exit_price,
            realized_pnl = %trade.realized_pnl,
            equity = %self.account.current_equity,
            "Closed position"
        );

        Ok(trade)
    }

    /// Mark one open position at `price`
    pub fn update_price(&mut self, symbol: &str, price: Decimal) -> Result<RiskCheck, RiskError> {
        ensure_positive("price", price)?;
        self.account.mark(symbol, price)?;
        Ok(self.after_mutation())
    }

    /// Mark several positions at once. Either every price applies or none.
    pub fn mark_to_market<'a, I>(&mut self, prices: I) -> Result<RiskCheck, RiskError>
    where
        I: IntoIterator<Item = (&'a str, Decimal)>,
    {
        let prices: Vec<(&str, Decimal)> = prices.into_iter().collect();
        for (_, price) in &prices {
            ensure_positive("price", *price)?;
        }
        self.account.mark_all(&prices)?;
        Ok(self.after_mutation())
    }

    /// Start a new session: daily drawdown restarts from current equity.
    /// The latched risk level and peak equity are untouched.
    pub fn reset_daily_tracking(&mut self) -> RiskCheck {
        self.account.reset_daily();
        info!(
            daily_starting_equity = %self.account.daily_starting_equity,
            risk_status = %self.monitor.status(),
            "Reset daily tracking"
        );
        self.after_mutation()
    }

    /// Re-evaluate the circuit breaker
    pub fn check_risk_limits(&mut self) -> RiskCheck {
        self.after_mutation()
    }

    /// Operator action: clear the latched level down to what current
    /// readings imply
    pub fn reset_risk_status(&mut self, operator: &str) -> RiskStatus {
        let status = self.monitor.reset(&self.account, operator);
        telemetry::record_account(&self.account, status);
        status
    }

    /// Open symbols awaiting manual closure
    pub fn positions_flagged_for_closure(&self) -> Vec<String> {
        self.monitor.flagged_for_closure(&self.account)
    }

    /// Statistics over closed trades
    pub fn get_statistics(&self) -> PerformanceStats {
        self.performance.get_statistics(self.account.current_equity)
    }

    pub fn get_portfolio_heat(&self) -> Decimal {
        self.account.portfolio_heat()
    }

    pub fn get_daily_drawdown(&self) -> Decimal {
        self.account.daily_drawdown()
    }

    pub fn get_max_drawdown(&self) -> Decimal {
        self.account.max_drawdown()
    }

    fn after_mutation(&mut self) -> RiskCheck {
        let check = self.monitor.check_risk_limits(&self.account);
        if check.escalated() {
            telemetry::increment_counter(CounterMetric::RiskEscalations);
            if check.status == RiskStatus::Shutdown {
                warn!(
                    flagged = ?check.flagged_for_closure,
                    "Open positions flagged for manual closure"
                );
            }
        }
        telemetry::record_account(&self.account, check.status);
        check
    }
}
