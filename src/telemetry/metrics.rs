//! Account and risk metrics
//!
//! Recorded through the `metrics` facade. Without an installed recorder
//! every call is a no-op.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::risk::{AccountState, RiskStatus};

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// Current equity
    Equity,
    /// High-water mark
    PeakEquity,
    /// Unrealized P&L
    UnrealizedPnl,
    /// Realized P&L
    RealizedPnl,
    /// Open position count
    OpenPositions,
    /// Committed risk over account size
    PortfolioHeat,
    /// Decline from peak equity
    MaxDrawdown,
    /// Decline from session start equity
    DailyDrawdown,
    /// 0 = NORMAL .. 3 = SHUTDOWN
    RiskStatus,
}

impl GaugeMetric {
    fn name(self) -> &'static str {
        match self {
            GaugeMetric::Equity => "riskcore_equity",
            GaugeMetric::PeakEquity => "riskcore_peak_equity",
            GaugeMetric::UnrealizedPnl => "riskcore_unrealized_pnl",
            GaugeMetric::RealizedPnl => "riskcore_realized_pnl",
            GaugeMetric::OpenPositions => "riskcore_open_positions",
            GaugeMetric::PortfolioHeat => "riskcore_portfolio_heat",
            GaugeMetric::MaxDrawdown => "riskcore_max_drawdown",
            GaugeMetric::DailyDrawdown => "riskcore_daily_drawdown",
            GaugeMetric::RiskStatus => "riskcore_risk_status",
        }
    }
}

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    PositionsOpened,
    PositionsClosed,
    /// Upward circuit breaker transitions
    RiskEscalations,
}

impl CounterMetric {
    fn name(self) -> &'static str {
        match self {
            CounterMetric::PositionsOpened => "riskcore_positions_opened_total",
            CounterMetric::PositionsClosed => "riskcore_positions_closed_total",
            CounterMetric::RiskEscalations => "riskcore_risk_escalations_total",
        }
    }
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    ::metrics::gauge!(metric.name()).set(value);
}

/// Increment a counter by one
pub fn increment_counter(metric: CounterMetric) {
    ::metrics::counter!(metric.name()).increment(1);
}

/// Publish the account and risk level gauges
pub fn record_account(account: &AccountState, status: RiskStatus) {
    let readings = [
        (GaugeMetric::Equity, to_f64(account.current_equity)),
        (GaugeMetric::PeakEquity, to_f64(account.peak_equity)),
        (GaugeMetric::UnrealizedPnl, to_f64(account.unrealized_pnl())),
        (GaugeMetric::RealizedPnl, to_f64(account.realized_pnl)),
        (GaugeMetric::OpenPositions, account.open_count() as f64),
        (GaugeMetric::PortfolioHeat, to_f64(account.portfolio_heat())),
        (GaugeMetric::MaxDrawdown, to_f64(account.max_drawdown())),
        (GaugeMetric::DailyDrawdown, to_f64(account.daily_drawdown())),
        (GaugeMetric::RiskStatus, f64::from(status.level())),
    ];
    for (metric, value) in readings {
        set_gauge(metric, value);
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}
