//! Risk management types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Risk management errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    /// Non-positive price, equal entry/stop, confidence outside [0, 1], etc.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// Symbol already has an open position
    #[error("Position already open for {0}")]
    DuplicatePosition(String),
    /// No open position for symbol
    #[error("No open position for {0}")]
    PositionNotFound(String),
    /// Not enough bars to compute a volatility estimate
    #[error("Insufficient history: need {required} bars, got {available}")]
    InsufficientHistory { required: usize, available: usize },
    /// No usable stop from the volatility estimate, or an amount overflows
    #[error("Arithmetic degenerate: {0}")]
    ArithmeticDegenerate(String),
    /// Position notional exceeds the per-position cap
    #[error("Position too large for {symbol}: {notional} > {limit}")]
    PositionTooLarge {
        symbol: String,
        notional: Decimal,
        limit: Decimal,
    },
    /// Dollar risk exceeds the per-trade cap
    #[error("Risk per trade exceeded for {symbol}: {risk} > {limit}")]
    RiskPerTradeExceeded {
        symbol: String,
        risk: Decimal,
        limit: Decimal,
    },
    /// Opening would push total committed risk past the heat cap
    #[error("Portfolio heat exceeded: {heat} > {limit}")]
    PortfolioHeatExceeded { heat: Decimal, limit: Decimal },
    /// New positions are blocked at this risk level
    #[error("Trading halted: {0}")]
    TradingHalted(RiskStatus),
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Profit when price rises
    Long,
    /// Profit when price falls
    Short,
}

impl Direction {
    /// Infer direction from where the protective stop sits.
    ///
    /// Returns `None` when `stop == entry`.
    pub fn from_stop(entry_price: Decimal, stop_loss: Decimal) -> Option<Self> {
        if stop_loss < entry_price {
            Some(Direction::Long)
        } else if stop_loss > entry_price {
            Some(Direction::Short)
        } else {
            None
        }
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = RiskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(Direction::Long),
            "short" | "sell" => Ok(Direction::Short),
            other => Err(RiskError::InvalidInput(format!("unknown direction '{other}'"))),
        }
    }
}

/// Circuit breaker level.
///
/// Ordered so that `a < b` means `b` is the more severe level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskStatus {
    /// Full sizing
    #[default]
    Normal,
    /// Reduced sizing, high-confidence trades only
    Alert,
    /// No new positions
    Critical,
    /// No new positions, existing ones flagged for manual closure
    Shutdown,
}

impl RiskStatus {
    /// Whether new positions may be opened at this level
    pub fn allows_new_positions(&self) -> bool {
        matches!(self, RiskStatus::Normal | RiskStatus::Alert)
    }

    /// Numeric level for gauges (0 = normal .. 3 = shutdown)
    pub fn level(&self) -> u8 {
        match self {
            RiskStatus::Normal => 0,
            RiskStatus::Alert => 1,
            RiskStatus::Critical => 2,
            RiskStatus::Shutdown => 3,
        }
    }
}

impl fmt::Display for RiskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskStatus::Normal => "NORMAL",
            RiskStatus::Alert => "ALERT",
            RiskStatus::Critical => "CRITICAL",
            RiskStatus::Shutdown => "SHUTDOWN",
        };
        f.write_str(name)
    }
}

/// Validate a strictly positive price
pub(crate) fn ensure_positive(name: &str, value: Decimal) -> Result<(), RiskError> {
    if value <= Decimal::ZERO {
        return Err(RiskError::InvalidInput(format!(
            "{name} must be positive, got {value}"
        )));
    }
    Ok(())
}

/// Validate a confidence score in [0, 1]
pub(crate) fn ensure_confidence(confidence: Decimal) -> Result<(), RiskError> {
    if confidence < Decimal::ZERO || confidence > Decimal::ONE {
        return Err(RiskError::InvalidInput(format!(
            "confidence must be within [0, 1], got {confidence}"
        )));
    }
    Ok(())
}
