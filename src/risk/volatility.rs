//! Volatility-based stops
//!
//! Average True Range with Wilder smoothing, and ATR-derived stop-loss and
//! take-profit levels.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{ensure_positive, Direction, RiskError};

/// One OHLC bar. Bars are expected in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

/// Stop and target derived from ATR
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLevels {
    pub direction: Direction,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    /// |entry - stop|
    pub stop_distance: Decimal,
}

/// ATR stop calculator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityConfig {
    /// ATR lookback in bars
    pub atr_period: usize,
    /// Stop distance in ATRs
    pub atr_multiplier_stop: Decimal,
    /// Target distance as a multiple of stop distance
    pub risk_reward_ratio: Decimal,
}

impl Default for VolatilityConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            atr_multiplier_stop: dec!(2.0),
            risk_reward_ratio: dec!(2.0),
        }
    }
}

impl VolatilityConfig {
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.atr_period == 0 {
            return Err(RiskError::InvalidInput("atr_period must be at least 1".into()));
        }
        ensure_positive("atr_multiplier_stop", self.atr_multiplier_stop)?;
        ensure_positive("risk_reward_ratio", self.risk_reward_ratio)
    }
}

/// Derives ATR from bars and converts it into stops
#[derive(Debug, Clone, Default)]
pub struct VolatilityStopCalculator {
    config: VolatilityConfig,
}

impl VolatilityStopCalculator {
    pub fn new(config: VolatilityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VolatilityConfig {
        &self.config
    }

    /// Latest Wilder-smoothed ATR.
    ///
    /// Needs at least `period + 1` bars: the first bar only supplies a
    /// previous close. The seed is the mean of the first `period` true
    /// ranges, then `atr = (atr * (period - 1) + tr) / period`.
    pub fn calculate_atr(
        highs: &[Decimal],
        lows: &[Decimal],
        closes: &[Decimal],
        period: usize,
    ) -> Result<Decimal, RiskError> {
        if period == 0 {
            return Err(RiskError::InvalidInput("ATR period must be at least 1".into()));
        }
        if highs.len() != lows.len() || highs.len() != closes.len() {
            return Err(RiskError::InvalidInput(format!(
                "bar series lengths differ: {} highs, {} lows, {} closes",
                highs.len(),
                lows.len(),
                closes.len()
            )));
        }
        let required = period + 1;
        if highs.len() < required {
            return Err(RiskError::InsufficientHistory {
                required,
                available: highs.len(),
            });
        }

        let true_ranges: Vec<Decimal> = (1..highs.len())
            .map(|t| true_range(highs[t], lows[t], closes[t - 1]))
            .collect();

        let period_dec = Decimal::from(period as u64);
        let seed: Decimal = true_ranges[..period].iter().copied().sum::<Decimal>() / period_dec;
        let atr = true_ranges[period..].iter().fold(seed, |atr, tr| {
            (atr * (period_dec - Decimal::ONE) + tr) / period_dec
        });

        debug!(period, bars = highs.len(), atr = %atr, "Calculated ATR");
        Ok(atr)
    }

    /// ATR over a bar slice with the configured period
    pub fn atr_from_bars(&self, bars: &[Bar]) -> Result<Decimal, RiskError> {
        let highs: Vec<Decimal> = bars.iter().map(|b| b.high).collect();
        let lows: Vec<Decimal> = bars.iter().map(|b| b.low).collect();
        let closes: Vec<Decimal> = bars.iter().map(|b| b.close).collect();
        Self::calculate_atr(&highs, &lows, &closes, self.config.atr_period)
    }

    /// Stop and target at `atr_multiplier_stop` ATRs from entry.
    pub fn calculate_stops(
        entry_price: Decimal,
        atr: Decimal,
        direction: Direction,
        atr_multiplier_stop: Decimal,
        risk_reward_ratio: Decimal,
    ) -> Result<StopLevels, RiskError> {
        if atr <= dec!(0) {
            return Err(RiskError::ArithmeticDegenerate(format!(
                "ATR must be positive to place a stop, got {atr}"
            )));
        }
        ensure_positive("entry_price", entry_price)?;
        ensure_positive("atr_multiplier_stop", atr_multiplier_stop)?;
        ensure_positive("risk_reward_ratio", risk_reward_ratio)?;

        let stop_distance = atr * atr_multiplier_stop;
        let target_distance = stop_distance * risk_reward_ratio;
        let (stop_loss, take_profit) = match direction {
            Direction::Long => (entry_price - stop_distance, entry_price + target_distance),
            Direction::Short => (entry_price + stop_distance, entry_price - target_distance),
        };

        if stop_loss <= dec!(0) || take_profit <= dec!(0) {
            return Err(RiskError::ArithmeticDegenerate(format!(
                "stop distance {stop_distance} places a level at or below zero from entry {entry_price}"
            )));
        }

        Ok(StopLevels {
            direction,
            entry_price,
            stop_loss,
            take_profit,
            stop_distance,
        })
    }

    /// Stops using the configured multiplier and risk/reward ratio
    pub fn stops_for(
        &self,
        entry_price: Decimal,
        atr: Decimal,
        direction: Direction,
    ) -> Result<StopLevels, RiskError> {
        Self::calculate_stops(
            entry_price,
            atr,
            direction,
            self.config.atr_multiplier_stop,
            self.config.risk_reward_ratio,
        )
    }
}

fn true_range(high: Decimal, low: Decimal, prev_close: Decimal) -> Decimal {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}
