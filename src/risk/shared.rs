//! Thread-safe sizer handle
//!
//! Mutations serialize on one mutex. Sizing copies a [`SizingSnapshot`]
//! under the lock and computes outside it, so concurrent sizing calls never
//! observe a half-applied open or close.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::limits::RiskCheck;
use super::performance::PerformanceStats;
use super::position::{AccountState, ClosedTrade, Position, PositionRequest};
use super::sizing::{AtrSizing, PositionSizer, SizingDecision, SizingSnapshot};
use super::types::{Direction, RiskError, RiskStatus};

/// Cloneable handle to a [`PositionSizer`] shared across threads
#[derive(Debug, Clone)]
pub struct SharedPositionSizer {
    inner: Arc<Mutex<PositionSizer>>,
}

impl SharedPositionSizer {
    pub fn new(sizer: PositionSizer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sizer)),
        }
    }

    // Mutations compute every amount with checked arithmetic before writing,
    // so a poisoned guard still holds consistent books.
    fn lock(&self) -> MutexGuard<'_, PositionSizer> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent copy of the sizing inputs
    pub fn snapshot(&self) -> SizingSnapshot {
        self.lock().sizing_snapshot()
    }

    pub fn calculate_position_size(
        &self,
        symbol: &str,
        entry_price: Decimal,
        stop_loss_price: Decimal,
        confidence: Decimal,
    ) -> Result<SizingDecision, RiskError> {
        self.snapshot()
            .calculate_position_size(symbol, entry_price, stop_loss_price, confidence)
    }

    pub fn calculate_position_size_with_atr(
        &self,
        symbol: &str,
        entry_price: Decimal,
        atr: Decimal,
        direction: Direction,
        confidence: Decimal,
    ) -> Result<AtrSizing, RiskError> {
        let (stops, snapshot) = {
            let sizer = self.lock();
            let stops = sizer.volatility().stops_for(entry_price, atr, direction)?;
            (stops, sizer.sizing_snapshot())
        };
        let decision =
            snapshot.calculate_position_size(symbol, entry_price, stops.stop_loss, confidence)?;
        Ok(AtrSizing { stops, decision })
    }

    pub fn open_position(&self, request: PositionRequest) -> Result<Position, RiskError> {
        self.lock().open_position(request)
    }

    pub fn close_position(
        &self,
        symbol: &str,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
    ) -> Result<ClosedTrade, RiskError> {
        self.lock().close_position(symbol, exit_price, exit_time)
    }

    pub fn update_price(&self, symbol: &str, price: Decimal) -> Result<RiskCheck, RiskError> {
        self.lock().update_price(symbol, price)
    }

    pub fn reset_daily_tracking(&self) -> RiskCheck {
        self.lock().reset_daily_tracking()
    }

    pub fn check_risk_limits(&self) -> RiskCheck {
        self.lock().check_risk_limits()
    }

    pub fn reset_risk_status(&self, operator: &str) -> RiskStatus {
        self.lock().reset_risk_status(operator)
    }

    pub fn risk_status(&self) -> RiskStatus {
        self.lock().risk_status()
    }

    /// Copy of the account state
    pub fn account(&self) -> AccountState {
        self.lock().account().clone()
    }

    pub fn get_statistics(&self) -> PerformanceStats {
        self.lock().get_statistics()
    }

    pub fn get_portfolio_heat(&self) -> Decimal {
        self.lock().get_portfolio_heat()
    }
}

impl From<PositionSizer> for SharedPositionSizer {
    fn from(sizer: PositionSizer) -> Self {
        Self::new(sizer)
    }
}
