//! Risk management module
//!
//! Position sizing, drawdown circuit breaker, volatility stops and
//! performance tracking

mod kelly;
mod limits;
mod performance;
mod position;
mod shared;
mod sizing;
mod types;
mod volatility;

pub use kelly::{ConfidenceScaling, KellyCalculator};
pub use limits::{DrawdownThresholds, RiskCheck, RiskLimitMonitor, RiskLimits, RiskTrigger};
pub use performance::{EquityPoint, PerformanceConfig, PerformanceStats, PerformanceTracker};
pub use position::{AccountState, ClosedTrade, Position, PositionRequest};
pub use shared::SharedPositionSizer;
pub use sizing::{
    AtrSizing, BindingCap, PositionSizer, RejectReason, SizingDecision, SizingDetails,
    SizingOutcome, SizingSnapshot,
};
pub use types::{Direction, RiskError, RiskStatus};
pub use volatility::{Bar, StopLevels, VolatilityConfig, VolatilityStopCalculator};
