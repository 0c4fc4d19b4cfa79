//! riskcore: risk management and position sizing for discretionary and
//! systematic equity trading
//!
//! This library provides:
//! - Kelly-based position sizing bounded by per-trade, per-position and
//!   portfolio heat caps
//! - A four-level drawdown circuit breaker
//! - Wilder ATR and volatility-derived stops
//! - Trade statistics (win rate, profit factor, Sharpe, IC)
//! - TOML configuration and structured logging

pub mod cli;
pub mod config;
pub mod risk;
pub mod telemetry;
