//! CLI interface for riskcore
//!
//! Provides subcommands for:
//! - `size`: Size one candidate trade
//! - `atr`: ATR and stop levels from a bar file
//! - `replay`: Run a trade log through the sizer and report statistics
//! - `config`: Show the effective configuration

mod atr;
mod replay;
mod size;

pub use atr::{load_bars, AtrArgs};
pub use replay::{load_trade_log, replay, ReplayArgs, ReplayReport, SkippedTrade, TradeLogRow};
pub use size::SizeArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "riskcore")]
#[command(about = "Risk management and position sizing engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Size one candidate trade
    Size(SizeArgs),
    /// Compute ATR and stops from a CSV of bars
    Atr(AtrArgs),
    /// Replay a CSV trade log through the sizer
    Replay(ReplayArgs),
    /// Show the effective configuration
    Config,
}
