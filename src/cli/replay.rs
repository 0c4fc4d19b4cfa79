//! Replay command implementation
//!
//! Feeds a historical trade log through the sizer in time order: each row is
//! sized and opened at its entry time, then closed at its exit time. Session
//! boundaries (UTC calendar days) reset daily drawdown tracking.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::risk::{PerformanceStats, PositionSizer, RiskStatus};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// CSV with columns symbol,entry_time,exit_time,entry_price,stop_loss,
    /// exit_price,confidence and optional take_profit
    pub trades: PathBuf,

    /// Override the configured account size
    #[arg(long)]
    pub account_size: Option<Decimal>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl ReplayArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if let Some(account_size) = self.account_size {
            config.account.account_size = account_size;
        }
        let mut sizer = PositionSizer::from_config(&config).context("building position sizer")?;
        let rows = load_trade_log(&self.trades)?;
        let report = replay(&mut sizer, &rows)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!(
            "Replayed {} of {} trades ({} skipped)",
            report.trades_taken,
            rows.len(),
            report.skipped.len()
        );
        print!("{}", report.statistics.format_table());
        println!("Risk status:   {}", report.risk_status);
        println!("Max drawdown:  {:.2}%", report.max_drawdown * Decimal::from(100));
        for skipped in &report.skipped {
            println!(
                "  skipped {} @ {}: {}",
                skipped.symbol, skipped.entry_time, skipped.reason
            );
        }
        Ok(())
    }
}

/// One row of a trade log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogRow {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub exit_price: Decimal,
    pub confidence: Decimal,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
}

/// A log row the sizer did not take
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedTrade {
    pub symbol: String,
    pub entry_time: DateTime<Utc>,
    pub reason: String,
}

/// Outcome of a replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub trades_taken: usize,
    pub skipped: Vec<SkippedTrade>,
    pub risk_status: RiskStatus,
    pub max_drawdown: Decimal,
    pub final_equity: Decimal,
    pub statistics: PerformanceStats,
}

/// Read a trade log from a CSV file
pub fn load_trade_log(path: &Path) -> anyhow::Result<Vec<TradeLogRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open trade log {}", path.display()))?;
    let mut rows = Vec::new();
    for (i, record) in reader.deserialize::<TradeLogRow>().enumerate() {
        let line = i + 2;
        let row = record.with_context(|| format!("{}: bad trade on line {line}", path.display()))?;
        if row.exit_time < row.entry_time {
            anyhow::bail!("{}: exit before entry on line {line}", path.display());
        }
        rows.push(row);
    }
    Ok(rows)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Event {
    // Closes sort ahead of opens at the same timestamp
    Close(usize),
    Open(usize),
}

/// Run `rows` through `sizer` in event-time order
pub fn replay(sizer: &mut PositionSizer, rows: &[TradeLogRow]) -> anyhow::Result<ReplayReport> {
    let mut events: Vec<(DateTime<Utc>, Event)> = rows
        .iter()
        .enumerate()
        .flat_map(|(i, row)| [(row.entry_time, Event::Open(i)), (row.exit_time, Event::Close(i))])
        .collect();
    events.sort();

    let mut opened = vec![false; rows.len()];
    let mut skipped = Vec::new();
    let mut session: Option<NaiveDate> = None;

    for (time, event) in events {
        let day = time.date_naive();
        if session.is_some_and(|current| current != day) {
            sizer.reset_daily_tracking();
        }
        session = Some(day);

        match event {
            Event::Open(i) => {
                let row = &rows[i];
                let decision = sizer.calculate_position_size(
                    &row.symbol,
                    row.entry_price,
                    row.stop_loss,
                    row.confidence,
                );
                let outcome = decision.map_err(|e| e.to_string()).and_then(|decision| {
                    match decision.rejection() {
                        Some(reason) => Err(reason.to_string()),
                        None => sizer
                            .open_position(decision.to_request(row.take_profit, row.entry_time))
                            .map_err(|e| e.to_string()),
                    }
                });
                match outcome {
                    Ok(position) => {
                        opened[i] = true;
                        debug!(symbol = %row.symbol, shares = position.shares, "Replay open");
                    }
                    Err(reason) => skipped.push(SkippedTrade {
                        symbol: row.symbol.clone(),
                        entry_time: row.entry_time,
                        reason,
                    }),
                }
            }
            Event::Close(i) if opened[i] => {
                let row = &rows[i];
                sizer
                    .close_position(&row.symbol, row.exit_price, row.exit_time)
                    .with_context(|| format!("closing {}", row.symbol))?;
            }
            Event::Close(_) => {}
        }
    }

    let report = ReplayReport {
        trades_taken: opened.iter().filter(|taken| **taken).count(),
        skipped,
        risk_status: sizer.risk_status(),
        max_drawdown: sizer.get_max_drawdown(),
        final_equity: sizer.account().current_equity,
        statistics: sizer.get_statistics(),
    };
    info!(
        trades_taken = report.trades_taken,
        skipped = report.skipped.len(),
        risk_status = %report.risk_status,
        final_equity = %report.final_equity,
        "Replay complete"
    );
    Ok(report)
}
