//! ATR command implementation

use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::risk::{Bar, Direction, VolatilityStopCalculator};

#[derive(Args, Debug)]
pub struct AtrArgs {
    /// CSV with columns timestamp,high,low,close in chronological order
    pub bars: PathBuf,

    /// Override the configured ATR period
    #[arg(long)]
    pub period: Option<usize>,

    /// Also print stop and target for an entry at this price
    #[arg(long)]
    pub entry: Option<Decimal>,

    /// Direction for the stop levels (long/short)
    #[arg(long, default_value = "long")]
    pub direction: Direction,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl AtrArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let bars = load_bars(&self.bars)?;
        let mut settings = config.volatility.clone();
        if let Some(period) = self.period {
            settings.atr_period = period;
        }
        settings.validate()?;
        let calculator = VolatilityStopCalculator::new(settings);

        let atr = calculator.atr_from_bars(&bars)?;
        let stops = self
            .entry
            .map(|entry| calculator.stops_for(entry, atr, self.direction))
            .transpose()?;

        if self.json {
            let output = serde_json::json!({
                "bars": bars.len(),
                "period": calculator.config().atr_period,
                "atr": atr,
                "stops": stops,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }

        println!(
            "ATR({}) over {} bars: {}",
            calculator.config().atr_period,
            bars.len(),
            atr.round_dp(4)
        );
        if let Some(stops) = stops {
            println!("  Direction:   {}", stops.direction);
            println!("  Entry:       {}", stops.entry_price);
            println!("  Stop loss:   {}", stops.stop_loss.round_dp(4));
            println!("  Take profit: {}", stops.take_profit.round_dp(4));
        }
        Ok(())
    }
}

/// Read OHLC bars from a CSV file
pub fn load_bars(path: &Path) -> anyhow::Result<Vec<Bar>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open bars CSV {}", path.display()))?;
    let mut bars = Vec::new();
    for (i, record) in reader.deserialize::<Bar>().enumerate() {
        // Line 1 is the header
        let bar = record.with_context(|| format!("{}: bad bar on line {}", path.display(), i + 2))?;
        bars.push(bar);
    }
    Ok(bars)
}
