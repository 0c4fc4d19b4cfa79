//! Size command implementation

use anyhow::Context;
use clap::{ArgGroup, Args};
use rust_decimal::Decimal;

use crate::config::Config;
use crate::risk::{Direction, PositionSizer, SizingDecision, StopLevels};

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("stop_source").required(true).args(["stop", "atr"])))]
pub struct SizeArgs {
    /// Instrument symbol
    pub symbol: String,

    /// Planned entry price
    #[arg(long)]
    pub entry: Decimal,

    /// Protective stop price; side of entry sets the direction
    #[arg(long)]
    pub stop: Option<Decimal>,

    /// Place the stop from this ATR instead
    #[arg(long, requires = "direction")]
    pub atr: Option<Decimal>,

    /// Trade direction when sizing from ATR (long/short)
    #[arg(long)]
    pub direction: Option<Direction>,

    /// Signal confidence in [0, 1]
    #[arg(long)]
    pub confidence: Decimal,

    /// Override the configured account size
    #[arg(long)]
    pub account_size: Option<Decimal>,

    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

impl SizeArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut config = config.clone();
        if let Some(account_size) = self.account_size {
            config.account.account_size = account_size;
        }
        let sizer = PositionSizer::from_config(&config).context("building position sizer")?;

        let (decision, stops) = match (self.stop, self.atr, self.direction) {
            (Some(stop), _, _) => (
                sizer.calculate_position_size(&self.symbol, self.entry, stop, self.confidence)?,
                None,
            ),
            (None, Some(atr), Some(direction)) => {
                let sizing = sizer.calculate_position_size_with_atr(
                    &self.symbol,
                    self.entry,
                    atr,
                    direction,
                    self.confidence,
                )?;
                (sizing.decision, Some(sizing.stops))
            }
            _ => anyhow::bail!("either --stop or --atr with --direction is required"),
        };

        if self.json {
            let output = serde_json::json!({
                "decision": decision,
                "stops": stops,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print!("{}", format_decision(&decision, stops.as_ref()));
        }

        Ok(())
    }
}

fn format_decision(decision: &SizingDecision, stops: Option<&StopLevels>) -> String {
    let details = &decision.details;
    let mut out = String::new();
    out.push_str("┌──────────────────────────────────────┐\n");
    out.push_str(&format!(
        "│ {:<10} {:>25} │\n",
        decision.symbol,
        details.direction.to_string()
    ));
    out.push_str("├──────────────────────────────────────┤\n");
    let mut row = |label: &str, value: String| {
        out.push_str(&format!("│ {:<20} {:>15} │\n", label, value));
    };
    row("Entry", decision.entry_price.to_string());
    row("Stop", decision.stop_loss.to_string());
    if let Some(stops) = stops {
        row("Target", stops.take_profit.to_string());
    }
    row("Confidence", decision.confidence.to_string());
    row("Risk status", details.risk_status.to_string());
    row("Kelly fraction", details.effective_fraction.round_dp(4).to_string());
    row("Target risk", details.target_risk.round_dp(2).to_string());
    row("By risk", details.shares_by_risk.to_string());
    row("By position cap", details.shares_by_position_cap.to_string());
    row("By heat", details.shares_by_heat.to_string());
    row("Binding cap", format!("{:?}", details.binding_cap));
    row("Shares", decision.shares.to_string());
    row("Risk amount", decision.risk_amount.round_dp(2).to_string());
    if let Some(reason) = decision.rejection() {
        row("Rejected", reason.to_string());
    }
    out.push_str("└──────────────────────────────────────┘\n");
    out
}
