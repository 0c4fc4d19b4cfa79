//! Closed-trade history and performance statistics

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::position::ClosedTrade;

/// Performance statistics settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Multiplier under the square root when annualizing the per-trade
    /// Sharpe ratio. 252 assumes roughly one trade per trading day.
    pub annualization_factor: f64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            annualization_factor: 252.0,
        }
    }
}

/// A point on the realized equity curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: Decimal,
}

/// Statistics snapshot. `None` marks a value that is undefined for the
/// current history (e.g. profit factor without losses).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub profit_factor: Option<Decimal>,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub largest_win: Decimal,
    pub largest_loss: Decimal,
    pub total_realized_pnl: Decimal,
    pub sharpe_ratio: Option<f64>,
    pub information_coefficient: Option<f64>,
    pub account_return: Decimal,
    /// Deepest decline along the realized equity curve, as a fraction
    pub curve_max_drawdown: Decimal,
}

impl PerformanceStats {
    /// Format as table for CLI output
    pub fn format_table(&self) -> String {
        format!(
            r#"
══════════════════════════════════════════════════════
               PERFORMANCE
══════════════════════════════════════════════════════

RETURNS
───────────────────────────────────────────────────────
Realized P&L:     {:+.2}
Account Return:   {:+.2}%
Curve Drawdown:   {:.2}%
Sharpe Ratio:     {}
Info Coefficient: {}

TRADES
───────────────────────────────────────────────────────
Total Trades:     {}
Win Rate:         {:.1}%
Profit Factor:    {}
Avg Win:          {:.2}
Avg Loss:         {:.2}
Largest Win:      {:.2}
Largest Loss:     {:.2}
══════════════════════════════════════════════════════
"#,
            self.total_realized_pnl,
            self.account_return * dec!(100),
            self.curve_max_drawdown * dec!(100),
            fmt_optional_f64(self.sharpe_ratio),
            fmt_optional_f64(self.information_coefficient),
            self.total_trades,
            self.win_rate * dec!(100),
            self.profit_factor
                .map(|pf| format!("{pf:.2}"))
                .unwrap_or_else(|| "undefined".to_string()),
            self.avg_win,
            self.avg_loss,
            self.largest_win,
            self.largest_loss,
        )
    }
}

fn fmt_optional_f64(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:.2}"))
        .unwrap_or_else(|| "undefined".to_string())
}

/// Maintains the closed-trade history and realized equity curve
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    account_size: Decimal,
    config: PerformanceConfig,
    trades: Vec<ClosedTrade>,
    equity_curve: Vec<EquityPoint>,
}

impl PerformanceTracker {
    pub fn new(account_size: Decimal, config: PerformanceConfig) -> Self {
        Self {
            account_size,
            config,
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    /// Append a closed trade. History is never reordered.
    pub fn record_trade(&mut self, trade: ClosedTrade) {
        let previous = self
            .equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(self.account_size);
        self.equity_curve.push(EquityPoint {
            timestamp: trade.exit_time,
            equity: previous + trade.realized_pnl,
        });
        self.trades.push(trade);
    }

    pub fn trades(&self) -> &[ClosedTrade] {
        &self.trades
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// Statistics over the history; `current_equity` drives `account_return`.
    pub fn get_statistics(&self, current_equity: Decimal) -> PerformanceStats {
        let total_trades = self.trades.len();
        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut gross_profit = dec!(0);
        let mut gross_loss = dec!(0);
        let mut largest_win = dec!(0);
        let mut largest_loss = dec!(0);

        for trade in &self.trades {
            let pnl = trade.realized_pnl;
            if pnl > dec!(0) {
                wins += 1;
                gross_profit += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < dec!(0) {
                losses += 1;
                gross_loss += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            }
        }

        let win_rate = ratio(Decimal::from(wins as u64), Decimal::from(total_trades as u64));
        let profit_factor = if gross_loss.is_zero() {
            None
        } else {
            Some(gross_profit / gross_loss)
        };

        PerformanceStats {
            total_trades,
            wins,
            losses,
            win_rate,
            gross_profit,
            gross_loss,
            profit_factor,
            avg_win: ratio(gross_profit, Decimal::from(wins as u64)),
            avg_loss: ratio(gross_loss, Decimal::from(losses as u64)),
            largest_win,
            largest_loss,
            total_realized_pnl: gross_profit - gross_loss,
            sharpe_ratio: self.sharpe_ratio(),
            information_coefficient: self.information_coefficient(),
            account_return: ratio(current_equity - self.account_size, self.account_size),
            curve_max_drawdown: self.curve_max_drawdown(),
        }
    }

    /// mean / stdev of per-trade returns, scaled by sqrt(annualization_factor)
    fn sharpe_ratio(&self) -> Option<f64> {
        let returns: Vec<f64> = self
            .trades
            .iter()
            .filter_map(|t| t.return_pct().to_f64())
            .collect();
        if returns.len() < 2 {
            return None;
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let std_dev = variance.sqrt();
        if std_dev <= f64::EPSILON {
            return None;
        }

        Some(mean / std_dev * self.config.annualization_factor.sqrt())
    }

    /// Spearman rank correlation of confidence against realized P&L
    fn information_coefficient(&self) -> Option<f64> {
        if self.trades.len() < 2 {
            return None;
        }
        let confidence: Vec<f64> = self
            .trades
            .iter()
            .map(|t| t.confidence.to_f64().unwrap_or(0.0))
            .collect();
        let outcome: Vec<f64> = self
            .trades
            .iter()
            .map(|t| t.realized_pnl.to_f64().unwrap_or(0.0))
            .collect();
        spearman(&confidence, &outcome)
    }

    fn curve_max_drawdown(&self) -> Decimal {
        let mut peak = self.account_size;
        let mut deepest = dec!(0);
        for point in &self.equity_curve {
            peak = peak.max(point.equity);
            if peak > dec!(0) {
                deepest = deepest.max((peak - point.equity) / peak);
            }
        }
        deepest
    }
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator.is_zero() {
        dec!(0)
    } else {
        numerator / denominator
    }
}

/// Spearman correlation: Pearson correlation of average ranks
pub(crate) fn spearman(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    pearson(&ranks(xs), &ranks(ys))
}

/// 1-based ranks, ties share the mean of their positions
fn ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // positions i..=j are tied
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x <= f64::EPSILON || var_y <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_x.sqrt() * var_y.sqrt()))
}
