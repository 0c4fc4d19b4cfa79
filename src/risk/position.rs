//! Position tracking and account bookkeeping

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::types::{ensure_confidence, ensure_positive, Direction, RiskError};

/// An open position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Position identifier
    pub id: Uuid,
    /// Instrument symbol
    pub symbol: String,
    /// Long or short
    pub direction: Direction,
    /// Entry price
    pub entry_price: Decimal,
    /// Number of shares (always >= 1)
    pub shares: u64,
    /// Protective stop price
    pub stop_loss: Decimal,
    /// Profit target, if any
    pub take_profit: Option<Decimal>,
    /// Dollars lost if the stop is hit: shares * |entry - stop|
    pub risk_amount: Decimal,
    /// Signal confidence at entry
    pub confidence: Decimal,
    /// Entry timestamp
    pub entry_time: DateTime<Utc>,
    /// Last observed price
    pub current_price: Decimal,
    /// Current unrealized P&L
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// Notional value at entry
    pub fn notional(&self) -> Decimal {
        Decimal::from(self.shares) * self.entry_price
    }

    /// P&L if the position were closed at `price`
    pub fn pnl_at(&self, price: Decimal) -> Result<Decimal, RiskError> {
        price
            .checked_sub(self.entry_price)
            .and_then(|change| change.checked_mul(Decimal::from(self.shares)))
            .map(|pnl| pnl * self.direction.sign())
            .ok_or_else(|| overflow(&format!("P&L for {} at {price}", self.symbol)))
    }
}

fn overflow(what: &str) -> RiskError {
    RiskError::ArithmeticDegenerate(format!("{what} overflows"))
}

fn checked_total(
    values: impl IntoIterator<Item = Decimal>,
    what: &str,
) -> Result<Decimal, RiskError> {
    values
        .into_iter()
        .try_fold(dec!(0), |total, value| total.checked_add(value))
        .ok_or_else(|| overflow(what))
}

/// A request to open a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRequest {
    pub symbol: String,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Option<Decimal>,
    pub shares: u64,
    pub confidence: Decimal,
    pub entry_time: DateTime<Utc>,
}

impl PositionRequest {
    /// Check prices, shares and confidence. Returns the inferred direction.
    pub(crate) fn validate(&self) -> Result<Direction, RiskError> {
        if self.symbol.trim().is_empty() {
            return Err(RiskError::InvalidInput("symbol must not be empty".into()));
        }
        ensure_positive("entry_price", self.entry_price)?;
        ensure_positive("stop_loss", self.stop_loss)?;
        ensure_confidence(self.confidence)?;
        if self.shares == 0 {
            return Err(RiskError::InvalidInput("shares must be at least 1".into()));
        }
        self.notional()?;

        let direction = Direction::from_stop(self.entry_price, self.stop_loss).ok_or_else(|| {
            RiskError::InvalidInput("stop_loss must differ from entry_price".into())
        })?;

        if let Some(target) = self.take_profit {
            let on_profit_side = match direction {
                Direction::Long => target > self.entry_price,
                Direction::Short => target < self.entry_price && target > dec!(0),
            };
            if !on_profit_side {
                return Err(RiskError::InvalidInput(format!(
                    "take_profit {target} is not on the profit side of a {direction} entry at {}",
                    self.entry_price
                )));
            }
        }

        Ok(direction)
    }

    /// Dollar risk between entry and stop
    pub fn risk_amount(&self) -> Result<Decimal, RiskError> {
        (self.entry_price - self.stop_loss)
            .abs()
            .checked_mul(Decimal::from(self.shares))
            .ok_or_else(|| overflow(&format!("risk on {} {}", self.shares, self.symbol)))
    }

    /// Notional value at entry
    pub fn notional(&self) -> Result<Decimal, RiskError> {
        self.entry_price
            .checked_mul(Decimal::from(self.shares))
            .ok_or_else(|| overflow(&format!("notional of {} {}", self.shares, self.symbol)))
    }
}

/// A finished trade record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    /// Identifier of the position this trade closed
    pub position_id: Uuid,
    pub symbol: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub shares: u64,
    /// Realized P&L, sign-adjusted for direction
    pub realized_pnl: Decimal,
    /// Signal confidence at entry
    pub confidence: Decimal,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    /// Holding period in seconds
    pub holding_period_secs: i64,
}

impl ClosedTrade {
    /// Close `position` at `exit_price`. The exit cannot precede the entry.
    pub fn from_position(
        position: Position,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
    ) -> Result<Self, RiskError> {
        if exit_time < position.entry_time {
            return Err(RiskError::InvalidInput(format!(
                "exit_time {exit_time} precedes entry_time {} for {}",
                position.entry_time, position.symbol
            )));
        }
        let realized_pnl = position.pnl_at(exit_price)?;
        let holding_period_secs = (exit_time - position.entry_time).num_seconds();
        Ok(Self {
            position_id: position.id,
            symbol: position.symbol,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price,
            shares: position.shares,
            realized_pnl,
            confidence: position.confidence,
            entry_time: position.entry_time,
            exit_time,
            holding_period_secs,
        })
    }

    /// Time between entry and exit
    pub fn holding_period(&self) -> Duration {
        Duration::seconds(self.holding_period_secs)
    }

    /// Return on entry notional
    pub fn return_pct(&self) -> Decimal {
        let notional = Decimal::from(self.shares) * self.entry_price;
        if notional.is_zero() {
            return dec!(0);
        }
        self.realized_pnl / notional
    }

    /// Whether the trade made money
    pub fn is_win(&self) -> bool {
        self.realized_pnl > dec!(0)
    }
}

/// Whole-account bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    /// Initial capital
    pub account_size: Decimal,
    /// Account size plus realized and unrealized P&L
    pub current_equity: Decimal,
    /// High-water mark of `current_equity`
    pub peak_equity: Decimal,
    /// Equity at the start of the trading session
    pub daily_starting_equity: Decimal,
    /// Cumulative realized P&L
    pub realized_pnl: Decimal,
    /// Open positions by symbol
    pub positions: BTreeMap<String, Position>,
}

impl AccountState {
    /// Create a new account with `account_size` initial capital
    pub fn new(account_size: Decimal) -> Self {
        Self {
            account_size,
            current_equity: account_size,
            peak_equity: account_size,
            daily_starting_equity: account_size,
            realized_pnl: dec!(0),
            positions: BTreeMap::new(),
        }
    }

    /// Whether `symbol` has an open position
    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    /// Get the open position for `symbol`
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Number of open positions
    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    /// Sum of risk_amount over open positions, in dollars
    pub fn committed_risk(&self) -> Decimal {
        self.positions.values().map(|p| p.risk_amount).sum()
    }

    /// Sum of unrealized P&L over open positions
    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    /// Committed risk as a fraction of account size
    pub fn portfolio_heat(&self) -> Decimal {
        if self.account_size.is_zero() {
            return dec!(0);
        }
        self.committed_risk() / self.account_size
    }

    /// Decline from the high-water mark as a fraction of it
    pub fn max_drawdown(&self) -> Decimal {
        decline(self.peak_equity, self.current_equity)
    }

    /// Decline from the session start as a fraction of it
    pub fn daily_drawdown(&self) -> Decimal {
        decline(self.daily_starting_equity, self.current_equity)
    }

    /// Insert a validated position
    pub(crate) fn insert(&mut self, position: Position) {
        self.positions.insert(position.symbol.clone(), position);
    }

    /// Remove `symbol` and book its realized P&L.
    /// Nothing changes unless the trade and the new equity both compute.
    pub(crate) fn close(
        &mut self,
        symbol: &str,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
    ) -> Result<ClosedTrade, RiskError> {
        let position = self
            .positions
            .get(symbol)
            .ok_or_else(|| RiskError::PositionNotFound(symbol.to_string()))?;
        let trade = ClosedTrade::from_position(position.clone(), exit_price, exit_time)?;
        let realized_pnl = self
            .realized_pnl
            .checked_add(trade.realized_pnl)
            .ok_or_else(|| overflow("realized P&L"))?;
        let unrealized = checked_total(
            self.positions
                .iter()
                .filter(|(open, _)| open.as_str() != symbol)
                .map(|(_, p)| p.unrealized_pnl),
            "unrealized P&L",
        )?;
        let equity = self.equity_from(realized_pnl, unrealized)?;

        self.positions.remove(symbol);
        self.realized_pnl = realized_pnl;
        self.set_equity(equity);
        Ok(trade)
    }

    /// Mark `symbol` at `price`
    pub(crate) fn mark(&mut self, symbol: &str, price: Decimal) -> Result<(), RiskError> {
        self.mark_all(&[(symbol, price)])
    }

    /// Mark several symbols. Every P&L and the new equity are computed
    /// before any position is touched; on error nothing changes.
    pub(crate) fn mark_all(&mut self, prices: &[(&str, Decimal)]) -> Result<(), RiskError> {
        let mut marks: BTreeMap<&str, (Decimal, Decimal)> = BTreeMap::new();
        for &(symbol, price) in prices {
            let position = self
                .positions
                .get(symbol)
                .ok_or_else(|| RiskError::PositionNotFound(symbol.to_string()))?;
            marks.insert(symbol, (price, position.pnl_at(price)?));
        }
        let unrealized = checked_total(
            self.positions.iter().map(|(symbol, p)| {
                marks
                    .get(symbol.as_str())
                    .map_or(p.unrealized_pnl, |&(_, pnl)| pnl)
            }),
            "unrealized P&L",
        )?;
        let equity = self.equity_from(self.realized_pnl, unrealized)?;

        for (symbol, (price, pnl)) in marks {
            if let Some(position) = self.positions.get_mut(symbol) {
                position.current_price = price;
                position.unrealized_pnl = pnl;
            }
        }
        self.set_equity(equity);
        Ok(())
    }

    /// Start a new session at the current equity
    pub(crate) fn reset_daily(&mut self) {
        self.daily_starting_equity = self.current_equity;
    }

    fn equity_from(&self, realized: Decimal, unrealized: Decimal) -> Result<Decimal, RiskError> {
        self.account_size
            .checked_add(realized)
            .and_then(|equity| equity.checked_add(unrealized))
            .ok_or_else(|| overflow("equity"))
    }

    fn set_equity(&mut self, equity: Decimal) {
        self.current_equity = equity;
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
    }
}

/// (from - to) / from, floored at zero. Saturates when the gap overflows.
fn decline(from: Decimal, to: Decimal) -> Decimal {
    if from <= dec!(0) {
        return dec!(0);
    }
    from.checked_sub(to)
        .and_then(|gap| gap.checked_div(from))
        .unwrap_or(Decimal::MAX)
        .max(dec!(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(account: &mut AccountState, symbol: &str, entry: Decimal, stop: Decimal, shares: u64) {
        let request = PositionRequest {
            symbol: symbol.to_string(),
            entry_price: entry,
            stop_loss: stop,
            take_profit: None,
            shares,
            confidence: dec!(0.8),
            entry_time: Utc::now(),
        };
        let direction = request.validate().unwrap();
        account.insert(Position {
            id: Uuid::new_v4(),
            symbol: request.symbol.clone(),
            direction,
            entry_price: entry,
            shares,
            stop_loss: stop,
            take_profit: None,
            risk_amount: request.risk_amount().unwrap(),
            confidence: request.confidence,
            entry_time: request.entry_time,
            current_price: entry,
            unrealized_pnl: dec!(0),
        });
    }

    #[test]
    fn test_account_creation() {
        let account = AccountState::new(dec!(10000));
        assert_eq!(account.current_equity, dec!(10000));
        assert_eq!(account.peak_equity, dec!(10000));
        assert_eq!(account.daily_starting_equity, dec!(10000));
        assert_eq!(account.open_count(), 0);
        assert_eq!(account.portfolio_heat(), dec!(0));
    }

    #[test]
    fn test_committed_risk_and_heat() {
        let mut account = AccountState::new(dec!(10000));
        open(&mut account, "BHP", dec!(45), dec!(43), 22);
        open(&mut account, "RIO", dec!(120), dec!(125), 10);

        // 22 * 2 + 10 * 5 = 94
        assert_eq!(account.committed_risk(), dec!(94));
        assert_eq!(account.portfolio_heat(), dec!(0.0094));
    }

    #[test]
    fn test_close_long_profit() {
        let mut account = AccountState::new(dec!(10000));
        open(&mut account, "BHP", dec!(45), dec!(43), 20);

        let trade = account.close("BHP", dec!(50), Utc::now()).unwrap();
        assert_eq!(trade.realized_pnl, dec!(100));
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(account.current_equity, dec!(10100));
        assert_eq!(account.peak_equity, dec!(10100));
        assert!(!account.has_position("BHP"));
    }

    #[test]
    fn test_close_short_profit() {
        let mut account = AccountState::new(dec!(10000));
        open(&mut account, "RIO", dec!(120), dec!(125), 10);

        let trade = account.close("RIO", dec!(110), Utc::now()).unwrap();
        // (110 - 120) * 10 * -1 = 100
        assert_eq!(trade.realized_pnl, dec!(100));
        assert_eq!(trade.direction, Direction::Short);
    }

    #[test]
    fn test_close_unknown_symbol() {
        let mut account = AccountState::new(dec!(10000));
        let result = account.close("XYZ", dec!(1), Utc::now());
        assert_eq!(result, Err(RiskError::PositionNotFound("XYZ".into())));
        assert_eq!(account.current_equity, dec!(10000));
    }

    #[test]
    fn test_mark_updates_equity_and_drawdown() {
        let mut account = AccountState::new(dec!(10000));
        open(&mut account, "BHP", dec!(50), dec!(40), 100);

        account.mark("BHP", dec!(60)).unwrap();
        assert_eq!(account.current_equity, dec!(11000));
        assert_eq!(account.peak_equity, dec!(11000));

        account.mark("BHP", dec!(39)).unwrap();
        let position = account.position("BHP").unwrap();
        assert_eq!(position.current_price, dec!(39));
        assert_eq!(position.unrealized_pnl, dec!(-1100));
        assert_eq!(position.shares, 100);
        assert_eq!(position.stop_loss, dec!(40));
        assert_eq!(account.current_equity, dec!(8900));
        // (11000 - 8900) / 11000
        assert_eq!(account.max_drawdown(), dec!(2100) / dec!(11000));
        assert_eq!(account.daily_drawdown(), dec!(0.11));
    }

    #[test]
    fn test_peak_never_decreases() {
        let mut account = AccountState::new(dec!(1000));
        open(&mut account, "A", dec!(10), dec!(9), 10);
        account.mark("A", dec!(20)).unwrap();
        let peak = account.peak_equity;
        account.mark("A", dec!(5)).unwrap();
        assert_eq!(account.peak_equity, peak);
    }

    #[test]
    fn test_reset_daily_keeps_peak() {
        let mut account = AccountState::new(dec!(1000));
        open(&mut account, "A", dec!(10), dec!(9), 10);
        account.mark("A", dec!(5)).unwrap();
        account.reset_daily();
        assert_eq!(account.daily_starting_equity, dec!(950));
        assert_eq!(account.daily_drawdown(), dec!(0));
        assert_eq!(account.max_drawdown(), dec!(0.05));
    }

    #[test]
    fn test_request_validation() {
        let mut request = PositionRequest {
            symbol: "BHP".into(),
            entry_price: dec!(45),
            stop_loss: dec!(43),
            take_profit: Some(dec!(49)),
            shares: 10,
            confidence: dec!(0.7),
            entry_time: Utc::now(),
        };
        assert_eq!(request.validate(), Ok(Direction::Long));

        request.take_profit = Some(dec!(44));
        assert!(request.validate().is_err());

        request.take_profit = None;
        request.stop_loss = dec!(45);
        assert!(request.validate().is_err());

        request.stop_loss = dec!(43);
        request.shares = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_closed_trade_holding_period() {
        let entry_time = Utc::now();
        let position = Position {
            id: Uuid::new_v4(),
            symbol: "BHP".into(),
            direction: Direction::Long,
            entry_price: dec!(45),
            shares: 10,
            stop_loss: dec!(43),
            take_profit: None,
            risk_amount: dec!(20),
            confidence: dec!(0.8),
            entry_time,
            current_price: dec!(45),
            unrealized_pnl: dec!(0),
        };
        let trade = ClosedTrade::from_position(
            position.clone(),
            dec!(45),
            entry_time + Duration::hours(3),
        )
        .unwrap();
        assert_eq!(trade.holding_period(), Duration::hours(3));
        assert_eq!(trade.realized_pnl, dec!(0));
        assert!(!trade.is_win());
        assert_eq!(trade.return_pct(), dec!(0));

        let early = ClosedTrade::from_position(position, dec!(45), entry_time - Duration::seconds(1));
        assert!(matches!(early, Err(RiskError::InvalidInput(_))));
    }

    #[test]
    fn test_close_before_entry_leaves_account_untouched() {
        let mut account = AccountState::new(dec!(10000));
        open(&mut account, "BHP", dec!(45), dec!(43), 20);
        let entry_time = account.position("BHP").unwrap().entry_time;
        let before = account.clone();

        let result = account.close("BHP", dec!(50), entry_time - Duration::minutes(5));
        assert!(matches!(result, Err(RiskError::InvalidInput(_))));
        assert_eq!(account, before);
    }

    #[test]
    fn test_overflowing_mark_leaves_account_untouched() {
        let mut account = AccountState::new(dec!(1000000000000000));
        open(&mut account, "SYM", dec!(0.0001), dec!(0.00005), 400_000_000_000_000_000);
        open(&mut account, "BHP", dec!(45), dec!(43), 10);
        let before = account.clone();

        let result = account.mark("SYM", dec!(1000000000000));
        assert!(matches!(result, Err(RiskError::ArithmeticDegenerate(_))));
        assert_eq!(account, before);

        let result = account.mark_all(&[("BHP", dec!(50)), ("SYM", dec!(1000000000000))]);
        assert!(matches!(result, Err(RiskError::ArithmeticDegenerate(_))));
        assert_eq!(account, before);

        account.mark_all(&[("BHP", dec!(50)), ("SYM", dec!(0.0002))]).unwrap();
        // 10 * 5 + 4e17 * 0.0001
        assert_eq!(account.unrealized_pnl(), dec!(40000000000050));
    }

    #[test]
    fn test_request_with_overflowing_notional_rejected() {
        let request = PositionRequest {
            symbol: "BHP".into(),
            entry_price: dec!(10000000000000000),
            stop_loss: dec!(9000000000000000),
            take_profit: None,
            shares: u64::MAX,
            confidence: dec!(0.7),
            entry_time: Utc::now(),
        };
        assert!(matches!(
            request.validate(),
            Err(RiskError::ArithmeticDegenerate(_))
        ));
    }
}
