//! Property tests for sizing and circuit breaker invariants.
//!
//! Uses proptest to verify:
//! 1. Every sizing decision respects the per-trade, per-position and heat caps
//! 2. risk_amount is always shares times stop distance
//! 3. Sizing never mutates state and is deterministic
//! 4. The risk level only rises under price updates

use chrono::Utc;
use proptest::prelude::*;
use riskcore::risk::{
    PositionRequest, PositionSizer, RiskLimits, RiskStatus, VolatilityStopCalculator,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ── Strategies (proptest) ────────────────────────────────────────────

/// Price in cents between 1.00 and 1000.00
fn arb_price() -> impl Strategy<Value = Decimal> {
    (100i64..100_000).prop_map(|cents| Decimal::new(cents, 2))
}

fn arb_confidence() -> impl Strategy<Value = Decimal> {
    (0i64..=100).prop_map(|pct| Decimal::new(pct, 2))
}

fn arb_account() -> impl Strategy<Value = Decimal> {
    (1_000i64..10_000_000).prop_map(Decimal::from)
}

fn sizer(account_size: Decimal) -> PositionSizer {
    PositionSizer::new(account_size, RiskLimits::default()).unwrap()
}

// ── 1-2. Caps and risk identity ──────────────────────────────────────

proptest! {
    #[test]
    fn sizing_respects_caps(
        account in arb_account(),
        entry in arb_price(),
        stop in arb_price(),
        confidence in arb_confidence(),
    ) {
        prop_assume!(entry != stop);
        let sizer = sizer(account);
        let limits = RiskLimits::default();
        let decision = sizer
            .calculate_position_size("SYM", entry, stop, confidence)
            .unwrap();

        let distance = (entry - stop).abs();
        let shares = Decimal::from(decision.shares);
        prop_assert_eq!(decision.risk_amount, shares * distance);
        prop_assert!(decision.risk_amount <= limits.max_risk_per_trade_pct * account);
        prop_assert!(decision.risk_amount <= limits.kelly_fraction * confidence * account);
        prop_assert!(shares * entry <= limits.max_position_pct * account);
        prop_assert!(decision.risk_amount <= limits.max_portfolio_heat_pct * account);
        prop_assert_eq!(decision.is_approved(), decision.shares > 0);
    }

    #[test]
    fn zero_confidence_means_zero_shares(
        entry in arb_price(),
        stop in arb_price(),
    ) {
        prop_assume!(entry != stop);
        let decision = sizer(dec!(10000))
            .calculate_position_size("SYM", entry, stop, dec!(0))
            .unwrap();
        prop_assert_eq!(decision.shares, 0);
        prop_assert_eq!(decision.risk_amount, dec!(0));
    }

    #[test]
    fn approved_decisions_open_cleanly(
        entry in arb_price(),
        stop in arb_price(),
        confidence in arb_confidence(),
    ) {
        prop_assume!(entry != stop);
        let mut sizer = sizer(dec!(100000));
        let decision = sizer
            .calculate_position_size("SYM", entry, stop, confidence)
            .unwrap();
        prop_assume!(decision.is_approved());

        let position = sizer.open_position(decision.to_request(None, Utc::now())).unwrap();
        prop_assert_eq!(position.shares, decision.shares);
        prop_assert_eq!(position.risk_amount, decision.risk_amount);
    }
}

// ── 3. Sizing is pure ────────────────────────────────────────────────

proptest! {
    #[test]
    fn sizing_is_pure(
        entry in arb_price(),
        stop in arb_price(),
        confidence in arb_confidence(),
    ) {
        prop_assume!(entry != stop);
        let sizer = sizer(dec!(50000));
        let before = sizer.account().clone();
        let first = sizer.calculate_position_size("SYM", entry, stop, confidence);
        let second = sizer.calculate_position_size("SYM", entry, stop, confidence);
        prop_assert_eq!(first, second);
        prop_assert_eq!(sizer.account(), &before);
    }
}

// ── 4. Monotone risk level ───────────────────────────────────────────

proptest! {
    #[test]
    fn status_is_monotone_under_marks(prices in prop::collection::vec(arb_price(), 1..40)) {
        let mut sizer = sizer(dec!(10000));
        sizer
            .open_position(PositionRequest {
                symbol: "SYM".into(),
                entry_price: dec!(10),
                stop_loss: dec!(9),
                take_profit: None,
                shares: 100,
                confidence: dec!(0.9),
                entry_time: Utc::now(),
            })
            .unwrap();

        let mut previous = RiskStatus::Normal;
        for price in prices {
            let check = sizer.update_price("SYM", price).unwrap();
            prop_assert!(check.status >= previous);
            prop_assert!(sizer.account().peak_equity >= sizer.account().current_equity);
            previous = check.status;
        }
    }

    #[test]
    fn atr_is_non_negative(
        bars in prop::collection::vec((arb_price(), arb_price()), 15..60),
    ) {
        let highs: Vec<Decimal> = bars.iter().map(|(a, b)| (*a).max(*b)).collect();
        let lows: Vec<Decimal> = bars.iter().map(|(a, b)| (*a).min(*b)).collect();
        let closes: Vec<Decimal> = bars.iter().map(|(a, _)| *a).collect();
        let atr = VolatilityStopCalculator::calculate_atr(&highs, &lows, &closes, 14).unwrap();
        prop_assert!(atr >= dec!(0));
    }
}
