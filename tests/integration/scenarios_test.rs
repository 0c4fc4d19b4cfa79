//! End-to-end sizing and circuit breaker scenarios

use chrono::{Duration, TimeZone, Utc};
use riskcore::risk::{
    BindingCap, ConfidenceScaling, Direction, PositionRequest, PositionSizer, RejectReason,
    RiskError, RiskLimits, RiskStatus, VolatilityStopCalculator,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn sizer(account_size: Decimal) -> PositionSizer {
    PositionSizer::new(account_size, RiskLimits::default()).unwrap()
}

fn request(symbol: &str, entry: Decimal, stop: Decimal, shares: u64) -> PositionRequest {
    PositionRequest {
        symbol: symbol.to_string(),
        entry_price: entry,
        stop_loss: stop,
        take_profit: None,
        shares,
        confidence: dec!(0.8),
        entry_time: Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap(),
    }
}

#[test]
fn test_position_cap_binds_on_bhp() {
    let sizer = sizer(dec!(10000));
    let decision = sizer
        .calculate_position_size("BHP", dec!(45.00), dec!(43.00), dec!(0.75))
        .unwrap();

    assert_eq!(decision.details.stop_distance, dec!(2.00));
    assert_eq!(decision.details.shares_by_risk, 100);
    assert_eq!(decision.details.shares_by_position_cap, 22);
    assert_eq!(decision.details.binding_cap, BindingCap::PositionSize);
    assert_eq!(decision.shares, 22);
    assert_eq!(decision.risk_amount, dec!(44.00));
}

#[test]
fn test_flat_bars_give_degenerate_stop() {
    let n = 20;
    let highs = vec![dec!(50); n];
    let lows = vec![dec!(50); n];
    let closes = vec![dec!(50); n];

    let atr = VolatilityStopCalculator::calculate_atr(&highs, &lows, &closes, 14).unwrap();
    assert_eq!(atr, dec!(0));

    let stops = VolatilityStopCalculator::calculate_stops(
        dec!(50),
        atr,
        Direction::Long,
        dec!(2),
        dec!(2),
    );
    assert!(matches!(stops, Err(RiskError::ArithmeticDegenerate(_))));
}

#[test]
fn test_ic_tracks_confidence_ordering() {
    let mut sizer = sizer(dec!(10000));
    let start = Utc.with_ymd_and_hms(2024, 3, 4, 10, 0, 0).unwrap();

    for i in 0..10i64 {
        let confidence = Decimal::from(i + 1) / dec!(10);
        let decision = sizer
            .calculate_position_size("BHP", dec!(45), dec!(43), confidence)
            .unwrap();
        assert!(decision.is_approved(), "trade {i}: {:?}", decision.rejection());

        let entry_time = start + Duration::hours(i);
        sizer
            .open_position(decision.to_request(None, entry_time))
            .unwrap();
        // exits 41..50: P&L rises in lockstep with confidence
        let exit = dec!(41) + Decimal::from(i);
        sizer
            .close_position("BHP", exit, entry_time + Duration::minutes(30))
            .unwrap();
    }

    let stats = sizer.get_statistics();
    assert_eq!(stats.total_trades, 10);
    let ic = stats.information_coefficient.unwrap();
    assert!((ic - 1.0).abs() < 0.01, "ic = {ic}");
}

#[test]
fn test_alert_requires_confidence_and_halves_size() {
    let baseline = sizer(dec!(10000))
        .calculate_position_size("BHP", dec!(45), dec!(43), dec!(0.8))
        .unwrap();
    assert_eq!(baseline.shares, 22);

    let mut sizer = sizer(dec!(10000));
    // Short squeezed from 10 to 20: exactly 10% below peak
    sizer.open_position(request("XYZ", dec!(10), dec!(11), 100)).unwrap();
    sizer
        .close_position("XYZ", dec!(20), Utc::now())
        .unwrap();
    assert_eq!(sizer.get_max_drawdown(), dec!(0.10));
    assert_eq!(sizer.risk_status(), RiskStatus::Alert);

    let rejected = sizer
        .calculate_position_size("BHP", dec!(45), dec!(43), dec!(0.6))
        .unwrap();
    assert_eq!(rejected.shares, 0);
    assert_eq!(
        rejected.rejection().unwrap().to_string(),
        "confidence below ALERT threshold"
    );

    let halved = sizer
        .calculate_position_size("BHP", dec!(45), dec!(43), dec!(0.8))
        .unwrap();
    assert_eq!(halved.shares, baseline.shares / 2);
}

#[test]
fn test_round_trip_at_entry_restores_equity() {
    let mut sizer = sizer(dec!(10000));
    let before = sizer.account().current_equity;

    let position = sizer
        .open_position(request("BHP", dec!(45), dec!(43), 22))
        .unwrap();
    let trade = sizer
        .close_position("BHP", position.entry_price, Utc::now())
        .unwrap();

    assert_eq!(trade.realized_pnl, dec!(0));
    assert_eq!(sizer.account().current_equity, before);
    assert_eq!(sizer.account().open_count(), 0);
    assert_eq!(sizer.performance().trades().len(), 1);
}

#[test]
fn test_status_never_drops_without_reset() {
    let mut sizer = sizer(dec!(10000));
    sizer.open_position(request("A", dec!(10), dec!(11), 100)).unwrap();

    // Short marks: losses then recovery
    let marks = [
        dec!(11),
        dec!(19),
        dec!(12),
        dec!(22),
        dec!(10),
        dec!(25),
        dec!(5),
    ];
    let mut previous = RiskStatus::Normal;
    for price in marks {
        let check = sizer.update_price("A", price).unwrap();
        assert!(check.status >= previous, "dropped at {price}");
        previous = check.status;
    }
    // 1500 lost at 25: 15% daily -> CRITICAL, still latched after recovery
    assert_eq!(previous, RiskStatus::Critical);

    let status = sizer.reset_risk_status("desk-lead");
    assert_eq!(status, RiskStatus::Normal);
}

#[test]
fn test_statistics_are_idempotent() {
    let mut sizer = sizer(dec!(10000));
    sizer.open_position(request("BHP", dec!(45), dec!(43), 20)).unwrap();
    sizer.close_position("BHP", dec!(48), Utc::now()).unwrap();
    sizer.open_position(request("RIO", dec!(100), dec!(95), 5)).unwrap();
    sizer.close_position("RIO", dec!(97), Utc::now()).unwrap();

    let first = sizer.get_statistics();
    let second = sizer.get_statistics();
    assert_eq!(first, second);
    assert_eq!(first.total_trades, 2);
    assert_eq!(first.wins, 1);
    assert_eq!(first.losses, 1);
    // +60 and -15
    assert_eq!(first.profit_factor, Some(dec!(4)));
    assert_eq!(first.total_realized_pnl, dec!(45));
}

#[test]
fn test_no_trades_statistics_are_undefined() {
    let sizer = sizer(dec!(10000));
    let stats = sizer.get_statistics();
    assert_eq!(stats.total_trades, 0);
    assert_eq!(stats.sharpe_ratio, None);
    assert_eq!(stats.information_coefficient, None);
    assert!(stats.format_table().contains("undefined"));
}

#[test]
fn test_shutdown_flags_positions_and_blocks_entries() {
    let mut sizer = sizer(dec!(10000));
    for symbol in ["A", "B", "C"] {
        sizer.open_position(request(symbol, dec!(10), dec!(11), 100)).unwrap();
    }
    let check = sizer
        .mark_to_market([("A", dec!(20)), ("B", dec!(20)), ("C", dec!(20))])
        .unwrap();
    assert_eq!(check.status, RiskStatus::Shutdown);
    assert_eq!(check.flagged_for_closure, vec!["A", "B", "C"]);

    let decision = sizer
        .calculate_position_size("D", dec!(5), dec!(4), dec!(1))
        .unwrap();
    assert_eq!(decision.rejection(), Some(RejectReason::Shutdown));
    assert_eq!(
        decision.rejection().unwrap().to_string(),
        "shutdown - manual intervention required"
    );
    assert_eq!(
        sizer.open_position(request("D", dec!(5), dec!(4), 10)),
        Err(RiskError::TradingHalted(RiskStatus::Shutdown))
    );

    // Closing is always allowed
    sizer.close_position("A", dec!(20), Utc::now()).unwrap();
    assert_eq!(sizer.positions_flagged_for_closure(), vec!["B", "C"]);
}

#[test]
fn test_edge_scaling_sizes_from_win_probability() {
    let sizer = sizer(dec!(10000)).with_confidence_scaling(ConfidenceScaling::Edge {
        payoff_ratio: dec!(2),
    });

    // p = 0.3, b = 2: f* = (0.6 - 0.7) / 2 < 0
    let no_edge = sizer
        .calculate_position_size("BHP", dec!(45), dec!(43), dec!(0.3))
        .unwrap();
    assert_eq!(no_edge.shares, 0);

    // p = 0.36, b = 2: f* = 0.04, quarter Kelly 0.01 -> 100 dollars at risk
    let small = sizer
        .calculate_position_size("BHP", dec!(5), dec!(4), dec!(0.36))
        .unwrap();
    assert_eq!(small.details.effective_fraction, dec!(0.01));
    assert_eq!(small.shares, 100);
    assert_eq!(small.details.binding_cap, BindingCap::Kelly);
}
