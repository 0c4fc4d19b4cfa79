//! Concurrent use of the shared sizer handle

use chrono::Utc;
use riskcore::risk::{PositionSizer, RiskLimits, SharedPositionSizer};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::thread;

fn shared() -> SharedPositionSizer {
    PositionSizer::new(dec!(100000), RiskLimits::default())
        .unwrap()
        .into()
}

#[test]
fn test_concurrent_opens_respect_heat_cap() {
    let sizer = shared();

    // 20 threads race for up to 500 dollars of risk each against a 6000 cap
    let handles: Vec<_> = (0..20)
        .map(|i| {
            let sizer = sizer.clone();
            thread::spawn(move || {
                let symbol = format!("SYM{i}");
                let decision = sizer
                    .calculate_position_size(&symbol, dec!(20), dec!(19), dec!(0.08))
                    .unwrap();
                if !decision.is_approved() {
                    return false;
                }
                sizer
                    .open_position(decision.to_request(None, Utc::now()))
                    .is_ok()
            })
        })
        .collect();

    let opened = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    let account = sizer.account();
    assert_eq!(account.open_count(), opened);
    assert!(opened > 0);
    assert!(account.committed_risk() <= dec!(6000));
}

#[test]
fn test_concurrent_marks_and_closes_keep_books_consistent() {
    let sizer = shared();
    for i in 0..8 {
        let decision = sizer
            .calculate_position_size(&format!("SYM{i}"), dec!(50), dec!(48), dec!(0.9))
            .unwrap();
        sizer
            .open_position(decision.to_request(None, Utc::now()))
            .unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let sizer = sizer.clone();
            thread::spawn(move || {
                let symbol = format!("SYM{i}");
                for step in 0..10 {
                    sizer
                        .update_price(&symbol, dec!(50) + Decimal::from(step % 3))
                        .unwrap();
                    let _ = sizer.get_portfolio_heat();
                }
                sizer.close_position(&symbol, dec!(51), Utc::now()).unwrap()
            })
        })
        .collect();

    let realized: Decimal = handles
        .into_iter()
        .map(|h| h.join().unwrap().realized_pnl)
        .sum();

    let account = sizer.account();
    assert_eq!(account.open_count(), 0);
    assert_eq!(account.realized_pnl, realized);
    assert_eq!(account.current_equity, dec!(100000) + realized);
    assert_eq!(sizer.get_statistics().total_trades, 8);
}
