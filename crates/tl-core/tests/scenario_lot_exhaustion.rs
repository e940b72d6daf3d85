//! BUY 2 @ $2.00 (t1), BUY 3 @ $2.00 (t2), SELL 6 @ $2.50 (t3): five units
//! match across both lots; the sixth is reported as surplus and excluded.

use chrono::{TimeZone, Utc};
use tl_core::{
    reconcile, DiagnosticKind, Execution, ExecutionLog, Instrument, Micros, PositionEffect,
    ReconcileSettings, Side,
};

fn exec(id: &str, side: Side, effect: PositionEffect, qty: i64, cents: i64, minute: u32) -> Execution {
    let instrument = Instrument::Future {
        contract_id: "abc".to_string(),
        symbol: "ABC".to_string(),
    };
    Execution {
        id: id.to_string(),
        order_id: id.to_string(),
        leg_index: 0,
        key: instrument.contract_key(),
        instrument,
        side,
        effect,
        qty,
        price: Micros::from_cents(cents),
        fee: Micros::ZERO,
        ts: Utc.with_ymd_and_hms(2024, 8, 1, 15, minute, 0).unwrap(),
        multiplier: Some(1),
        broker_pnl: None,
        strategy: None,
    }
}

#[test]
fn scenario_close_beyond_available_lots() {
    let log: ExecutionLog = vec![
        exec("lot1", Side::Buy, PositionEffect::Opening, 2, 200, 1),
        exec("lot2", Side::Buy, PositionEffect::Opening, 3, 200, 2),
        exec("close", Side::Sell, PositionEffect::Closing, 6, 250, 3),
    ]
    .into_iter()
    .collect();

    let as_of = Utc.with_ymd_and_hms(2024, 8, 2, 0, 0, 0).unwrap();
    let r = reconcile(&log, &ReconcileSettings::default(), as_of);

    let qtys: Vec<_> = r.positions.iter().map(|p| (p.open_execution_id.as_str(), p.qty)).collect();
    assert_eq!(qtys, [("lot1", 2), ("lot2", 3)]);
    assert_eq!(r.summary.realized_pnl, Micros::from_cents(250));
    assert_eq!(r.summary.open_count, 0);

    assert_eq!(r.report.unmatched_closes.len(), 1);
    assert_eq!(r.report.unmatched_closes[0].qty, 1);
    assert_eq!(r.report.unmatched_closes[0].execution_id, "close");
    assert!(r.report.orphan_closes.is_empty());

    let diags = r.report.diagnostics();
    assert_eq!(diags.len(), 1);
    assert_eq!(diags[0].kind, DiagnosticKind::MatchExhaustion);
    assert_eq!(diags[0].qty, Some(1));

    r.verify_conservation().expect("conservation");
}
