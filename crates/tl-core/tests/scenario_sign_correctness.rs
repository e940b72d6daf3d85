//! Long (debit-opened) and short (credit-opened) round trips on options.
//! Both are profitable; the sign comes from the opening direction.

use chrono::{NaiveDate, TimeZone, Utc};
use tl_core::{
    reconcile, Direction, Execution, ExecutionLog, Instrument, Micros, OptionRight,
    PositionEffect, ReconcileSettings, Side,
};

fn put(strike: i64) -> Instrument {
    Instrument::Option {
        symbol: "IWM".to_string(),
        strike: Micros::from_dollars(strike),
        expiration: NaiveDate::from_ymd_opt(2024, 5, 17).unwrap(),
        right: OptionRight::Put,
    }
}

fn exec(id: &str, instrument: Instrument, side: Side, effect: PositionEffect, cents: i64, hour: u32) -> Execution {
    Execution {
        id: id.to_string(),
        order_id: id.to_string(),
        leg_index: 0,
        key: instrument.contract_key(),
        instrument,
        side,
        effect,
        qty: 3,
        price: Micros::from_cents(cents),
        fee: Micros::ZERO,
        ts: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        multiplier: None,
        broker_pnl: None,
        strategy: None,
    }
}

#[test]
fn scenario_debit_and_credit_positions_sign_by_direction() {
    let log: ExecutionLog = vec![
        // long: buy to open @ 1.00, sell to close @ 1.50
        exec("l-open", put(200), Side::Buy, PositionEffect::Opening, 100, 14),
        exec("l-close", put(200), Side::Sell, PositionEffect::Closing, 150, 15),
        // short: sell to open @ 1.00, buy to close @ 0.60
        exec("s-open", put(190), Side::Sell, PositionEffect::Opening, 100, 14),
        exec("s-close", put(190), Side::Buy, PositionEffect::Closing, 60, 15),
    ]
    .into_iter()
    .collect();

    let as_of = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
    let r = reconcile(&log, &ReconcileSettings::default(), as_of);
    assert_eq!(r.positions.len(), 2);

    let long = r.positions.iter().find(|p| p.direction == Direction::Long).unwrap();
    let short = r.positions.iter().find(|p| p.direction == Direction::Short).unwrap();

    // +0.50 * 100 * 3
    assert_eq!(long.gross_pnl, Some(Micros::from_dollars(150)));
    assert_eq!(long.open_premium, Micros::from_dollars(300));
    assert_eq!(long.close_premium, Some(Micros::from_dollars(450)));

    // +0.40 * 100 * 3
    assert_eq!(short.gross_pnl, Some(Micros::from_dollars(120)));
    assert_eq!(short.open_premium, Micros::from_dollars(300));
    assert_eq!(short.close_premium, Some(Micros::from_dollars(180)));

    assert!(long.is_profitable() && short.is_profitable());
    assert_eq!(r.summary.realized_pnl, Micros::from_dollars(270));
}
