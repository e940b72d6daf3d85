//! Unclosed option lots past expiration: the debit-opened one settles at a
//! full loss of its premium, the credit-opened one at a full gain.

use chrono::{NaiveDate, TimeZone, Utc};
use tl_core::{
    daily_pnl, reconcile, DateRange, Direction, Execution, ExecutionLog, Instrument, Micros,
    OptionRight, PositionEffect, PositionStatus, ReconcileSettings, Side,
};

fn opt(strike: i64, right: OptionRight) -> Instrument {
    Instrument::Option {
        symbol: "SPY".to_string(),
        strike: Micros::from_dollars(strike),
        expiration: NaiveDate::from_ymd_opt(2024, 1, 19).unwrap(),
        right,
    }
}

fn open(id: &str, instrument: Instrument, side: Side) -> Execution {
    Execution {
        id: id.to_string(),
        order_id: id.to_string(),
        leg_index: 0,
        key: instrument.contract_key(),
        instrument,
        side,
        effect: PositionEffect::Opening,
        qty: 2,
        price: Micros::from_cents(85),
        fee: Micros::from_cents(104),
        ts: Utc.with_ymd_and_hms(2024, 1, 10, 15, 30, 0).unwrap(),
        multiplier: None,
        broker_pnl: None,
        strategy: None,
    }
}

#[test]
fn scenario_expired_remainders_flip_sign_by_direction() {
    let log: ExecutionLog = vec![
        open("long-call", opt(480, OptionRight::Call), Side::Buy),
        open("short-put", opt(460, OptionRight::Put), Side::Sell),
    ]
    .into_iter()
    .collect();

    let settings = ReconcileSettings::default();
    let as_of = Utc.with_ymd_and_hms(2024, 1, 22, 14, 0, 0).unwrap();
    let r = reconcile(&log, &settings, as_of);

    assert_eq!(r.positions.len(), 2);
    assert!(r.positions.iter().all(|p| p.status == PositionStatus::Expired));

    let long = r.positions.iter().find(|p| p.direction == Direction::Long).unwrap();
    let short = r.positions.iter().find(|p| p.direction == Direction::Short).unwrap();

    // premium = 0.85 * 100 * 2 = $170
    assert_eq!(long.open_premium, Micros::from_dollars(170));
    assert_eq!(long.close_price, Some(Micros::ZERO));
    assert_eq!(long.gross_pnl, Some(Micros::from_dollars(-170)));
    assert_eq!(long.net_pnl, Some(Micros::from_cents(-17_104)));

    assert_eq!(short.gross_pnl, Some(Micros::from_dollars(170)));
    assert_eq!(short.net_pnl, Some(Micros::from_cents(16_896)));

    assert_eq!(r.summary.expired_count, 2);
    assert_eq!(r.summary.expired_pnl, Micros::from_cents(-208));

    // Expired positions exit on their expiration day in the reporting zone.
    let days = daily_pnl(&r.positions, settings.expiry.tz, DateRange::all());
    let exp = NaiveDate::from_ymd_opt(2024, 1, 19).unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[&exp].count, 2);
}

#[test]
fn scenario_before_expiration_stays_open() {
    let log: ExecutionLog = vec![open("long-call", opt(480, OptionRight::Call), Side::Buy)]
        .into_iter()
        .collect();
    let as_of = Utc.with_ymd_and_hms(2024, 1, 18, 20, 0, 0).unwrap();
    let r = reconcile(&log, &ReconcileSettings::default(), as_of);
    assert_eq!(r.positions[0].status, PositionStatus::Open);
    assert_eq!(r.summary.realized_pnl, Micros::ZERO);
    assert_eq!(r.summary.open_premium, Micros::from_dollars(170));
}

#[test]
fn scenario_expiration_date_itself_is_expired() {
    let log: ExecutionLog = vec![open("long-call", opt(480, OptionRight::Call), Side::Buy)]
        .into_iter()
        .collect();
    // Noon New York on the expiration date.
    let as_of = Utc.with_ymd_and_hms(2024, 1, 19, 17, 0, 0).unwrap();
    let r = reconcile(&log, &ReconcileSettings::default(), as_of);
    assert_eq!(r.positions[0].status, PositionStatus::Expired);
    assert_eq!(r.summary.expired_pnl, Micros::from_cents(-17_104));
}
