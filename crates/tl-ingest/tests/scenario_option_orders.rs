//! Option order records: single-leg fills, a partially filled cancelled
//! order, a two-leg spread priced from its own leg executions, and a
//! malformed record that must not take the batch down with it.

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use tl_core::{reconcile, ExecutionLog, Instrument, Micros, OptionRight, PositionEffect, ReconcileSettings, Side};
use tl_ingest::{normalize_batch, DataErrorKind, FeeAllocation};

fn single_leg(id: &str, effect: &str, side: &str, filled: &str, price: &str, state: &str) -> serde_json::Value {
    let direction = if side == "buy" { "debit" } else { "credit" };
    json!({
        "id": id,
        "chain_symbol": "aapl",
        "created_at": "2024-02-01T15:04:05.123456Z",
        "state": state,
        "direction": direction,
        "quantity": "5.00000",
        "processed_quantity": filled,
        "price": price,
        "fees": "0.10",
        "legs": [{
            "position_effect": effect,
            "side": side,
            "expiration_date": "2024-02-16",
            "strike_price": "190.0000",
            "option_type": "call",
            "ratio_quantity": 1,
            "executions": []
        }]
    })
}

#[test]
fn scenario_filled_quantity_drives_executions() {
    let records = vec![
        single_leg("o-1", "open", "buy", "5.00000", "1.2300000000", "filled"),
        // 5 requested, 4 filled before cancel
        single_leg("o-2", "close", "sell", "4.00000", "1.5000000000", "cancelled"),
        // nothing filled at all
        single_leg("o-3", "close", "sell", "0.00000", "1.5000000000", "cancelled"),
    ];
    let batch = normalize_batch(&records, FeeAllocation::PerContract);

    assert!(batch.errors.is_empty());
    assert_eq!(batch.unfilled, 1);
    assert_eq!(batch.executions.len(), 2);

    let open = &batch.executions[0];
    assert_eq!(open.id, "o-1:0");
    assert_eq!(open.qty, 5);
    assert_eq!(open.side, Side::Buy);
    assert_eq!(open.effect, PositionEffect::Opening);
    assert_eq!(open.price, Micros::from_cents(123));
    assert_eq!(open.fee, Micros::from_cents(10));
    assert_eq!(open.key.as_str(), "OPT:AAPL:2024-02-16:190000000:C");
    assert_eq!(open.ts, Utc.with_ymd_and_hms(2024, 2, 1, 15, 4, 5).unwrap() + chrono::Duration::microseconds(123_456));
    assert_eq!(open.multiplier, None);

    assert_eq!(batch.executions[1].qty, 4);
    assert_eq!(batch.executions[1].effect, PositionEffect::Closing);
}

#[test]
fn scenario_spread_legs_priced_from_leg_fills() {
    let spread = json!({
        "id": "spread-1",
        "chain_symbol": "SPY",
        "created_at": "2024-03-01T14:00:00Z",
        "processed_quantity": "2",
        "price": "1.10",
        "direction": "credit",
        "fees": "0.40",
        "opening_strategy": "short_put_spread",
        "legs": [
            {
                "position_effect": "open", "side": "sell",
                "expiration_date": "2024-03-15", "strike_price": "500.00",
                "option_type": "put", "ratio_quantity": 1,
                "executions": [
                    { "price": "3.00", "quantity": "1", "timestamp": "2024-03-01T14:00:02Z" },
                    { "price": "3.10", "quantity": "1", "timestamp": "2024-03-01T14:00:01Z" }
                ]
            },
            {
                "position_effect": "open", "side": "buy",
                "expiration_date": "2024-03-15", "strike_price": "495.00",
                "option_type": "put", "ratio_quantity": 1,
                "executions": [
                    { "price": "1.95", "quantity": "2", "timestamp": "2024-03-01T14:00:01Z" }
                ]
            }
        ]
    });

    let flat = normalize_batch(&[spread.clone()], FeeAllocation::PerContract);
    assert!(flat.errors.is_empty());
    let [short, long] = &flat.executions[..] else {
        panic!("expected two legs, got {:?}", flat.executions);
    };
    assert_eq!(short.side, Side::Sell);
    assert_eq!(short.strategy.as_deref(), Some("short_put_spread"));
    assert_eq!(long.strategy.as_deref(), Some("short_put_spread"));
    assert_eq!(short.price, Micros::new(3_050_000));
    assert_eq!(short.qty, 2);
    assert_eq!(short.ts, Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 1).unwrap());
    assert_eq!(long.price, Micros::from_cents(195));
    assert_eq!(
        long.instrument,
        Instrument::Option {
            symbol: "SPY".to_string(),
            strike: Micros::from_dollars(495),
            expiration: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            right: OptionRight::Put,
        }
    );
    // flat per contract: 2 + 2 contracts
    assert_eq!(short.fee, Micros::from_cents(20));
    assert_eq!(long.fee, Micros::from_cents(20));

    // by premium: 6.10 vs 3.90 of weight
    let weighted = normalize_batch(&[spread], FeeAllocation::ByPremium);
    let fees: Vec<_> = weighted.executions.iter().map(|e| e.fee).collect();
    assert_eq!(fees, [Micros::new(244_000), Micros::new(156_000)]);
}

#[test]
fn scenario_bad_records_are_isolated() {
    let mut bad_ts = single_leg("bad-ts", "open", "buy", "1", "1.00", "filled");
    bad_ts["created_at"] = json!("not a time");
    let mut no_strike = single_leg("no-strike", "open", "buy", "1", "1.00", "filled");
    no_strike["legs"][0]["strike_price"] = serde_json::Value::Null;

    let records = vec![
        json!({ "unexpected": true }),
        bad_ts,
        no_strike,
        single_leg("ok", "open", "buy", "1", "1.00", "filled"),
    ];
    let batch = normalize_batch(&records, FeeAllocation::PerContract);

    assert_eq!(batch.executions.len(), 1);
    assert_eq!(batch.executions[0].order_id, "ok");
    assert_eq!(batch.errors.len(), 3);

    assert_eq!(batch.errors[0].execution_ref, "record[0]");
    assert!(matches!(batch.errors[0].kind, DataErrorKind::Malformed(_)));
    assert_eq!(batch.errors[1].execution_ref, "bad-ts");
    assert!(matches!(
        batch.errors[1].kind,
        DataErrorKind::InvalidTimestamp { field: "created_at", .. }
    ));
    assert_eq!(batch.errors[2].execution_ref, "no-strike:0");
    assert_eq!(batch.errors[2].kind, DataErrorKind::MissingField("strike_price"));
}

#[test]
fn scenario_strategy_tag_survives_reconciliation() {
    let mut open = single_leg("sp-1", "open", "sell", "1", "2.00", "filled");
    open["opening_strategy"] = json!("short_call_spread");
    let mut hedge = single_leg("sp-1b", "open", "buy", "1", "0.50", "filled");
    hedge["legs"][0]["strike_price"] = json!("195.0000");
    hedge["opening_strategy"] = json!("  ");
    hedge["closing_strategy"] = json!("Short_Call_Spread");
    let plain = single_leg("lc-1", "open", "buy", "1", "1.00", "filled");

    let batch = normalize_batch(&[open, hedge, plain], FeeAllocation::PerContract);
    assert!(batch.errors.is_empty());
    assert_eq!(batch.executions[2].strategy, None);

    let mut log = ExecutionLog::new();
    log.merge(batch.executions);
    let as_of = Utc.with_ymd_and_hms(2024, 2, 2, 0, 0, 0).unwrap();
    let rec = reconcile(&log, &ReconcileSettings::default(), as_of);

    let tag = |id: &str| {
        rec.positions
            .iter()
            .find(|p| p.open_execution_id == id)
            .map(|p| (p.strategy.clone(), p.is_spread()))
    };
    assert_eq!(tag("sp-1:0"), Some((Some("short_call_spread".to_string()), true)));
    assert_eq!(tag("sp-1b:0"), Some((Some("Short_Call_Spread".to_string()), true)));
    assert_eq!(tag("lc-1:0"), Some((None, false)));
}
