//! Futures order records: filled quantity, fill time from the execution
//! event, fee from `totalFee`, and the broker's own realized P&L kept for
//! audit.

use chrono::{TimeZone, Utc};
use serde_json::json;
use tl_core::{BrokerPnl, Micros, PositionEffect, Side};
use tl_ingest::{normalize_batch, normalize_order, DataErrorKind, FeeAllocation, RawOrder};

fn order(id: &str, side: &str, effect: &str, filled: &str, state: &str) -> serde_json::Value {
    json!({
        "orderId": id,
        "accountId": "acct-1",
        "orderLegs": [{ "contractId": "c-mes-h24", "orderSide": side, "averagePrice": "5012.25" }],
        "quantity": "3",
        "filledQuantity": filled,
        "orderType": "LIMIT",
        "orderState": state,
        "positionEffectAtPlacementTime": effect,
        "orderExecutions": [{ "eventTime": "2024-03-04T15:31:07.5Z" }],
        "realizedPnl": {
            "realizedPnl": { "amount": "-12.34", "currency": "USD" },
            "realizedPnlWithoutFees": { "amount": "-10.00", "currency": "USD" }
        },
        "totalFee": { "amount": "2.34", "currency": "USD" },
        "totalCommission": { "amount": "1.50", "currency": "USD" },
        "createdAt": "2024-03-04T15:31:00Z",
        "symbol": "MESH24",
        "displaySymbol": "/MESH24"
    })
}

#[test]
fn scenario_futures_record_normalizes() {
    let batch = normalize_batch(
        &[order("f-1", "SELL", "CLOSING", "2", "FILLED")],
        FeeAllocation::PerContract,
    );
    assert!(batch.errors.is_empty());
    let e = &batch.executions[0];
    assert_eq!(e.id, "f-1:0");
    assert_eq!(e.key.as_str(), "FUT:c-mes-h24");
    assert_eq!(e.instrument.symbol(), "/MESH24");
    assert_eq!(e.side, Side::Sell);
    assert_eq!(e.effect, PositionEffect::Closing);
    assert_eq!(e.qty, 2);
    assert_eq!(e.price, Micros::new(5_012_250_000));
    assert_eq!(e.fee, Micros::from_cents(234));
    assert_eq!(
        e.ts,
        Utc.with_ymd_and_hms(2024, 3, 4, 15, 31, 7).unwrap() + chrono::Duration::milliseconds(500)
    );
    assert_eq!(
        e.broker_pnl,
        Some(BrokerPnl {
            realized: Micros::from_cents(-1_234),
            realized_without_fees: Micros::from_dollars(-10),
        })
    );
    // futures have no default multiplier; none is invented here
    assert_eq!(e.multiplier, None);
}

#[test]
fn scenario_unfilled_and_unknown_effect() {
    let mut weird = order("f-3", "BUY", "SIDEWAYS", "1", "FILLED");
    weird["orderExecutions"] = json!([]);
    let batch = normalize_batch(
        &[order("f-2", "BUY", "OPENING", "0", "CANCELLED"), weird],
        FeeAllocation::PerContract,
    );
    assert!(batch.executions.is_empty());
    assert_eq!(batch.unfilled, 1);
    assert_eq!(batch.errors[0].kind, DataErrorKind::UnknownEffect("SIDEWAYS".to_string()));
}

#[test]
fn scenario_shapes_are_told_apart() {
    let raw: RawOrder = serde_json::from_value(order("f-4", "BUY", "OPENING", "1", "FILLED")).unwrap();
    assert!(matches!(raw, RawOrder::Futures(_)));
    assert_eq!(raw.order_id(), "f-4");
    let execs = normalize_order(&raw, FeeAllocation::ByPremium).unwrap();
    assert_eq!(execs.len(), 1);
    assert_eq!(execs[0].fee, Micros::from_cents(234));
}

#[test]
fn scenario_fill_time_is_earliest_event() {
    let mut o = order("f-5", "BUY", "OPENING", "2", "FILLED");
    o["orderExecutions"] = json!([
        { "eventTime": "2024-03-04T15:40:00Z" },
        { "eventTime": "2024-03-04T15:32:00Z" },
        {}
    ]);
    let batch = normalize_batch(&[o], FeeAllocation::PerContract);
    assert!(batch.errors.is_empty());
    assert_eq!(batch.executions[0].ts, Utc.with_ymd_and_hms(2024, 3, 4, 15, 32, 0).unwrap());
}
