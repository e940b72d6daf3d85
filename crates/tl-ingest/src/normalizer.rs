//! Raw broker orders to engine executions.
//!
//! One execution per filled leg. Quantities are always the filled amount,
//! never the requested amount; an order with nothing filled yields nothing.
//! The order-level fee is split across legs by the configured
//! [`FeeAllocation`] policy, and later across matched units by the engine.
//!
//! A record that fails anywhere is rejected whole with a [`DataError`]; the
//! rest of the batch continues.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use tl_core::{
    BrokerPnl, Execution, Instrument, Micros, OptionRight, PositionEffect, Side,
};

use crate::error::{DataError, DataErrorKind};
use crate::price::{parse_decimal, parse_decimal_opt, parse_quantity};
use crate::raw::{reference_of, RawAmount, RawFuturesOrder, RawOptionOrder, RawOrder};

/// How an order-level fee is divided between the legs of one order.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeAllocation {
    /// Flat per filled contract.
    #[default]
    PerContract,
    /// Proportional to each leg's premium (price × quantity).
    ByPremium,
}

impl FeeAllocation {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "per_contract" => Some(FeeAllocation::PerContract),
            "by_premium" => Some(FeeAllocation::ByPremium),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeeAllocation::PerContract => "per_contract",
            FeeAllocation::ByPremium => "by_premium",
        }
    }
}

/// Split `total` proportionally to `weights`.
///
/// Shares are truncated toward zero; the last share takes the remainder, so
/// the result always sums to exactly `total`. All-zero weights split evenly.
pub fn allocate_fee(total: Micros, weights: &[i128]) -> Vec<Micros> {
    if weights.is_empty() {
        return Vec::new();
    }
    let even = vec![1i128; weights.len()];
    let weights = if weights.iter().all(|w| *w <= 0) {
        &even[..]
    } else {
        weights
    };
    let sum: i128 = weights.iter().map(|w| (*w).max(0)).sum();

    let mut out = Vec::with_capacity(weights.len());
    let mut left = total;
    for (i, w) in weights.iter().enumerate() {
        if i + 1 == weights.len() {
            out.push(left);
            break;
        }
        let share = (total.raw() as i128) * (*w).max(0) / sum;
        let share = Micros::new(i64::try_from(share).unwrap_or(0));
        left -= share;
        out.push(share);
    }
    out
}

/// Parse a broker timestamp into UTC.
///
/// RFC 3339 with offset is the normal form; offset-less timestamps are read
/// as UTC.
pub fn parse_timestamp(s: &str, field: &'static str) -> Result<DateTime<Utc>, DataErrorKind> {
    let t = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(t) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(t, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(DataErrorKind::InvalidTimestamp {
        field,
        raw: s.to_string(),
    })
}

fn parse_side(s: &str) -> Result<Side, DataErrorKind> {
    match s.trim().to_ascii_lowercase().as_str() {
        "buy" => Ok(Side::Buy),
        "sell" => Ok(Side::Sell),
        _ => Err(DataErrorKind::UnknownSide(s.to_string())),
    }
}

fn parse_effect(s: &str) -> Result<PositionEffect, DataErrorKind> {
    match s.trim().to_ascii_lowercase().as_str() {
        "open" | "opening" => Ok(PositionEffect::Opening),
        "close" | "closing" => Ok(PositionEffect::Closing),
        _ => Err(DataErrorKind::UnknownEffect(s.to_string())),
    }
}

fn parse_right(s: &str) -> Result<OptionRight, DataErrorKind> {
    match s.trim().to_ascii_lowercase().as_str() {
        "call" => Ok(OptionRight::Call),
        "put" => Ok(OptionRight::Put),
        _ => Err(DataErrorKind::UnknownOptionType(s.to_string())),
    }
}

fn required<'a>(v: &'a Option<String>, field: &'static str) -> Result<&'a str, DataErrorKind> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(DataErrorKind::MissingField(field))
}

fn required_value<'a>(v: &'a Option<Value>, field: &'static str) -> Result<&'a Value, DataErrorKind> {
    v.as_ref()
        .filter(|v| !v.is_null())
        .ok_or(DataErrorKind::MissingField(field))
}

fn non_negative(m: Micros, field: &'static str) -> Result<Micros, DataErrorKind> {
    if m.is_negative() {
        return Err(DataErrorKind::InvalidPrice {
            field,
            raw: m.to_string(),
        });
    }
    Ok(m)
}

fn amount(a: &Option<RawAmount>, field: &'static str) -> Result<Option<Micros>, DataErrorKind> {
    match a {
        Some(a) => parse_decimal_opt(a.amount.as_ref(), field),
        None => Ok(None),
    }
}

fn fee_weights(policy: FeeAllocation, legs: &[(i64, Micros)]) -> Vec<i128> {
    legs.iter()
        .map(|(qty, price)| match policy {
            FeeAllocation::PerContract => *qty as i128,
            FeeAllocation::ByPremium => (*qty as i128) * (price.raw() as i128),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

struct LegDraft {
    instrument: Instrument,
    side: Side,
    effect: PositionEffect,
    qty: i64,
    price: Micros,
    ts: DateTime<Utc>,
}

fn normalize_option_order(
    o: &RawOptionOrder,
    policy: FeeAllocation,
) -> Result<Vec<Execution>, DataError> {
    let err = |kind| DataError::new(o.id.clone(), kind);

    let filled = parse_quantity(
        required_value(&o.processed_quantity, "processed_quantity").map_err(err)?,
        "processed_quantity",
    )
    .map_err(err)?;
    if filled == 0 {
        debug!(order_id = %o.id, state = ?o.state, "option order has no fills");
        return Ok(Vec::new());
    }
    if o.legs.is_empty() {
        return Err(err(DataErrorKind::NoLegs));
    }

    let symbol = required(&o.chain_symbol, "chain_symbol").map_err(err)?;
    let order_ts = o
        .created_at
        .as_deref()
        .map(|s| parse_timestamp(s, "created_at"))
        .transpose()
        .map_err(err)?;
    let order_price = parse_decimal_opt(o.price.as_ref(), "price").map_err(err)?;

    let mut fee = Micros::ZERO;
    for (v, field) in [(&o.fees, "fees"), (&o.regulatory_fees, "regulatory_fees")] {
        if let Some(m) = parse_decimal_opt(v.as_ref(), field).map_err(err)? {
            fee += non_negative(m, field).map_err(err)?;
        }
    }

    let single_leg = o.legs.len() == 1;
    let mut drafts = Vec::with_capacity(o.legs.len());
    for (i, leg) in o.legs.iter().enumerate() {
        let leg_err = |kind| DataError::new(format!("{}:{i}", o.id), kind);

        let effect = parse_effect(required(&leg.position_effect, "position_effect").map_err(leg_err)?)
            .map_err(leg_err)?;
        let side = parse_side(required(&leg.side, "side").map_err(leg_err)?).map_err(leg_err)?;
        let exp_raw = required(&leg.expiration_date, "expiration_date").map_err(leg_err)?;
        let expiration = NaiveDate::parse_from_str(exp_raw, "%Y-%m-%d").map_err(|_| {
            leg_err(DataErrorKind::InvalidDate {
                field: "expiration_date",
                raw: exp_raw.to_string(),
            })
        })?;
        let strike = parse_decimal(
            required_value(&leg.strike_price, "strike_price").map_err(leg_err)?,
            "strike_price",
        )
        .and_then(|m| non_negative(m, "strike_price"))
        .map_err(leg_err)?;
        let right = parse_right(required(&leg.option_type, "option_type").map_err(leg_err)?)
            .map_err(leg_err)?;

        let ratio = match &leg.ratio_quantity {
            Some(v) if !v.is_null() => parse_quantity(v, "ratio_quantity").map_err(leg_err)?,
            _ => 1,
        };
        let qty = filled.checked_mul(ratio).filter(|q| *q > 0).ok_or_else(|| {
            leg_err(DataErrorKind::InvalidQuantity {
                field: "ratio_quantity",
                raw: ratio.to_string(),
            })
        })?;

        // Price: the leg's own fills, weighted by quantity.
        let mut notional: i128 = 0;
        let mut exec_qty: i128 = 0;
        let mut first_fill: Option<DateTime<Utc>> = None;
        for x in &leg.executions {
            let p = parse_decimal(required_value(&x.price, "executions.price").map_err(leg_err)?, "executions.price")
                .map_err(leg_err)?;
            let q = parse_quantity(
                required_value(&x.quantity, "executions.quantity").map_err(leg_err)?,
                "executions.quantity",
            )
            .map_err(leg_err)?;
            notional += (p.raw() as i128) * (q as i128);
            exec_qty += q as i128;
            if let Some(ts) = x.timestamp.as_deref() {
                let ts = parse_timestamp(ts, "executions.timestamp").map_err(leg_err)?;
                first_fill = Some(first_fill.map_or(ts, |f| f.min(ts)));
            }
        }
        let price = if exec_qty > 0 {
            Micros::new(i64::try_from(notional / exec_qty).map_err(|_| {
                leg_err(DataErrorKind::InvalidPrice {
                    field: "executions.price",
                    raw: notional.to_string(),
                })
            })?)
        } else if single_leg {
            order_price.ok_or_else(|| leg_err(DataErrorKind::MissingField("price")))?
        } else {
            return Err(leg_err(DataErrorKind::MissingField("executions")));
        };
        let price = non_negative(price, "price").map_err(leg_err)?;

        let ts = first_fill
            .or(order_ts)
            .ok_or_else(|| leg_err(DataErrorKind::MissingField("created_at")))?;

        drafts.push(LegDraft {
            instrument: Instrument::Option {
                symbol: symbol.to_ascii_uppercase(),
                strike,
                expiration,
                right,
            },
            side,
            effect,
            qty,
            price,
            ts,
        });
    }

    let shape: Vec<(i64, Micros)> = drafts.iter().map(|d| (d.qty, d.price)).collect();
    let fees = allocate_fee(fee, &fee_weights(policy, &shape));
    let strategy = [&o.opening_strategy, &o.closing_strategy]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(str::to_string);

    Ok(drafts
        .into_iter()
        .zip(fees)
        .enumerate()
        .map(|(i, (d, fee))| Execution {
            id: format!("{}:{i}", o.id),
            order_id: o.id.clone(),
            leg_index: i as u32,
            key: d.instrument.contract_key(),
            instrument: d.instrument,
            side: d.side,
            effect: d.effect,
            qty: d.qty,
            price: d.price,
            fee,
            ts: d.ts,
            multiplier: None,
            broker_pnl: None,
            strategy: strategy.clone(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Futures
// ---------------------------------------------------------------------------

fn normalize_futures_order(
    o: &RawFuturesOrder,
    policy: FeeAllocation,
) -> Result<Vec<Execution>, DataError> {
    let err = |kind| DataError::new(o.order_id.clone(), kind);

    let filled = parse_quantity(
        required_value(&o.filled_quantity, "filledQuantity").map_err(err)?,
        "filledQuantity",
    )
    .map_err(err)?;
    if filled == 0 {
        debug!(order_id = %o.order_id, state = ?o.order_state, "futures order has no fills");
        return Ok(Vec::new());
    }
    if o.order_legs.is_empty() {
        return Err(err(DataErrorKind::NoLegs));
    }

    let effect = parse_effect(
        required(&o.position_effect_at_placement_time, "positionEffectAtPlacementTime")
            .map_err(err)?,
    )
    .map_err(err)?;

    // Earliest fill wins.
    let mut first_fill: Option<DateTime<Utc>> = None;
    for x in &o.order_executions {
        if let Some(s) = x.event_time.as_deref() {
            let t = parse_timestamp(s, "orderExecutions.eventTime").map_err(err)?;
            first_fill = Some(first_fill.map_or(t, |f| f.min(t)));
        }
    }
    let ts = match first_fill {
        Some(t) => t,
        None => parse_timestamp(required(&o.created_at, "createdAt").map_err(err)?, "createdAt")
            .map_err(err)?,
    };

    let fee = match amount(&o.total_fee, "totalFee.amount").map_err(err)? {
        Some(f) => f,
        None => amount(&o.total_commission, "totalCommission.amount")
            .map_err(err)?
            .unwrap_or(Micros::ZERO),
    };
    let fee = non_negative(fee, "totalFee.amount").map_err(err)?;

    let broker_pnl = match &o.realized_pnl {
        Some(r) => amount(&r.realized_pnl, "realizedPnl.realizedPnl.amount")
            .map_err(err)?
            .map(|realized| -> Result<BrokerPnl, DataError> {
                let without = amount(
                    &r.realized_pnl_without_fees,
                    "realizedPnl.realizedPnlWithoutFees.amount",
                )
                .map_err(err)?;
                Ok(BrokerPnl {
                    realized,
                    realized_without_fees: without.unwrap_or(realized),
                })
            })
            .transpose()?,
        None => None,
    };

    let multiplier = match &o.multiplier {
        Some(v) if !v.is_null() => Some(parse_quantity(v, "multiplier").map_err(err)?),
        _ => None,
    };

    let symbol = o
        .display_symbol
        .as_deref()
        .or(o.symbol.as_deref())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let mut legs = Vec::with_capacity(o.order_legs.len());
    for (i, leg) in o.order_legs.iter().enumerate() {
        let leg_err = |kind| DataError::new(format!("{}:{i}", o.order_id), kind);
        let contract_id = required(&leg.contract_id, "contractId").map_err(leg_err)?;
        let side = parse_side(required(&leg.order_side, "orderSide").map_err(leg_err)?)
            .map_err(leg_err)?;
        let price = parse_decimal(
            required_value(&leg.average_price, "averagePrice").map_err(leg_err)?,
            "averagePrice",
        )
        .map_err(leg_err)?;
        legs.push((contract_id, side, price));
    }

    let shape: Vec<(i64, Micros)> = legs.iter().map(|(_, _, p)| (filled, *p)).collect();
    let fees = allocate_fee(fee, &fee_weights(policy, &shape));

    Ok(legs
        .into_iter()
        .zip(fees)
        .enumerate()
        .map(|(i, ((contract_id, side, price), fee))| {
            let instrument = Instrument::Future {
                contract_id: contract_id.to_string(),
                symbol: symbol.unwrap_or(contract_id).to_string(),
            };
            Execution {
                id: format!("{}:{i}", o.order_id),
                order_id: o.order_id.clone(),
                leg_index: i as u32,
                key: instrument.contract_key(),
                instrument,
                side,
                effect,
                qty: filled,
                price,
                fee,
                ts,
                multiplier,
                broker_pnl: if i == 0 { broker_pnl } else { None },
                strategy: None,
            }
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Normalize one deserialized order into zero or more executions.
pub fn normalize_order(order: &RawOrder, policy: FeeAllocation) -> Result<Vec<Execution>, DataError> {
    match order {
        RawOrder::Options(o) => normalize_option_order(o, policy),
        RawOrder::Futures(o) => normalize_futures_order(o, policy),
    }
}

/// Output of [`normalize_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub executions: Vec<Execution>,
    pub errors: Vec<DataError>,
    /// Records that parsed fine but had nothing filled.
    pub unfilled: usize,
}

/// Normalize a batch of raw JSON records. Bad records are collected in
/// `errors`; they never abort the batch.
pub fn normalize_batch(records: &[Value], policy: FeeAllocation) -> NormalizedBatch {
    let mut out = NormalizedBatch::default();
    for (index, v) in records.iter().enumerate() {
        let order: RawOrder = match serde_json::from_value(v.clone()) {
            Ok(o) => o,
            Err(e) => {
                let err = DataError::new(reference_of(v, index), DataErrorKind::Malformed(e.to_string()));
                warn!(reference = %err.execution_ref, error = %err.kind, "record rejected");
                out.errors.push(err);
                continue;
            }
        };
        match normalize_order(&order, policy) {
            Ok(execs) if execs.is_empty() => out.unfilled += 1,
            Ok(execs) => out.executions.extend(execs),
            Err(err) => {
                warn!(reference = %err.execution_ref, error = %err.kind, "record rejected");
                out.errors.push(err);
            }
        }
    }
    debug!(
        records = records.len(),
        executions = out.executions.len(),
        errors = out.errors.len(),
        unfilled = out.unfilled,
        "batch normalized"
    );
    out
}
