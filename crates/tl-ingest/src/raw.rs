//! Broker record shapes as they arrive over the wire.
//!
//! Everything that may be absent is optional here; required-field checks
//! happen in the normalizer so a missing field becomes a `DataError` with a
//! usable reference instead of an opaque deserialization failure.
//! Numeric fields stay as raw JSON values (string or number).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One option order: one or more legs sharing a filled quantity.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawOptionOrder {
    pub id: String,
    #[serde(default)]
    pub chain_symbol: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub legs: Vec<RawOptionLeg>,
    /// Filled order quantity (spread units for multi-leg orders).
    #[serde(default)]
    pub processed_quantity: Option<Value>,
    #[serde(default)]
    pub quantity: Option<Value>,
    /// Net order price per share.
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub processed_premium: Option<Value>,
    /// `debit` or `credit`.
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub fees: Option<Value>,
    #[serde(default)]
    pub regulatory_fees: Option<Value>,
    #[serde(default)]
    pub opening_strategy: Option<String>,
    #[serde(default)]
    pub closing_strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawOptionLeg {
    #[serde(default)]
    pub id: Option<String>,
    /// `open` or `close`.
    #[serde(default)]
    pub position_effect: Option<String>,
    /// `buy` or `sell`.
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub expiration_date: Option<String>,
    #[serde(default)]
    pub strike_price: Option<Value>,
    /// `call` or `put`.
    #[serde(default)]
    pub option_type: Option<String>,
    #[serde(default)]
    pub ratio_quantity: Option<Value>,
    #[serde(default)]
    pub executions: Vec<RawLegExecution>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawLegExecution {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub settlement_date: Option<String>,
}

/// `{"amount": "1.23", "currency": "USD"}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawAmount {
    #[serde(default)]
    pub amount: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRealizedPnl {
    #[serde(default)]
    pub realized_pnl: Option<RawAmount>,
    #[serde(default)]
    pub realized_pnl_without_fees: Option<RawAmount>,
}

/// One futures order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFuturesOrder {
    pub order_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub order_legs: Vec<RawFuturesLeg>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub filled_quantity: Option<Value>,
    /// `OPENING` or `CLOSING`.
    #[serde(default)]
    pub position_effect_at_placement_time: Option<String>,
    #[serde(default)]
    pub order_state: Option<String>,
    #[serde(default)]
    pub order_executions: Vec<RawFuturesExecution>,
    #[serde(default)]
    pub realized_pnl: Option<RawRealizedPnl>,
    #[serde(default)]
    pub total_fee: Option<RawAmount>,
    #[serde(default)]
    pub total_commission: Option<RawAmount>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub display_symbol: Option<String>,
    /// Not sent by the broker; accepted when an upstream tool enriches records.
    #[serde(default)]
    pub multiplier: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFuturesLeg {
    #[serde(default)]
    pub contract_id: Option<String>,
    /// `BUY` or `SELL`.
    #[serde(default)]
    pub order_side: Option<String>,
    #[serde(default)]
    pub average_price: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFuturesExecution {
    #[serde(default)]
    pub event_time: Option<String>,
}

/// Either broker shape. Futures records are recognized by `orderId`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawOrder {
    Futures(RawFuturesOrder),
    Options(RawOptionOrder),
}

impl RawOrder {
    pub fn order_id(&self) -> &str {
        match self {
            RawOrder::Futures(o) => &o.order_id,
            RawOrder::Options(o) => &o.id,
        }
    }
}

/// Best available reference for a record that failed to deserialize.
pub fn reference_of(v: &Value, index: usize) -> String {
    ["orderId", "id"]
        .iter()
        .find_map(|k| v.get(*k).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| format!("record[{index}]"))
}
