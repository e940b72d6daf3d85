use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::fixedpoint::Micros;

/// BUY or SELL for executions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Broker-supplied tag distinguishing opening trades from closing trades.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionEffect {
    Opening,
    Closing,
}

/// Direction of an opened lot.
///
/// `Long` lots are debit-opened (premium paid), `Short` lots are
/// credit-opened (premium received).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Direction of the lot an opening execution on `side` creates.
    pub fn opened_by(side: Side) -> Self {
        match side {
            Side::Buy => Direction::Long,
            Side::Sell => Direction::Short,
        }
    }

    /// Direction of the lots a closing execution on `side` consumes.
    /// A closing SELL reduces long lots; a closing BUY covers short lots.
    pub fn closed_by(side: Side) -> Self {
        match side {
            Side::Sell => Direction::Long,
            Side::Buy => Direction::Short,
        }
    }

    /// `+1` for long, `-1` for short.
    pub fn sign(self) -> i64 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    fn code(self) -> char {
        match self {
            OptionRight::Call => 'C',
            OptionRight::Put => 'P',
        }
    }
}

/// Instrument identity plus the metadata the engine needs.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instrument {
    Option {
        symbol: String,
        strike: Micros,
        expiration: NaiveDate,
        right: OptionRight,
    },
    Future {
        contract_id: String,
        symbol: String,
    },
}

impl Instrument {
    /// Canonical contract key for this instrument.
    ///
    /// Options: `OPT:<SYMBOL>:<YYYY-MM-DD>:<strike micros>:<C|P>`.
    /// Futures: `FUT:<contract_id>`.
    pub fn contract_key(&self) -> ContractKey {
        match self {
            Instrument::Option {
                symbol,
                strike,
                expiration,
                right,
            } => ContractKey(format!(
                "OPT:{}:{}:{}:{}",
                symbol.trim().to_ascii_uppercase(),
                expiration.format("%Y-%m-%d"),
                strike.raw(),
                right.code()
            )),
            Instrument::Future { contract_id, .. } => {
                ContractKey(format!("FUT:{}", contract_id.trim()))
            }
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Instrument::Option { symbol, .. } | Instrument::Future { symbol, .. } => symbol,
        }
    }

    /// Expiration date subject to the worthless-expiry sweep.
    ///
    /// Futures settle at a settlement price rather than zero, so they are
    /// never swept; an unclosed futures lot stays open.
    pub fn sweep_expiration(&self) -> Option<NaiveDate> {
        match self {
            Instrument::Option { expiration, .. } => Some(*expiration),
            Instrument::Future { .. } => None,
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(self, Instrument::Option { .. })
    }
}

/// Instrument identity used as the matching scope.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractKey(String);

impl ContractKey {
    pub fn new<S: Into<String>>(key: S) -> Self {
        ContractKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Realized P&L breakdown the broker reports on futures orders.
///
/// Carried through for audit comparison only; the engine never uses it to
/// compute positions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPnl {
    pub realized: Micros,
    pub realized_without_fees: Micros,
}

/// One executed fill of one leg. Immutable once ingested.
///
/// `qty` is the actually filled quantity and always positive.
/// `price` is per contract unit (before the multiplier).
/// `fee` is the absolute fee allocated to this execution (>= 0).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique id; used for deduplication and as the ordering tie-break.
    pub id: String,
    pub order_id: String,
    pub leg_index: u32,
    pub key: ContractKey,
    pub instrument: Instrument,
    pub side: Side,
    pub effect: PositionEffect,
    pub qty: i64,
    pub price: Micros,
    pub fee: Micros,
    pub ts: DateTime<Utc>,
    /// Explicit multiplier supplied with the record, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_pnl: Option<BrokerPnl>,
    /// Broker strategy label of the order, e.g. `long_call_spread`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl Execution {
    pub fn is_opening(&self) -> bool {
        self.effect == PositionEffect::Opening
    }

    pub fn is_closing(&self) -> bool {
        self.effect == PositionEffect::Closing
    }

    /// Check the invariants every execution entering the engine must hold.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.id.trim().is_empty() {
            return Err(EngineError::EmptyExecutionId);
        }
        if self.key.as_str().trim().is_empty() {
            return Err(EngineError::EmptyContractKey {
                execution_id: self.id.clone(),
            });
        }
        if self.qty <= 0 {
            return Err(EngineError::NonPositiveQty {
                execution_id: self.id.clone(),
                qty: self.qty,
            });
        }
        if self.price.is_negative() {
            return Err(EngineError::NegativePrice {
                execution_id: self.id.clone(),
                price: self.price,
            });
        }
        if self.fee.is_negative() {
            return Err(EngineError::NegativeFee {
                execution_id: self.id.clone(),
                fee: self.fee,
            });
        }
        Ok(())
    }
}

/// Splits a total fee across the units of one execution.
///
/// Each `take(q)` returns `fee_total × q / qty_total` truncated, except the
/// share that exhausts the quantity, which receives whatever fee is left.
/// The shares therefore always sum to exactly `fee_total`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeSplit {
    qty_total: i64,
    fee_total: Micros,
    qty_left: i64,
    fee_left: Micros,
}

impl FeeSplit {
    pub fn new(qty_total: i64, fee_total: Micros) -> Self {
        Self {
            qty_total,
            fee_total,
            qty_left: qty_total,
            fee_left: fee_total,
        }
    }

    pub fn qty_left(&self) -> i64 {
        self.qty_left
    }

    pub fn fee_left(&self) -> Micros {
        self.fee_left
    }

    /// Consume `q` units (clamped to what is left) and return their fee share.
    pub fn take(&mut self, q: i64) -> Micros {
        let q = q.min(self.qty_left).max(0);
        let share = if q == self.qty_left {
            self.fee_left
        } else {
            self.fee_total
                .checked_mul_ratio(q, self.qty_total)
                .unwrap_or(self.fee_left)
        };
        self.qty_left -= q;
        self.fee_left -= share;
        share
    }
}

/// Unmatched remainder of one opening execution.
///
/// Owned exclusively by its FIFO queue; removed once `remaining` hits zero.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lot {
    pub execution_id: String,
    pub direction: Direction,
    pub price: Micros,
    pub ts: DateTime<Utc>,
    pub strategy: Option<String>,
    fees: FeeSplit,
}

impl Lot {
    pub fn from_execution(e: &Execution) -> Self {
        Self {
            execution_id: e.id.clone(),
            direction: Direction::opened_by(e.side),
            price: e.price,
            ts: e.ts,
            strategy: e.strategy.clone(),
            fees: FeeSplit::new(e.qty, e.fee),
        }
    }

    pub fn remaining(&self) -> i64 {
        self.fees.qty_left()
    }

    /// Fee still attached to the unmatched remainder.
    pub fn remaining_fee(&self) -> Micros {
        self.fees.fee_left()
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume `q` units and return their share of the opening fee.
    pub fn take(&mut self, q: i64) -> Micros {
        self.fees.take(q)
    }
}

/// Lifecycle status of a position. `Closed` and `Expired` are terminal.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closed,
    Expired,
}

impl PositionStatus {
    pub fn is_realized(self) -> bool {
        matches!(self, PositionStatus::Closed | PositionStatus::Expired)
    }
}

/// A matched (or still open) trade outcome.
///
/// Currency amounts are rounded to cents when the position is built;
/// prices keep full micro precision. Premiums are unsigned notionals
/// (`price × multiplier × qty`); the sign lives in `direction`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub key: ContractKey,
    pub instrument: Instrument,
    pub direction: Direction,
    pub status: PositionStatus,
    pub qty: i64,
    pub multiplier: i64,
    pub open_execution_id: String,
    pub close_execution_id: Option<String>,
    pub entry_ts: DateTime<Utc>,
    pub exit_ts: Option<DateTime<Utc>>,
    pub open_price: Micros,
    pub close_price: Option<Micros>,
    pub open_premium: Micros,
    pub close_premium: Option<Micros>,
    pub gross_pnl: Option<Micros>,
    pub fees: Micros,
    pub net_pnl: Option<Micros>,
    /// Strategy of the opening order, else of the closing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_realized(&self) -> bool {
        self.status.is_realized()
    }

    pub fn is_profitable(&self) -> bool {
        self.net_pnl.map(|n| n.is_positive()).unwrap_or(false)
    }

    /// Leg of a multi-leg spread order, by its strategy label.
    pub fn is_spread(&self) -> bool {
        self.strategy
            .as_deref()
            .is_some_and(|s| s.to_ascii_lowercase().contains("_spread"))
    }
}

/// Deterministic position id.
///
/// **No RNG.** `Uuid::new_v5` over the DNS namespace, scoped by a derivation
/// prefix. The opening execution id plus either the closing execution id or
/// the terminal tag identifies a position uniquely: one close matches one
/// lot at most once.
pub(crate) fn derive_position_id(open_execution_id: &str, tail: &str) -> Uuid {
    let data = format!("tl-core.position.v1|{open_execution_id}|{tail}");
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, data.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn opt() -> Instrument {
        Instrument::Option {
            symbol: "spy".to_string(),
            strike: Micros::from_dollars(450),
            expiration: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            right: OptionRight::Put,
        }
    }

    #[test]
    fn option_key_is_canonical() {
        assert_eq!(
            opt().contract_key().as_str(),
            "OPT:SPY:2024-03-15:450000000:P"
        );
    }

    #[test]
    fn future_key_uses_contract_id() {
        let f = Instrument::Future {
            contract_id: "c0ffee".to_string(),
            symbol: "/MESH24".to_string(),
        };
        assert_eq!(f.contract_key().as_str(), "FUT:c0ffee");
        assert_eq!(f.sweep_expiration(), None);
    }

    #[test]
    fn direction_mapping() {
        assert_eq!(Direction::opened_by(Side::Buy), Direction::Long);
        assert_eq!(Direction::opened_by(Side::Sell), Direction::Short);
        assert_eq!(Direction::closed_by(Side::Sell), Direction::Long);
        assert_eq!(Direction::closed_by(Side::Buy), Direction::Short);
    }

    #[test]
    fn fee_split_shares_sum_to_total() {
        let mut s = FeeSplit::new(3, Micros::from_dollars(1));
        let a = s.take(1);
        let b = s.take(1);
        let c = s.take(1);
        assert_eq!(a, Micros::new(333_333));
        assert_eq!(b, Micros::new(333_333));
        assert_eq!(c, Micros::new(333_334));
        assert_eq!(a + b + c, Micros::from_dollars(1));
        assert_eq!(s.qty_left(), 0);
    }

    #[test]
    fn fee_split_clamps_overdraw() {
        let mut s = FeeSplit::new(2, Micros::from_cents(100));
        assert_eq!(s.take(5), Micros::from_cents(100));
        assert_eq!(s.take(1), Micros::ZERO);
    }

    #[test]
    fn validate_rejects_bad_qty() {
        let e = Execution {
            id: "x1".to_string(),
            order_id: "o1".to_string(),
            leg_index: 0,
            key: opt().contract_key(),
            instrument: opt(),
            side: Side::Buy,
            effect: PositionEffect::Opening,
            qty: 0,
            price: Micros::from_dollars(1),
            fee: Micros::ZERO,
            ts: Utc.with_ymd_and_hms(2024, 1, 2, 15, 0, 0).unwrap(),
            multiplier: None,
            broker_pnl: None,
            strategy: None,
        };
        assert!(matches!(
            e.validate(),
            Err(EngineError::NonPositiveQty { qty: 0, .. })
        ));
    }

    #[test]
    fn position_ids_are_deterministic() {
        assert_eq!(derive_position_id("a", "b"), derive_position_id("a", "b"));
        assert_ne!(derive_position_id("a", "b"), derive_position_id("a", "c"));
    }
}
