use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::fixedpoint::{micros_from_i128_clamp, notional_i128, Micros};
use crate::pnl::{gross_pnl, net_pnl};
use crate::report::UnmatchedClose;
use crate::types::{
    derive_position_id, ContractKey, Direction, Execution, FeeSplit, Instrument, Lot, Position,
    PositionStatus,
};

/// FIFO queues of one contract key.
///
/// Long and short lots are kept in separate queues: a closing execution only
/// ever consumes lots of the direction it closes, oldest first.
#[derive(Clone, Debug)]
struct LotBook {
    instrument: Instrument,
    multiplier: i64,
    long: VecDeque<Lot>,
    short: VecDeque<Lot>,
}

impl LotBook {
    fn queue_mut(&mut self, direction: Direction) -> &mut VecDeque<Lot> {
        match direction {
            Direction::Long => &mut self.long,
            Direction::Short => &mut self.short,
        }
    }
}

/// A lot left unmatched after every execution was processed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenLot {
    pub key: ContractKey,
    pub instrument: Instrument,
    pub multiplier: i64,
    pub lot: Lot,
}

/// Result of a full matching pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// `Closed` positions in match order.
    pub closed: Vec<Position>,
    /// Surplus closing quantity that found no lot.
    pub unmatched: Vec<UnmatchedClose>,
    /// Remainders, per key in key order, oldest lot first.
    pub open_lots: Vec<OpenLot>,
}

/// Strict chronological FIFO matcher.
///
/// Callers feed executions in canonical order (see
/// [`crate::ordering::sort_executions_canonical`]). Rules:
/// - an opening execution pushes a lot onto the queue of its direction;
/// - a closing execution consumes lots of the direction it closes, oldest
///   first, splitting the front lot on partial consumption;
/// - each consumed slice yields one `Closed` position carrying its share of
///   the opening fee and of the closing fee;
/// - closing quantity left after the queue is empty is recorded as unmatched.
///   No lot is ever fabricated.
#[derive(Clone, Debug)]
pub struct LotMatcher {
    multipliers: BTreeMap<ContractKey, i64>,
    books: BTreeMap<ContractKey, LotBook>,
    closed: Vec<Position>,
    unmatched: Vec<UnmatchedClose>,
}

impl LotMatcher {
    /// `multipliers` must hold a resolved multiplier for every key the
    /// matcher will see.
    pub fn new(multipliers: BTreeMap<ContractKey, i64>) -> Self {
        Self {
            multipliers,
            books: BTreeMap::new(),
            closed: Vec::new(),
            unmatched: Vec::new(),
        }
    }

    /// Apply one execution.
    pub fn process(&mut self, e: &Execution) -> Result<(), EngineError> {
        let multiplier = *self.multipliers.get(&e.key).ok_or_else(|| {
            EngineError::UnresolvedMultiplier {
                execution_id: e.id.clone(),
                key: e.key.to_string(),
            }
        })?;

        let book = self.books.entry(e.key.clone()).or_insert_with(|| LotBook {
            instrument: e.instrument.clone(),
            multiplier,
            long: VecDeque::new(),
            short: VecDeque::new(),
        });

        if e.is_opening() {
            let lot = Lot::from_execution(e);
            book.queue_mut(lot.direction).push_back(lot);
            return Ok(());
        }

        let direction = Direction::closed_by(e.side);
        let instrument = book.instrument.clone();
        let queue = book.queue_mut(direction);
        let mut close_fees = FeeSplit::new(e.qty, e.fee);
        let mut remaining = e.qty;

        while remaining > 0 {
            let Some(front) = queue.front_mut() else {
                break;
            };
            let q = front.remaining().min(remaining);
            let open_fee = front.take(q);
            let close_fee = close_fees.take(q);

            self.closed.push(closed_position(
                &instrument,
                multiplier,
                front,
                e,
                q,
                open_fee + close_fee,
            ));
            debug!(
                key = %e.key,
                open_execution_id = %front.execution_id,
                close_execution_id = %e.id,
                qty = q,
                "lot matched"
            );

            if front.is_exhausted() {
                queue.pop_front();
            }
            remaining -= q;
        }

        if remaining > 0 {
            warn!(
                execution_id = %e.id,
                key = %e.key,
                surplus = remaining,
                "closing quantity exceeds available lots"
            );
            self.unmatched.push(UnmatchedClose {
                execution_id: e.id.clone(),
                key: e.key.clone(),
                side: e.side,
                qty: remaining,
                ts: e.ts,
            });
        }
        Ok(())
    }

    /// Consume the matcher and hand back everything it produced.
    pub fn finish(self) -> MatchOutcome {
        let mut open_lots = Vec::new();
        for (key, book) in self.books {
            for lot in book.long.into_iter().chain(book.short) {
                open_lots.push(OpenLot {
                    key: key.clone(),
                    instrument: book.instrument.clone(),
                    multiplier: book.multiplier,
                    lot,
                });
            }
        }
        MatchOutcome {
            closed: self.closed,
            unmatched: self.unmatched,
            open_lots,
        }
    }
}

fn closed_position(
    instrument: &Instrument,
    multiplier: i64,
    lot: &Lot,
    close: &Execution,
    qty: i64,
    fees: Micros,
) -> Position {
    let open_premium =
        micros_from_i128_clamp(notional_i128(lot.price, multiplier, qty)).round_to_cents();
    let close_premium =
        micros_from_i128_clamp(notional_i128(close.price, multiplier, qty)).round_to_cents();
    let fees = fees.round_to_cents();

    Position {
        id: derive_position_id(&lot.execution_id, &close.id),
        key: close.key.clone(),
        instrument: instrument.clone(),
        direction: lot.direction,
        status: PositionStatus::Closed,
        qty,
        multiplier,
        open_execution_id: lot.execution_id.clone(),
        close_execution_id: Some(close.id.clone()),
        entry_ts: lot.ts,
        exit_ts: Some(close.ts),
        open_price: lot.price,
        close_price: Some(close.price),
        open_premium,
        close_premium: Some(close_premium),
        gross_pnl: Some(gross_pnl(lot.direction, open_premium, close_premium)),
        fees,
        net_pnl: Some(net_pnl(lot.direction, open_premium, close_premium, fees)),
        strategy: lot.strategy.clone().or_else(|| close.strategy.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PositionEffect, Side};
    use chrono::{TimeZone, Utc};

    fn exec(id: &str, side: Side, effect: PositionEffect, qty: i64, cents: i64, secs: i64) -> Execution {
        let instrument = Instrument::Future {
            contract_id: "mes".to_string(),
            symbol: "/MES".to_string(),
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
            ts: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            multiplier: None,
            broker_pnl: None,
            strategy: None,
        }
    }

    fn matcher() -> LotMatcher {
        let mut m = BTreeMap::new();
        m.insert(ContractKey::new("FUT:mes"), 5);
        LotMatcher::new(m)
    }

    #[test]
    fn partial_close_splits_front_lot() {
        let mut m = matcher();
        m.process(&exec("o1", Side::Buy, PositionEffect::Opening, 3, 1_000, 1)).unwrap();
        m.process(&exec("c1", Side::Sell, PositionEffect::Closing, 2, 1_100, 2)).unwrap();
        let out = m.finish();

        assert_eq!(out.closed.len(), 1);
        assert_eq!(out.closed[0].qty, 2);
        // (11 - 10) * 5 * 2
        assert_eq!(out.closed[0].net_pnl, Some(Micros::from_dollars(10)));
        assert_eq!(out.open_lots.len(), 1);
        assert_eq!(out.open_lots[0].lot.remaining(), 1);
    }

    #[test]
    fn close_spans_lots_oldest_first() {
        let mut m = matcher();
        m.process(&exec("o1", Side::Buy, PositionEffect::Opening, 1, 1_000, 1)).unwrap();
        m.process(&exec("o2", Side::Buy, PositionEffect::Opening, 1, 2_000, 2)).unwrap();
        m.process(&exec("c1", Side::Sell, PositionEffect::Closing, 2, 1_500, 3)).unwrap();
        let out = m.finish();

        let opens: Vec<_> = out.closed.iter().map(|p| p.open_execution_id.as_str()).collect();
        assert_eq!(opens, ["o1", "o2"]);
        assert_eq!(out.closed[0].net_pnl, Some(Micros::from_dollars(25)));
        assert_eq!(out.closed[1].net_pnl, Some(Micros::from_dollars(-25)));
        assert!(out.open_lots.is_empty());
    }

    #[test]
    fn closing_buy_only_touches_short_lots() {
        let mut m = matcher();
        m.process(&exec("o1", Side::Buy, PositionEffect::Opening, 1, 1_000, 1)).unwrap();
        m.process(&exec("c1", Side::Buy, PositionEffect::Closing, 1, 900, 2)).unwrap();
        let out = m.finish();

        assert!(out.closed.is_empty());
        assert_eq!(out.unmatched.len(), 1);
        assert_eq!(out.open_lots.len(), 1);
        assert_eq!(out.open_lots[0].lot.direction, Direction::Long);
    }

    #[test]
    fn surplus_is_reported_not_fabricated() {
        let mut m = matcher();
        m.process(&exec("o1", Side::Sell, PositionEffect::Opening, 1, 1_000, 1)).unwrap();
        m.process(&exec("c1", Side::Buy, PositionEffect::Closing, 4, 800, 2)).unwrap();
        let out = m.finish();

        assert_eq!(out.closed.len(), 1);
        assert_eq!(out.closed[0].direction, Direction::Short);
        assert_eq!(out.closed[0].net_pnl, Some(Micros::from_dollars(10)));
        assert_eq!(out.unmatched[0].qty, 3);
    }

    #[test]
    fn fees_are_split_across_slices() {
        let mut m = matcher();
        let mut open = exec("o1", Side::Buy, PositionEffect::Opening, 2, 1_000, 1);
        open.fee = Micros::from_cents(100);
        let mut close = exec("c1", Side::Sell, PositionEffect::Closing, 3, 1_000, 2);
        close.fee = Micros::from_cents(60);
        m.process(&open).unwrap();
        m.process(&exec("o2", Side::Buy, PositionEffect::Opening, 1, 1_000, 1)).unwrap();
        m.process(&close).unwrap();
        let out = m.finish();

        assert_eq!(out.closed.len(), 2);
        assert_eq!(out.closed[0].fees, Micros::from_cents(140));
        assert_eq!(out.closed[1].fees, Micros::from_cents(20));
        assert_eq!(out.closed[0].net_pnl, Some(Micros::from_cents(-140)));
        let total: Micros = out.closed.iter().map(|p| p.fees).sum();
        assert_eq!(total, Micros::from_cents(160));
    }

    #[test]
    fn unknown_key_is_an_error() {
        let mut m = LotMatcher::new(BTreeMap::new());
        let err = m
            .process(&exec("o1", Side::Buy, PositionEffect::Opening, 1, 1_000, 1))
            .unwrap_err();
        assert_eq!(err.execution_id(), "o1");
    }
}
