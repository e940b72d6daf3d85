//! Full-history reconciliation.
//!
//! [`ExecutionLog`] is the union of every execution ever seen for one
//! account, deduplicated by id. [`reconcile`] rebuilds the entire position
//! set from it on every call:
//!
//! 1. canonical sort (one global pass over every key),
//! 2. orphan filter against the full history,
//! 3. multiplier resolution per key (unresolvable keys are excluded whole),
//! 4. FIFO matching,
//! 5. expiration sweep over the remainders,
//! 6. summary over the resulting positions.
//!
//! Positions are never patched. A newly discovered early execution can change
//! which lots every later close matched, so the only sound update is a full
//! recompute.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{classify_remainders, ExpiryPolicy};
use crate::error::EngineError;
use crate::fixedpoint::Micros;
use crate::matcher::LotMatcher;
use crate::multiplier::MultiplierTable;
use crate::ordering::sort_executions_canonical;
use crate::orphan::filter_orphans;
use crate::pnl::{daily_pnl, unrealized_pnl, DailyPnl, DateRange, MarkMap, PnlSummary, UnrealizedPnl};
use crate::report::{MissingMultiplier, ReconcileReport, RejectedRecord};
use crate::types::{ContractKey, Execution, Position, PositionStatus};

// ---------------------------------------------------------------------------
// Execution log
// ---------------------------------------------------------------------------

/// Outcome of [`ExecutionLog::merge`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub inserted: usize,
    /// Ids already present with identical content.
    pub duplicates: usize,
    /// Executions refused: invariant violations and conflicting duplicates.
    pub rejected: Vec<EngineError>,
}

/// Deduplicated execution history of one account, keyed by execution id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionLog {
    by_id: BTreeMap<String, Execution>,
}

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge executions into the log.
    ///
    /// An id already present is a duplicate when the content matches and a
    /// conflict otherwise; the first-seen execution is kept either way.
    pub fn merge<I>(&mut self, executions: I) -> MergeStats
    where
        I: IntoIterator<Item = Execution>,
    {
        let mut stats = MergeStats::default();
        for e in executions {
            if let Err(err) = e.validate() {
                stats.rejected.push(err);
                continue;
            }
            match self.by_id.get(&e.id) {
                Some(existing) if *existing == e => stats.duplicates += 1,
                Some(_) => {
                    warn!(execution_id = %e.id, "conflicting duplicate execution ignored");
                    stats.rejected.push(EngineError::ConflictingDuplicate {
                        execution_id: e.id,
                    });
                }
                None => {
                    self.by_id.insert(e.id.clone(), e);
                    stats.inserted += 1;
                }
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Executions in id order.
    pub fn executions(&self) -> impl Iterator<Item = &Execution> {
        self.by_id.values()
    }

    /// Latest execution timestamp, if any.
    pub fn last_ts(&self) -> Option<DateTime<Utc>> {
        self.by_id.values().map(|e| e.ts).max()
    }
}

impl FromIterator<Execution> for ExecutionLog {
    fn from_iter<I: IntoIterator<Item = Execution>>(iter: I) -> Self {
        let mut log = ExecutionLog::new();
        log.merge(iter);
        log
    }
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

/// Inputs of a pass other than the executions themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub multipliers: MultiplierTable,
    pub expiry: ExpiryPolicy,
}

/// Quantities that entered the matcher for one key.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFlow {
    pub opened: i64,
    pub closing: i64,
}

/// Realized P&L the broker itself reported (futures), for audit comparison.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerTotals {
    pub executions: usize,
    pub realized: Micros,
    pub realized_without_fees: Micros,
}

/// A conservation check failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConservationError {
    /// opened != closed + expired + open for a key.
    Opened {
        key: ContractKey,
        opened: i64,
        accounted: i64,
    },
    /// closing quantity != closed + unmatched surplus for a key.
    Closing {
        key: ContractKey,
        closing: i64,
        accounted: i64,
    },
    /// A position exists for a key that never entered the matcher.
    UnknownKey { key: ContractKey },
}

impl std::fmt::Display for ConservationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened {
                key,
                opened,
                accounted,
            } => write!(
                f,
                "conservation: {key} opened {opened} but positions account for {accounted}"
            ),
            Self::Closing {
                key,
                closing,
                accounted,
            } => write!(
                f,
                "conservation: {key} closing {closing} but matches and surplus account for {accounted}"
            ),
            Self::UnknownKey { key } => {
                write!(f, "conservation: positions exist for unmatched key {key}")
            }
        }
    }
}

impl std::error::Error for ConservationError {}

/// Everything one pass produces. Replaces the previous pass wholesale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reconciliation {
    pub as_of: DateTime<Utc>,
    /// Positions ordered by entry, then opening execution, then exit.
    pub positions: Vec<Position>,
    pub report: ReconcileReport,
    pub summary: PnlSummary,
    pub broker: BrokerTotals,
    pub flows: BTreeMap<ContractKey, KeyFlow>,
    /// Executions in the log at the time of the pass.
    pub execution_count: usize,
}

impl Reconciliation {
    /// Re-derive per-key quantity conservation from the positions.
    ///
    /// For every key: opened = closed + expired + open, and
    /// closing = closed + unmatched surplus.
    pub fn verify_conservation(&self) -> Result<(), ConservationError> {
        let mut positioned: BTreeMap<&ContractKey, i64> = BTreeMap::new();
        let mut closed: BTreeMap<&ContractKey, i64> = BTreeMap::new();
        for p in &self.positions {
            if !self.flows.contains_key(&p.key) {
                return Err(ConservationError::UnknownKey { key: p.key.clone() });
            }
            *positioned.entry(&p.key).or_default() += p.qty;
            if p.status == PositionStatus::Closed {
                *closed.entry(&p.key).or_default() += p.qty;
            }
        }
        let mut surplus: BTreeMap<&ContractKey, i64> = BTreeMap::new();
        for u in &self.report.unmatched_closes {
            *surplus.entry(&u.key).or_default() += u.qty;
        }

        for (key, flow) in &self.flows {
            let accounted = positioned.get(key).copied().unwrap_or(0);
            if accounted != flow.opened {
                return Err(ConservationError::Opened {
                    key: key.clone(),
                    opened: flow.opened,
                    accounted,
                });
            }
            let accounted =
                closed.get(key).copied().unwrap_or(0) + surplus.get(key).copied().unwrap_or(0);
            if accounted != flow.closing {
                return Err(ConservationError::Closing {
                    key: key.clone(),
                    closing: flow.closing,
                    accounted,
                });
            }
        }
        Ok(())
    }

    pub fn daily(&self, tz: Tz, range: DateRange) -> BTreeMap<NaiveDate, DailyPnl> {
        daily_pnl(&self.positions, tz, range)
    }

    pub fn unrealized(&self, marks: &MarkMap) -> UnrealizedPnl {
        unrealized_pnl(&self.positions, marks)
    }
}

/// Recompute every position from the full execution log.
pub fn reconcile(
    log: &ExecutionLog,
    settings: &ReconcileSettings,
    as_of: DateTime<Utc>,
) -> Reconciliation {
    let mut executions: Vec<Execution> = log.executions().cloned().collect();
    sort_executions_canonical(&mut executions);

    let broker = broker_totals(&executions);

    let filtered = filter_orphans(executions);
    let mut report = ReconcileReport {
        orphan_closes: filtered.excluded,
        ..ReconcileReport::default()
    };
    debug!(
        usable = filtered.usable.len(),
        orphans = report.orphan_closes.len(),
        "orphan filter done"
    );

    // Resolve multipliers per key; keys without one are excluded whole.
    let mut by_key: BTreeMap<&ContractKey, Vec<&Execution>> = BTreeMap::new();
    for e in &filtered.usable {
        by_key.entry(&e.key).or_default().push(e);
    }
    let mut multipliers: BTreeMap<ContractKey, i64> = BTreeMap::new();
    for (key, execs) in &by_key {
        match settings.multipliers.resolve(key, execs.iter().copied()) {
            Some(m) => {
                multipliers.insert((*key).clone(), m);
            }
            None => {
                warn!(key = %key, executions = execs.len(), "no contract multiplier; key excluded");
                report.missing_multipliers.push(MissingMultiplier {
                    key: (*key).clone(),
                    execution_ids: execs.iter().map(|e| e.id.clone()).collect(),
                });
            }
        }
    }

    let mut flows: BTreeMap<ContractKey, KeyFlow> = BTreeMap::new();
    let mut matcher = LotMatcher::new(multipliers.clone());
    for e in filtered.usable.iter().filter(|e| multipliers.contains_key(&e.key)) {
        if let Err(err) = matcher.process(e) {
            report.rejected.push(RejectedRecord::engine(&err));
            continue;
        }
        let flow = flows.entry(e.key.clone()).or_default();
        if e.is_opening() {
            flow.opened += e.qty;
        } else {
            flow.closing += e.qty;
        }
    }

    let outcome = matcher.finish();
    report.unmatched_closes = outcome.unmatched;

    let mut positions = outcome.closed;
    positions.extend(classify_remainders(outcome.open_lots, as_of, &settings.expiry));
    positions.sort_by(|a, b| {
        a.entry_ts
            .cmp(&b.entry_ts)
            .then_with(|| a.open_execution_id.cmp(&b.open_execution_id))
            .then_with(|| exit_order(a).cmp(&exit_order(b)))
            .then_with(|| a.id.cmp(&b.id))
    });

    let summary = PnlSummary::from_positions(&positions);
    info!(
        executions = log.len(),
        positions = positions.len(),
        closed = summary.closed_count,
        expired = summary.expired_count,
        open = summary.open_count,
        realized_pnl = %summary.realized_pnl,
        excluded = report.excluded_execution_count(),
        "reconciliation complete"
    );

    Reconciliation {
        as_of,
        positions,
        report,
        summary,
        broker,
        flows,
        execution_count: log.len(),
    }
}

/// Open positions (no exit) sort after realized ones of the same lot.
fn exit_order(p: &Position) -> (bool, Option<DateTime<Utc>>) {
    (p.exit_ts.is_none(), p.exit_ts)
}

fn broker_totals(executions: &[Execution]) -> BrokerTotals {
    let mut t = BrokerTotals::default();
    for b in executions.iter().filter_map(|e| e.broker_pnl) {
        t.executions += 1;
        t.realized += b.realized;
        t.realized_without_fees += b.realized_without_fees;
    }
    t
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Instrument, PositionEffect, Side};
    use chrono::TimeZone;

    fn exec(id: &str, side: Side, effect: PositionEffect, qty: i64, secs: i64) -> Execution {
        let instrument = Instrument::Future {
            contract_id: "nq".to_string(),
            symbol: "/NQ".to_string(),
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
            price: Micros::from_dollars(100),
            fee: Micros::ZERO,
            ts: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            multiplier: Some(20),
            broker_pnl: None,
            strategy: None,
        }
    }

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn merge_counts_duplicates_and_conflicts() {
        let mut log = ExecutionLog::new();
        let a = exec("a", Side::Buy, PositionEffect::Opening, 1, 1);
        let stats = log.merge(vec![a.clone(), a.clone()]);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.duplicates, 1);

        let mut changed = a;
        changed.qty = 2;
        let stats = log.merge(vec![changed]);
        assert_eq!(stats.inserted, 0);
        assert!(matches!(
            stats.rejected[0],
            EngineError::ConflictingDuplicate { .. }
        ));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn merge_rejects_invalid() {
        let mut log = ExecutionLog::new();
        let stats = log.merge(vec![exec("a", Side::Buy, PositionEffect::Opening, 0, 1)]);
        assert_eq!(stats.rejected.len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn conservation_holds_after_pass() {
        let log: ExecutionLog = vec![
            exec("o1", Side::Buy, PositionEffect::Opening, 3, 1),
            exec("c1", Side::Sell, PositionEffect::Closing, 2, 2),
            exec("c2", Side::Sell, PositionEffect::Closing, 4, 3),
        ]
        .into_iter()
        .collect();
        let r = reconcile(&log, &ReconcileSettings::default(), as_of());
        assert_eq!(r.report.unmatched_closes[0].qty, 3);
        assert_eq!(r.flows[&ContractKey::new("FUT:nq")], KeyFlow { opened: 3, closing: 6 });
        assert_eq!(r.verify_conservation(), Ok(()));
    }

    #[test]
    fn tampered_positions_fail_conservation() {
        let log: ExecutionLog = vec![exec("o1", Side::Buy, PositionEffect::Opening, 3, 1)]
            .into_iter()
            .collect();
        let mut r = reconcile(&log, &ReconcileSettings::default(), as_of());
        r.positions[0].qty = 2;
        assert!(matches!(
            r.verify_conservation(),
            Err(ConservationError::Opened { opened: 3, accounted: 2, .. })
        ));
    }

    #[test]
    fn broker_totals_are_summed() {
        let mut e = exec("o1", Side::Buy, PositionEffect::Opening, 1, 1);
        e.broker_pnl = Some(crate::types::BrokerPnl {
            realized: Micros::from_dollars(-3),
            realized_without_fees: Micros::from_dollars(-1),
        });
        let log: ExecutionLog = vec![e].into_iter().collect();
        let r = reconcile(&log, &ReconcileSettings::default(), as_of());
        assert_eq!(r.broker.executions, 1);
        assert_eq!(r.broker.realized, Micros::from_dollars(-3));
    }
}
