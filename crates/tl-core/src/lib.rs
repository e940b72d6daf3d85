//! tl-core
//!
//! Order-to-position reconciliation and P&L engine.
//! - Executions are immutable facts; positions are derived, never patched
//! - One global canonical sort, per-contract FIFO lot queues
//! - Orphan closes and lot exhaustion are reported, never fabricated
//! - Fixed-point money, rounded to cents only when a position is emitted
//! - Pure deterministic logic (no IO, no wall clock, no broker wiring)

mod classifier;
mod error;
mod fixedpoint;
mod matcher;
mod multiplier;
mod ordering;
mod orphan;
mod types;

pub mod account;
pub mod pnl;
pub mod reconciler;
pub mod report;

pub use account::AccountBook;
pub use classifier::{classify_remainders, ExpiryPolicy, DEFAULT_SETTLE_HOUR};
pub use error::EngineError;
pub use fixedpoint::{Micros, MICROS_PER_CENT, MICROS_SCALE};
pub use matcher::{LotMatcher, MatchOutcome, OpenLot};
pub use multiplier::{MultiplierTable, STANDARD_OPTION_MULTIPLIER};
pub use ordering::{canonical_cmp, sort_executions_canonical};
pub use orphan::{filter_orphans, FilterOutcome};
pub use pnl::{
    daily_pnl, gross_pnl, net_pnl, positions_on, realized_lines, unrealized_pnl, DailyPnl,
    DateRange, MarkMap, PnlSummary, RealizedLine, UnrealizedPnl,
};
pub use reconciler::{
    reconcile, BrokerTotals, ConservationError, ExecutionLog, KeyFlow, MergeStats,
    ReconcileSettings, Reconciliation,
};
pub use report::{
    Diagnostic, DiagnosticKind, MissingMultiplier, OrphanClose, ReconcileReport, RejectStage,
    RejectedRecord, ReportCounts, UnmatchedClose,
};
pub use types::{
    BrokerPnl, ContractKey, Direction, Execution, FeeSplit, Instrument, Lot, OptionRight,
    Position, PositionEffect, PositionStatus, Side,
};

/// Helper to build a [`MarkMap`] with minimal boilerplate.
pub fn marks<I, K>(items: I) -> MarkMap
where
    I: IntoIterator<Item = (K, Micros)>,
    K: Into<String>,
{
    items
        .into_iter()
        .map(|(k, px)| (ContractKey::new(k), px))
        .collect()
}
