//! Orphan close filter.
//!
//! Runs ahead of the matcher over the **full** execution history (not just a
//! freshly fetched window). A closing execution is an orphan when no opening
//! execution of the direction it would close exists for its contract key
//! anywhere in that history: typically a position opened before data
//! collection started. Orphans are excluded from matching and P&L and are
//! always returned for reporting.
//!
//! Closes that do have an opening somewhere, but find no lot left when they
//! are processed (opened later, or already consumed), are not orphans here;
//! the matcher reports their surplus as unmatched.

use std::collections::BTreeSet;

use tracing::warn;

use crate::report::OrphanClose;
use crate::types::{ContractKey, Direction, Execution};

/// Output of [`filter_orphans`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// Executions that may enter the matcher, in input order.
    pub usable: Vec<Execution>,
    /// Excluded closing executions, in input order.
    pub excluded: Vec<OrphanClose>,
}

/// Split `history` into usable executions and orphan closes.
///
/// Input order is preserved in both outputs.
pub fn filter_orphans(history: Vec<Execution>) -> FilterOutcome {
    let opened: BTreeSet<(ContractKey, Direction)> = history
        .iter()
        .filter(|e| e.is_opening())
        .map(|e| (e.key.clone(), Direction::opened_by(e.side)))
        .collect();

    let mut out = FilterOutcome::default();
    for e in history {
        if e.is_closing() && !opened.contains(&(e.key.clone(), Direction::closed_by(e.side))) {
            warn!(
                execution_id = %e.id,
                key = %e.key,
                qty = e.qty,
                "orphan close excluded: no opening execution in history"
            );
            out.excluded.push(OrphanClose {
                execution_id: e.id,
                key: e.key,
                side: e.side,
                qty: e.qty,
                ts: e.ts,
            });
        } else {
            out.usable.push(e);
        }
    }
    out
}
