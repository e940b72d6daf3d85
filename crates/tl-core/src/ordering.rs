//! Execution ordering policy.
//!
//! Defines the canonical sort order for executions before the matching pass.
//! Matching in canonical order is a mandatory invariant: the same set of
//! executions must always produce the same positions regardless of the order
//! in which they arrived from the broker, how many fetches they were split
//! across, or which accounts were fetched concurrently.
//!
//! # Canonical sort key
//!
//! `(ts, id)` ascending. Execution ids are unique, so the order is total and
//! one global sort is enough; per-contract queues inherit it.

use std::cmp::Ordering;

use crate::types::Execution;

/// Compare two executions by the canonical key.
pub fn canonical_cmp(a: &Execution, b: &Execution) -> Ordering {
    a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id))
}

/// Sort `executions` into canonical order **in place**.
pub fn sort_executions_canonical(executions: &mut [Execution]) {
    executions.sort_by(canonical_cmp);
}
