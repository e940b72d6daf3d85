//! Diagnostics of a reconciliation pass.
//!
//! Nothing the engine excludes is dropped silently: every rejected,
//! orphaned, exhausted or unpriceable execution lands in [`ReconcileReport`]
//! with its identity, so the serving layer can show totals next to the count
//! and nature of what was left out.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::{ContractKey, Side};

/// Where a record was rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectStage {
    /// Raw broker record could not be normalized.
    Ingest,
    /// Normalized execution violated an engine invariant.
    Engine,
}

/// A record excluded because it was malformed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRecord {
    pub stage: RejectStage,
    /// Execution id, or the best available broker reference for ingest rejects.
    pub reference: String,
    pub reason: String,
}

impl RejectedRecord {
    pub fn ingest(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: RejectStage::Ingest,
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn engine(err: &EngineError) -> Self {
        Self {
            stage: RejectStage::Engine,
            reference: err.execution_id().to_string(),
            reason: err.to_string(),
        }
    }
}

/// A closing execution whose contract key has no opening execution anywhere
/// in the full history (typically opened before data collection started).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanClose {
    pub execution_id: String,
    pub key: ContractKey,
    pub side: Side,
    pub qty: i64,
    pub ts: DateTime<Utc>,
}

/// Closing quantity left over after every available lot was consumed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedClose {
    pub execution_id: String,
    pub key: ContractKey,
    pub side: Side,
    /// Surplus quantity (not the execution's full quantity).
    pub qty: i64,
    pub ts: DateTime<Utc>,
}

/// A contract whose multiplier could not be resolved. All of its executions
/// are excluded; no position is computed for it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingMultiplier {
    pub key: ContractKey,
    pub execution_ids: Vec<String>,
}

/// Non-fatal diagnostic categories, flattened for display.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    OrphanClose,
    MatchExhaustion,
    MultiplierMissing,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub execution_id: String,
    pub key: ContractKey,
    /// Quantity excluded from P&L; `None` when the whole execution is out.
    pub qty: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub rejected: Vec<RejectedRecord>,
    pub orphan_closes: Vec<OrphanClose>,
    pub unmatched_closes: Vec<UnmatchedClose>,
    pub missing_multipliers: Vec<MissingMultiplier>,
}

/// Counts per diagnostic category.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCounts {
    pub rejected: usize,
    pub orphan_closes: usize,
    pub orphan_close_qty: i64,
    pub unmatched_closes: usize,
    pub unmatched_close_qty: i64,
    pub missing_multiplier_keys: usize,
    pub missing_multiplier_executions: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
            && self.orphan_closes.is_empty()
            && self.unmatched_closes.is_empty()
            && self.missing_multipliers.is_empty()
    }

    pub fn counts(&self) -> ReportCounts {
        ReportCounts {
            rejected: self.rejected.len(),
            orphan_closes: self.orphan_closes.len(),
            orphan_close_qty: self.orphan_closes.iter().map(|o| o.qty).sum(),
            unmatched_closes: self.unmatched_closes.len(),
            unmatched_close_qty: self.unmatched_closes.iter().map(|u| u.qty).sum(),
            missing_multiplier_keys: self.missing_multipliers.len(),
            missing_multiplier_executions: self
                .missing_multipliers
                .iter()
                .map(|m| m.execution_ids.len())
                .sum(),
        }
    }

    /// One line per excluded execution, grouped by category.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let orphans = self.orphan_closes.iter().map(|o| Diagnostic {
            kind: DiagnosticKind::OrphanClose,
            execution_id: o.execution_id.clone(),
            key: o.key.clone(),
            qty: Some(o.qty),
        });
        let exhausted = self.unmatched_closes.iter().map(|u| Diagnostic {
            kind: DiagnosticKind::MatchExhaustion,
            execution_id: u.execution_id.clone(),
            key: u.key.clone(),
            qty: Some(u.qty),
        });
        let missing = self.missing_multipliers.iter().flat_map(|m| {
            m.execution_ids.iter().map(move |id| Diagnostic {
                kind: DiagnosticKind::MultiplierMissing,
                execution_id: id.clone(),
                key: m.key.clone(),
                qty: None,
            })
        });
        orphans.chain(exhausted).chain(missing).collect()
    }

    /// Total number of executions excluded from P&L, in whole or in part.
    pub fn excluded_execution_count(&self) -> usize {
        let c = self.counts();
        c.rejected + c.orphan_closes + c.unmatched_closes + c.missing_multiplier_executions
    }
}
