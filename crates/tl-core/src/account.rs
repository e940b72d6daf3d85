//! Per-account computed state.
//!
//! An [`AccountBook`] owns one account's execution log and the latest
//! reconciliation computed from it. `refresh` takes `&mut self`, so two
//! recomputations of the same account cannot interleave; the caller holds the
//! book (behind its own lock if it serves requests concurrently).

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::info;

use crate::reconciler::{reconcile, ExecutionLog, MergeStats, ReconcileSettings, Reconciliation};
use crate::report::{RejectStage, RejectedRecord};
use crate::types::Execution;

#[derive(Clone, Debug)]
pub struct AccountBook {
    account_id: String,
    settings: ReconcileSettings,
    log: ExecutionLog,
    /// Records refused at ingest or merge time, across every refresh, keyed
    /// by reference. A re-fetched reject replaces its earlier entry.
    rejected: BTreeMap<String, RejectedRecord>,
    current: Option<Reconciliation>,
}

impl AccountBook {
    pub fn new(account_id: impl Into<String>, settings: ReconcileSettings) -> Self {
        Self {
            account_id: account_id.into(),
            settings,
            log: ExecutionLog::new(),
            rejected: BTreeMap::new(),
            current: None,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Note a raw broker record that never became an execution. It is
    /// reported by every later refresh until the record arrives intact.
    pub fn record_ingest_rejection(&mut self, reference: impl Into<String>, reason: impl Into<String>) {
        let record = RejectedRecord::ingest(reference, reason);
        self.rejected.insert(record.reference.clone(), record);
    }

    /// Merge newly fetched executions and recompute everything from the
    /// full log. The previous reconciliation is replaced, never patched.
    pub fn refresh<I>(&mut self, fetched: I, as_of: DateTime<Utc>) -> (MergeStats, &Reconciliation)
    where
        I: IntoIterator<Item = Execution>,
    {
        let stats = self.log.merge(fetched);
        for err in &stats.rejected {
            let record = RejectedRecord::engine(err);
            self.rejected.insert(record.reference.clone(), record);
        }
        let log = &self.log;
        self.rejected.retain(|reference, r| {
            r.stage != RejectStage::Ingest || !log.executions().any(|e| refers_to(e, reference))
        });

        let mut rec = reconcile(&self.log, &self.settings, as_of);
        let mut rejected: Vec<RejectedRecord> = self.rejected.values().cloned().collect();
        rejected.append(&mut rec.report.rejected);
        rec.report.rejected = rejected;

        info!(
            account = %self.account_id,
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            rejected = stats.rejected.len(),
            "account refreshed"
        );
        let current: &Reconciliation = self.current.insert(rec);
        (stats, current)
    }

    /// Latest reconciliation, if `refresh` has run.
    pub fn current(&self) -> Option<&Reconciliation> {
        self.current.as_ref()
    }
}

/// Ingest rejects name either the order or one of its leg executions.
fn refers_to(e: &Execution, reference: &str) -> bool {
    e.id == reference || e.order_id == reference
}
