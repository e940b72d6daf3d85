//! Replace-all export of one reconciliation pass.
//!
//! Every pass rewrites the whole export directory from the recomputed
//! position set; nothing is patched in place. The manifest is written last
//! and carries the SHA-256 of each file, so two passes over the same log and
//! config can be compared by manifest alone.

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use tl_core::{
    BrokerTotals, DailyPnl, DateRange, Diagnostic, PnlSummary, Position, ReconcileReport,
    Reconciliation, ReportCounts,
};

use crate::atomic::{canonical_json_pretty, sha256_hex, write_atomic};

pub const EXPORT_SCHEMA_VERSION: i32 = 1;
pub const MANIFEST_FILE: &str = "manifest.json";

const POSITIONS_FILE: &str = "positions.json";
const REPORT_FILE: &str = "report.json";
const DAILY_FILE: &str = "daily.json";
const SUMMARY_FILE: &str = "summary.json";

/// Context recorded next to the pass results.
#[derive(Debug, Clone)]
pub struct ExportMeta<'a> {
    pub account_id: &'a str,
    pub config_hash: &'a str,
    /// Clock used for the daily buckets.
    pub timezone: Tz,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub schema_version: i32,
    pub account_id: String,
    pub as_of: DateTime<Utc>,
    pub config_hash: String,
    pub timezone: String,
    pub execution_count: usize,
    pub position_count: usize,
    pub report_clean: bool,
    pub positions_sha256: String,
    /// File name -> SHA-256 hex of its bytes.
    pub files: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ExportFiles {
    pub dir: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: ExportManifest,
}

#[derive(Serialize)]
struct PositionsDoc<'a> {
    positions: &'a [Position],
}

#[derive(Serialize)]
struct ReportDoc<'a> {
    counts: ReportCounts,
    diagnostics: Vec<Diagnostic>,
    report: &'a ReconcileReport,
}

#[derive(Serialize)]
struct DailyDoc {
    timezone: String,
    days: Vec<DailyPnl>,
}

#[derive(Serialize)]
struct SummaryDoc {
    as_of: DateTime<Utc>,
    summary: PnlSummary,
    broker: BrokerTotals,
    /// `None` when per-key quantities balance, else the first violation.
    conservation_error: Option<String>,
}

/// Write `rec` into `dir` as positions/report/daily/summary JSON plus the
/// manifest.
pub fn write_export(dir: &Path, rec: &Reconciliation, meta: &ExportMeta<'_>) -> Result<ExportFiles> {
    let days: Vec<DailyPnl> = rec.daily(meta.timezone, DateRange::all()).into_values().collect();

    let docs: [(&str, String); 4] = [
        (
            POSITIONS_FILE,
            canonical_json_pretty(&PositionsDoc {
                positions: &rec.positions,
            })?,
        ),
        (
            REPORT_FILE,
            canonical_json_pretty(&ReportDoc {
                counts: rec.report.counts(),
                diagnostics: rec.report.diagnostics(),
                report: &rec.report,
            })?,
        ),
        (
            DAILY_FILE,
            canonical_json_pretty(&DailyDoc {
                timezone: meta.timezone.name().to_string(),
                days,
            })?,
        ),
        (
            SUMMARY_FILE,
            canonical_json_pretty(&SummaryDoc {
                as_of: rec.as_of,
                summary: rec.summary,
                broker: rec.broker,
                conservation_error: rec.verify_conservation().err().map(|e| e.to_string()),
            })?,
        ),
    ];

    let mut files = BTreeMap::new();
    for (name, body) in &docs {
        write_atomic(&dir.join(name), body.as_bytes())?;
        files.insert(name.to_string(), sha256_hex(body.as_bytes()));
    }

    let positions_sha256 = files.get(POSITIONS_FILE).cloned().unwrap_or_default();
    let manifest = ExportManifest {
        schema_version: EXPORT_SCHEMA_VERSION,
        account_id: meta.account_id.to_string(),
        as_of: rec.as_of,
        config_hash: meta.config_hash.to_string(),
        timezone: meta.timezone.name().to_string(),
        execution_count: rec.execution_count,
        position_count: rec.positions.len(),
        report_clean: rec.report.is_clean(),
        positions_sha256,
        files,
    };

    let manifest_path = dir.join(MANIFEST_FILE);
    write_atomic(&manifest_path, canonical_json_pretty(&manifest)?.as_bytes())?;

    info!(
        dir = ?dir,
        positions = manifest.position_count,
        executions = manifest.execution_count,
        positions_sha256 = %manifest.positions_sha256,
        "export written"
    );

    Ok(ExportFiles {
        dir: dir.to_path_buf(),
        manifest_path,
        manifest,
    })
}
