use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::fs;
use std::path::Path;

use tl_core::{positions_on, AccountBook, DateRange, MarkMap, Reconciliation};
use tl_ingest::parse_decimal;
use tl_store::{rejects_path_for, write_export, ExecutionLogFile, ExportMeta, RejectLogFile};

use super::CliConfig;

/// Rebuild the account from the whole log. Every pass starts from scratch.
fn rebuild(log_path: &str, cfg: &CliConfig, as_of: DateTime<Utc>) -> Result<AccountBook> {
    if !Path::new(log_path).exists() {
        bail!("execution log not found: {log_path} (run `tl ingest` first)");
    }
    let log = ExecutionLogFile::open(log_path)?;
    let mut book = AccountBook::new(&cfg.engine.account_id, cfg.engine.reconcile_settings());
    for r in RejectLogFile::open(rejects_path_for(log.path()))?.load() {
        book.record_ingest_rejection(r.reference, r.reason);
    }
    let (stats, rec) = book.refresh(log.load()?, as_of);
    if !stats.rejected.is_empty() {
        tracing::warn!(rejected = stats.rejected.len(), "log executions rejected by the engine");
    }
    if let Err(err) = rec.verify_conservation() {
        bail!("CONSERVATION_VIOLATION: {err}");
    }
    Ok(book)
}

fn current(book: &AccountBook) -> Result<&Reconciliation> {
    book.current()
        .ok_or_else(|| anyhow!("account {} has not been reconciled", book.account_id()))
}

pub fn run(
    log_path: &str,
    cfg: &CliConfig,
    out: &str,
    as_of: DateTime<Utc>,
    marks_path: Option<&str>,
) -> Result<()> {
    let book = rebuild(log_path, cfg, as_of)?;
    let rec = current(&book)?;

    let files = write_export(
        Path::new(out),
        rec,
        &ExportMeta {
            account_id: book.account_id(),
            config_hash: &cfg.loaded.config_hash,
            timezone: cfg.engine.timezone,
        },
    )?;

    let s = &rec.summary;
    let counts = rec.report.counts();
    println!("account_id={}", book.account_id());
    println!("as_of={}", rec.as_of.to_rfc3339());
    println!("config_hash={}", cfg.loaded.config_hash);
    println!("executions={}", rec.execution_count);
    println!("positions={}", rec.positions.len());
    println!("open={}", s.open_count);
    println!("closed={}", s.closed_count);
    println!("expired={}", s.expired_count);
    println!("realized_pnl={}", s.realized_pnl);
    println!("realized_pnl_before_fees={}", s.realized_pnl_before_fees);
    println!("realized_fees={}", s.realized_fees);
    println!("closed_pnl={}", s.closed_pnl);
    println!("expired_pnl={}", s.expired_pnl);
    println!("open_premium={}", s.open_premium);
    println!("profitable={}", s.is_profitable());
    println!("broker_realized={}", rec.broker.realized);
    println!("broker_realized_without_fees={}", rec.broker.realized_without_fees);
    println!("report_clean={}", rec.report.is_clean());
    println!("rejected={}", counts.rejected);
    println!("orphan_closes={}", counts.orphan_closes);
    println!("unmatched_closes={}", counts.unmatched_closes);
    println!("missing_multiplier_keys={}", counts.missing_multiplier_keys);

    if let Some(p) = marks_path {
        let marks = read_marks(Path::new(p))?;
        let u = rec.unrealized(&marks);
        println!("unrealized_pnl={}", u.pnl);
        println!("unrealized_priced={}", u.priced);
        println!("unrealized_unpriced={}", u.unpriced);
    }

    println!("positions_sha256={}", files.manifest.positions_sha256);
    println!("export_dir={}", files.dir.display());
    Ok(())
}

pub fn daily(
    log_path: &str,
    cfg: &CliConfig,
    as_of: DateTime<Utc>,
    range: DateRange,
    on: Option<NaiveDate>,
) -> Result<()> {
    let book = rebuild(log_path, cfg, as_of)?;
    let rec = current(&book)?;
    let tz = cfg.engine.timezone;

    let days = rec.daily(tz, range);
    println!("timezone={}", tz.name());
    println!("days={}", days.len());
    for d in days.values() {
        println!(
            "date={} pnl={} pnl_before_fees={} fees={} count={} details={:?}",
            d.date, d.pnl, d.pnl_before_fees, d.fees, d.count, d.details
        );
    }

    if let Some(date) = on {
        let closed = positions_on(&rec.positions, date, tz);
        println!("positions_on={} count={}", date, closed.len());
        for p in closed {
            println!(
                "position id={} key={} status={:?} qty={} net_pnl={}",
                p.id,
                p.key,
                p.status,
                p.qty,
                p.net_pnl.map(|n| n.to_string()).unwrap_or_default()
            );
        }
    }
    Ok(())
}

/// `{"<contract key>": "<price>", ...}`
fn read_marks(path: &Path) -> Result<MarkMap> {
    let raw = fs::read_to_string(path).with_context(|| format!("read marks {:?}", path))?;
    let v: Value = serde_json::from_str(&raw).with_context(|| format!("parse marks {:?}", path))?;
    let map = v
        .as_object()
        .ok_or_else(|| anyhow!("{:?}: marks must be a JSON object", path))?;

    let mut items = Vec::with_capacity(map.len());
    for (key, px) in map {
        let px = parse_decimal(px, "mark").map_err(|e| anyhow!("mark for {key}: {e}"))?;
        items.push((key.clone(), px));
    }
    Ok(tl_core::marks(items))
}
