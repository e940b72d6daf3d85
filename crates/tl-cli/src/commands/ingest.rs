use anyhow::Result;
use std::path::Path;
use tracing::info;

use tl_core::RejectedRecord;
use tl_ingest::normalize_batch;
use tl_store::{rejects_path_for, ExecutionLogFile, RejectLogFile};

use super::{read_records, CliConfig};

pub fn run(log_path: &str, cfg: &CliConfig, inputs: &[String]) -> Result<()> {
    let mut log = ExecutionLogFile::open(log_path)?;
    let before = log.last_execution_ts();

    let mut records = 0usize;
    let mut executions = Vec::new();
    let mut errors = Vec::new();
    let mut unfilled = 0usize;
    for input in inputs {
        let raw = read_records(Path::new(input))?;
        records += raw.len();
        let batch = normalize_batch(&raw, cfg.engine.fee_allocation);
        executions.extend(batch.executions);
        errors.extend(batch.errors);
        unfilled += batch.unfilled;
    }

    let stats = log.append_new(&executions)?;
    let mut rejects = RejectLogFile::open(rejects_path_for(log.path()))?;
    let rejected: Vec<RejectedRecord> = errors
        .iter()
        .map(|err| RejectedRecord::ingest(err.execution_ref.as_str(), err.kind.to_string()))
        .collect();
    rejects.append(&rejected)?;
    info!(
        records,
        executions = executions.len(),
        rejected = errors.len(),
        "ingest done"
    );

    println!("records={}", records);
    println!("executions={}", executions.len());
    println!("inserted={}", stats.inserted);
    println!("duplicates={}", stats.duplicates);
    println!("unfilled={}", unfilled);
    println!("rejected={}", errors.len());
    for err in &errors {
        println!("rejected_ref={} reason={}", err.execution_ref, err.kind);
    }
    println!("rejects_file={}", rejects.path().display());
    println!("log_executions={}", log.len());
    println!("previous_last_execution_ts={}", opt_ts(before));
    println!("last_execution_ts={}", opt_ts(log.last_execution_ts()));
    println!("fee_allocation={}", cfg.engine.fee_allocation.as_str());
    Ok(())
}

fn opt_ts(ts: Option<chrono::DateTime<chrono::Utc>>) -> String {
    ts.map(|t| t.to_rfc3339()).unwrap_or_else(|| "NONE".to_string())
}
