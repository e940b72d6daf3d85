//! Ingest rejects kept beside the execution log.
//!
//! A raw record that fails normalization never reaches the execution log, so
//! it is written here instead and replayed into every later reconciliation.
//! Lines only grow; on load the latest line per reference wins.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use tl_core::RejectedRecord;

use crate::atomic::canonical_json_line;

/// `executions.jsonl` -> `executions.rejects.jsonl`, in the same directory.
pub fn rejects_path_for(log_path: &Path) -> PathBuf {
    log_path.with_extension("rejects.jsonl")
}

pub struct RejectLogFile {
    path: PathBuf,
    current: BTreeMap<String, RejectedRecord>,
}

impl RejectLogFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        let mut file = Self {
            path,
            current: BTreeMap::new(),
        };
        file.current = file.read_all()?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest record per reference, ordered by reference.
    pub fn load(&self) -> Vec<RejectedRecord> {
        self.current.values().cloned().collect()
    }

    /// Append records that differ from what is already on file. Returns how
    /// many lines were written.
    pub fn append(&mut self, records: &[RejectedRecord]) -> Result<usize> {
        let mut buf = String::new();
        let mut written = 0;
        for r in records {
            if self.current.get(&r.reference) == Some(r) {
                continue;
            }
            buf.push_str(&canonical_json_line(r)?);
            buf.push('\n');
            self.current.insert(r.reference.clone(), r.clone());
            written += 1;
        }

        if !buf.is_empty() {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("open rejects file {:?}", self.path))?;
            f.write_all(buf.as_bytes())
                .context("write reject lines failed")?;
            f.sync_data().context("sync rejects file failed")?;
            info!(written, total = self.current.len(), "ingest rejects appended");
        }
        Ok(written)
    }

    fn read_all(&self) -> Result<BTreeMap<String, RejectedRecord>> {
        let mut out = BTreeMap::new();
        if !self.path.exists() {
            return Ok(out);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("read rejects file {:?}", self.path))?;
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let r: RejectedRecord = serde_json::from_str(trimmed)
                .with_context(|| format!("parse reject at line {} of {:?}", i + 1, self.path))?;
            out.insert(r.reference.clone(), r);
        }
        Ok(out)
    }
}
