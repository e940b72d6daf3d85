//! Append-only execution log (JSON Lines, one execution per line).
//!
//! Executions are immutable facts, so the file only ever grows. An id that
//! is already on disk is never written again; the first copy wins, matching
//! the in-memory `ExecutionLog`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use tl_core::Execution;

use crate::atomic::canonical_json_line;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendStats {
    pub inserted: usize,
    pub duplicates: usize,
}

pub struct ExecutionLogFile {
    path: PathBuf,
    seen: BTreeSet<String>,
    last_ts: Option<DateTime<Utc>>,
}

impl ExecutionLogFile {
    /// Open (or start) a log at `path`. Existing lines are scanned once to
    /// index ids; a line that does not parse is an error naming its number.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        let mut log = Self {
            path,
            seen: BTreeSet::new(),
            last_ts: None,
        };
        for e in log.load()? {
            log.note(&e);
        }
        debug!(path = ?log.path, executions = log.seen.len(), "execution log opened");
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Every execution on disk, in file order. Repeated ids (a file edited
    /// by hand) keep their first occurrence.
    pub fn load(&self) -> Result<Vec<Execution>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("read execution log {:?}", self.path))?;

        let mut ids = BTreeSet::new();
        let mut out = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let e: Execution = serde_json::from_str(trimmed)
                .with_context(|| format!("parse execution at line {} of {:?}", i + 1, self.path))?;
            if ids.insert(e.id.clone()) {
                out.push(e);
            }
        }
        Ok(out)
    }

    /// Append executions whose ids are not yet on disk.
    pub fn append_new(&mut self, executions: &[Execution]) -> Result<AppendStats> {
        let mut stats = AppendStats::default();
        let mut buf = String::new();
        let mut batch_ids: BTreeSet<&str> = BTreeSet::new();
        let mut fresh: Vec<&Execution> = Vec::new();
        for e in executions {
            if self.seen.contains(&e.id) || !batch_ids.insert(e.id.as_str()) {
                stats.duplicates += 1;
                continue;
            }
            buf.push_str(&canonical_json_line(e)?);
            buf.push('\n');
            fresh.push(e);
        }

        if !buf.is_empty() {
            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("open execution log {:?}", self.path))?;
            f.write_all(buf.as_bytes())
                .context("write execution lines failed")?;
            f.sync_data().context("sync execution log failed")?;
        }

        for e in fresh {
            self.note(e);
            stats.inserted += 1;
        }
        info!(
            inserted = stats.inserted,
            duplicates = stats.duplicates,
            total = self.seen.len(),
            "execution log appended"
        );
        Ok(stats)
    }

    /// Latest execution timestamp on disk; the lower bound for the next
    /// incremental fetch.
    pub fn last_execution_ts(&self) -> Option<DateTime<Utc>> {
        self.last_ts
    }

    fn note(&mut self, e: &Execution) {
        self.seen.insert(e.id.clone());
        self.last_ts = Some(self.last_ts.map_or(e.ts, |t| t.max(e.ts)));
    }
}
