//! tl-store
//!
//! File-backed persistence around the reconciliation engine.
//! - Append-only JSONL execution log, one execution per line, deduplicated by id
//! - Ingest rejects beside the log, replayed into every reconciliation
//! - Export of a reconciliation pass as canonical JSON files, replaced atomically
//! - Manifest with content hashes so repeated passes can be compared byte for byte

mod atomic;
mod export;
mod log;
mod rejects;

pub use atomic::{canonical_json_pretty, sha256_hex, write_atomic};
pub use export::{
    write_export, ExportFiles, ExportManifest, ExportMeta, EXPORT_SCHEMA_VERSION, MANIFEST_FILE,
};
pub use log::{AppendStats, ExecutionLogFile};
pub use rejects::{rejects_path_for, RejectLogFile};
