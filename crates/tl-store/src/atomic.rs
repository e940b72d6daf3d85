use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replace `path` with `bytes` so readers see either the old file or the
/// new one, never a partial write. Parent dirs are created as needed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
    }

    let tmp = tmp_path(path);
    {
        let mut f = File::create(&tmp).with_context(|| format!("create temp file {:?}", tmp))?;
        f.write_all(bytes)
            .with_context(|| format!("write temp file {:?}", tmp))?;
        f.sync_all()
            .with_context(|| format!("sync temp file {:?}", tmp))?;
    }

    fs::rename(&tmp, path).with_context(|| format!("rename {:?} -> {:?}", tmp, path))?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Pretty JSON with object keys sorted recursively, newline-terminated.
/// Same value in, same bytes out.
pub fn canonical_json_pretty<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize export value failed")?;
    let sorted = sort_keys(&raw);
    let s = serde_json::to_string_pretty(&sorted).context("json stringify failed")?;
    Ok(format!("{s}\n"))
}

/// Compact single-line form of [`canonical_json_pretty`].
pub(crate) fn canonical_json_line<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize log line failed")?;
    serde_json::to_string(&sort_keys(&raw)).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
