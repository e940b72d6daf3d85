use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::fs;
use std::path::Path;

use tl_config::{
    load_layered_yaml, report_unused_keys, EngineConfig, LoadedConfig, UnusedKeyPolicy,
    UnusedKeyReport,
};
use tl_core::DateRange;

pub mod ingest;
pub mod reconcile;

/// Merged config plus the engine's typed view of it.
pub struct CliConfig {
    pub loaded: LoadedConfig,
    pub unused: UnusedKeyReport,
    pub engine: EngineConfig,
}

/// No paths means an empty config: every setting at its default.
pub fn load_config(paths: &[String], strict: bool) -> Result<CliConfig> {
    let loaded = if paths.is_empty() {
        LoadedConfig::empty()?
    } else {
        let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
        load_layered_yaml(&path_refs)?
    };
    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = report_unused_keys(&loaded.config_json, policy)?;
    let engine = EngineConfig::from_config_json(&loaded.config_json)?;
    Ok(CliConfig {
        loaded,
        unused,
        engine,
    })
}

pub fn parse_as_of(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(Utc::now()),
        Some(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|d| d.with_timezone(&Utc))
            .with_context(|| format!("invalid --as-of (RFC 3339 expected): {s}")),
    }
}

pub fn parse_day(raw: &str, flag: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("invalid {flag} (YYYY-MM-DD expected): {raw}"))
}

pub fn parse_range(from: Option<&str>, to: Option<&str>) -> Result<DateRange> {
    let range = DateRange {
        from: from.map(|d| parse_day(d, "--from")).transpose()?,
        to: to.map(|d| parse_day(d, "--to")).transpose()?,
    };
    if let (Some(f), Some(t)) = (range.from, range.to) {
        if f > t {
            bail!("--from {f} is after --to {t}");
        }
    }
    Ok(range)
}

/// Raw broker records from one file.
///
/// Accepts a JSON array, a paginated `{"results": [...]}` page, a single
/// record object, or JSON Lines.
pub fn read_records(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path).with_context(|| format!("read input {:?}", path))?;

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(Value::Object(mut map)) => match map.remove("results") {
            Some(Value::Array(items)) => Ok(items),
            Some(_) => bail!("{:?}: 'results' is not an array", path),
            None => Ok(vec![Value::Object(map)]),
        },
        Ok(_) => bail!("{:?}: expected a JSON array or object", path),
        Err(_) => raw
            .lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                serde_json::from_str(l)
                    .with_context(|| format!("{:?}: invalid JSON at line {}", path, i + 1))
            })
            .collect(),
    }
}
