//! Typed view of the configuration keys the engine reads.

use anyhow::{anyhow, bail, Context, Result};
use chrono_tz::Tz;
use serde_json::Value;

use tl_core::{
    ContractKey, ExpiryPolicy, MultiplierTable, ReconcileSettings, DEFAULT_SETTLE_HOUR,
    STANDARD_OPTION_MULTIPLIER,
};
use tl_ingest::FeeAllocation;

pub const DEFAULT_TIMEZONE: &str = "America/New_York";
pub const DEFAULT_ACCOUNT_ID: &str = "default";

/// Every pointer read by [`EngineConfig::from_config_json`]. Keep in step
/// with the reads below; the unused-key lint is derived from it.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/account/id",
    "/reporting/timezone",
    "/reporting/expiry_settle_hour",
    "/fees/allocation",
    "/multipliers/option_default",
    "/multipliers/contracts",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub account_id: String,
    /// Day buckets and expiry settlement are computed on this clock.
    pub timezone: Tz,
    pub expiry_settle_hour: u32,
    pub fee_allocation: FeeAllocation,
    pub multipliers: MultiplierTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            account_id: DEFAULT_ACCOUNT_ID.to_string(),
            timezone: chrono_tz::America::New_York,
            expiry_settle_hour: DEFAULT_SETTLE_HOUR,
            fee_allocation: FeeAllocation::PerContract,
            multipliers: MultiplierTable::new(STANDARD_OPTION_MULTIPLIER),
        }
    }
}

impl EngineConfig {
    /// Extract engine settings from a merged config tree. Absent keys take
    /// their defaults; present keys with the wrong type or range are errors.
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let mut out = EngineConfig::default();

        if let Some(v) = present(config, "/account/id") {
            let id = as_str(v, "/account/id")?.trim();
            if id.is_empty() {
                bail!("CONFIG_INVALID: /account/id must not be empty");
            }
            out.account_id = id.to_string();
        }

        if let Some(v) = present(config, "/reporting/timezone") {
            let name = as_str(v, "/reporting/timezone")?;
            out.timezone = name
                .trim()
                .parse::<Tz>()
                .map_err(|_| anyhow!("CONFIG_INVALID: /reporting/timezone unknown zone '{name}'"))?;
        }

        if let Some(v) = present(config, "/reporting/expiry_settle_hour") {
            let hour = as_u64(v, "/reporting/expiry_settle_hour")?;
            if hour > 23 {
                bail!("CONFIG_INVALID: /reporting/expiry_settle_hour must be 0..=23 (got {hour})");
            }
            out.expiry_settle_hour = hour as u32;
        }

        if let Some(v) = present(config, "/fees/allocation") {
            let raw = as_str(v, "/fees/allocation")?;
            out.fee_allocation = FeeAllocation::parse(raw).ok_or_else(|| {
                anyhow!("CONFIG_INVALID: /fees/allocation must be per_contract or by_premium (got '{raw}')")
            })?;
        }

        let option_default = match present(config, "/multipliers/option_default") {
            Some(v) => positive_multiplier(v, "/multipliers/option_default")?,
            None => STANDARD_OPTION_MULTIPLIER,
        };
        let mut table = MultiplierTable::new(option_default);

        if let Some(v) = present(config, "/multipliers/contracts") {
            let map = v
                .as_object()
                .context("CONFIG_INVALID: /multipliers/contracts must be a mapping")?;
            for (key, m) in map {
                let ptr = format!("/multipliers/contracts/{}", crate::escape_pointer_token(key));
                let m = positive_multiplier(m, &ptr)?;
                table.insert(ContractKey::new(key.trim()), m);
            }
        }
        out.multipliers = table;

        Ok(out)
    }

    pub fn expiry_policy(&self) -> ExpiryPolicy {
        ExpiryPolicy {
            tz: self.timezone,
            settle_hour: self.expiry_settle_hour,
        }
    }

    pub fn reconcile_settings(&self) -> ReconcileSettings {
        ReconcileSettings {
            multipliers: self.multipliers.clone(),
            expiry: self.expiry_policy(),
        }
    }
}

fn present<'a>(config: &'a Value, ptr: &str) -> Option<&'a Value> {
    config.pointer(ptr).filter(|v| !v.is_null())
}

fn as_str<'a>(v: &'a Value, ptr: &str) -> Result<&'a str> {
    v.as_str()
        .with_context(|| format!("CONFIG_INVALID: {ptr} must be a string"))
}

fn as_u64(v: &Value, ptr: &str) -> Result<u64> {
    v.as_u64()
        .with_context(|| format!("CONFIG_INVALID: {ptr} must be a non-negative integer"))
}

fn positive_multiplier(v: &Value, ptr: &str) -> Result<i64> {
    match v.as_i64() {
        Some(m) if m > 0 => Ok(m),
        _ => bail!("CONFIG_INVALID: {ptr} must be a positive integer (got {v})"),
    }
}
