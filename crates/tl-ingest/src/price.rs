//! Decimal text to fixed-point conversion.
//!
//! Broker payloads carry prices, amounts and quantities as decimal strings
//! (`"1.2300000000"`) or, occasionally, bare JSON numbers. Both go through
//! [`parse_micros`]; floating point is never involved.

use serde_json::Value;
use tl_core::{Micros, MICROS_SCALE};

use crate::error::DataErrorKind;

/// Convert a decimal string to micros deterministically.
///
/// Rules:
/// - Accepts optional leading `+` or `-`.
/// - Accepts an optional fractional part separated by `.`.
/// - Digits past the sixth decimal place must all be `0` (brokers pad
///   prices to ten places); anything else would require rounding and is
///   rejected.
/// - Rejects empty strings, non-numeric characters, or multiple `.`
///   separators.
pub fn parse_micros(s: &str, field: &'static str) -> Result<Micros, DataErrorKind> {
    let invalid = || DataErrorKind::InvalidPrice {
        field,
        raw: s.to_string(),
    };
    let t = s.trim();
    if t.is_empty() {
        return Err(invalid());
    }

    let (negative, digits) = if let Some(rest) = t.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = t.strip_prefix('+') {
        (false, rest)
    } else {
        (false, t)
    };

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }

    let (frac_kept, frac_excess) = frac_part.split_at(frac_part.len().min(6));
    if frac_excess.chars().any(|c| c != '0') {
        return Err(invalid());
    }

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<i64>().map_err(|_| invalid())?
    };

    let mut frac_padded = frac_kept.to_string();
    while frac_padded.len() < 6 {
        frac_padded.push('0');
    }
    let frac_val: i64 = frac_padded.parse::<i64>().map_err(|_| invalid())?;

    let micros = int_val
        .checked_mul(MICROS_SCALE)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(invalid)?;

    Ok(Micros::new(if negative { -micros } else { micros }))
}

/// Parse a whole, non-negative contract count (`"4"`, `"4.00000"`, `4`).
pub fn parse_quantity(v: &Value, field: &'static str) -> Result<i64, DataErrorKind> {
    let raw = value_text(v).ok_or(DataErrorKind::MissingField(field))?;
    let invalid = || DataErrorKind::InvalidQuantity {
        field,
        raw: raw.clone(),
    };
    let m = parse_micros(&raw, field).map_err(|_| invalid())?;
    if m.is_negative() || m.raw() % MICROS_SCALE != 0 {
        return Err(invalid());
    }
    Ok(m.raw() / MICROS_SCALE)
}

/// Parse a decimal field that may be a JSON string or number.
pub fn parse_decimal(v: &Value, field: &'static str) -> Result<Micros, DataErrorKind> {
    let raw = value_text(v).ok_or(DataErrorKind::MissingField(field))?;
    parse_micros(&raw, field)
}

/// Like [`parse_decimal`] but an absent field reads as `None`.
pub fn parse_decimal_opt(v: Option<&Value>, field: &'static str) -> Result<Option<Micros>, DataErrorKind> {
    match v {
        None | Some(Value::Null) => Ok(None),
        Some(v) => parse_decimal(v, field).map(Some),
    }
}

/// Textual form of a scalar JSON value; `None` for null, objects and arrays.
fn value_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
