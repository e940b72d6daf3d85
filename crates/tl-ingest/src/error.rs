use std::fmt;

/// Why a raw broker record (or one of its legs) could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataErrorKind {
    /// The record is not an object of any known broker shape.
    Malformed(String),
    /// A required field is absent or null.
    MissingField(&'static str),
    InvalidTimestamp { field: &'static str, raw: String },
    /// Empty, non-numeric, or more precise than 1e-6.
    InvalidPrice { field: &'static str, raw: String },
    /// Not a whole, non-negative number of contracts.
    InvalidQuantity { field: &'static str, raw: String },
    InvalidDate { field: &'static str, raw: String },
    UnknownSide(String),
    UnknownEffect(String),
    UnknownOptionType(String),
    /// A filled order without any leg.
    NoLegs,
}

/// A normalization failure tied to the broker reference it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataError {
    /// Order id (plus leg index when the failure is leg-specific), or the
    /// best reference available for records without one.
    pub execution_ref: String,
    pub kind: DataErrorKind,
}

impl DataError {
    pub fn new(execution_ref: impl Into<String>, kind: DataErrorKind) -> Self {
        Self {
            execution_ref: execution_ref.into(),
            kind,
        }
    }
}

impl fmt::Display for DataErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataErrorKind::Malformed(msg) => write!(f, "malformed record: {msg}"),
            DataErrorKind::MissingField(field) => write!(f, "missing field '{field}'"),
            DataErrorKind::InvalidTimestamp { field, raw } => {
                write!(f, "timestamp field '{field}' could not be parsed: '{raw}'")
            }
            DataErrorKind::InvalidPrice { field, raw } => {
                write!(f, "decimal field '{field}' could not be parsed: '{raw}'")
            }
            DataErrorKind::InvalidQuantity { field, raw } => write!(
                f,
                "quantity field '{field}' is not a whole non-negative number: '{raw}'"
            ),
            DataErrorKind::InvalidDate { field, raw } => {
                write!(f, "date field '{field}' is not YYYY-MM-DD: '{raw}'")
            }
            DataErrorKind::UnknownSide(raw) => write!(f, "unknown side '{raw}'"),
            DataErrorKind::UnknownEffect(raw) => write!(f, "unknown position effect '{raw}'"),
            DataErrorKind::UnknownOptionType(raw) => write!(f, "unknown option type '{raw}'"),
            DataErrorKind::NoLegs => write!(f, "filled order has no legs"),
        }
    }
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.execution_ref, self.kind)
    }
}

impl std::error::Error for DataError {}
