//! tl-ingest
//!
//! Broker order records to engine executions.
//! - Options (multi-leg) and futures order shapes
//! - Decimal text to micros without floating point
//! - Filled quantity only; unfilled orders produce nothing
//! - Per-record DataErrors; a bad record never aborts a batch

mod error;
mod normalizer;
mod price;
pub mod raw;

pub use error::{DataError, DataErrorKind};
pub use normalizer::{
    allocate_fee, normalize_batch, normalize_order, parse_timestamp, FeeAllocation,
    NormalizedBatch,
};
pub use price::{parse_decimal, parse_micros, parse_quantity};
pub use raw::RawOrder;
