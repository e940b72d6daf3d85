use std::fmt;

use crate::fixedpoint::Micros;

/// Invariant violations an execution can carry into the engine boundary.
///
/// These are per-execution: the offending execution is rejected, recorded in
/// the reconciliation report, and the pass continues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    EmptyExecutionId,
    EmptyContractKey { execution_id: String },
    NonPositiveQty { execution_id: String, qty: i64 },
    NegativePrice { execution_id: String, price: Micros },
    NegativeFee { execution_id: String, fee: Micros },
    /// Same execution id seen twice with different content.
    ConflictingDuplicate { execution_id: String },
    /// The matcher was handed an execution whose key has no resolved multiplier.
    UnresolvedMultiplier { execution_id: String, key: String },
}

impl EngineError {
    /// Id of the execution this error refers to (empty for `EmptyExecutionId`).
    pub fn execution_id(&self) -> &str {
        match self {
            EngineError::EmptyExecutionId => "",
            EngineError::EmptyContractKey { execution_id }
            | EngineError::NonPositiveQty { execution_id, .. }
            | EngineError::NegativePrice { execution_id, .. }
            | EngineError::NegativeFee { execution_id, .. }
            | EngineError::ConflictingDuplicate { execution_id }
            | EngineError::UnresolvedMultiplier { execution_id, .. } => execution_id,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyExecutionId => write!(f, "execution invariant: id must not be empty"),
            Self::EmptyContractKey { execution_id } => write!(
                f,
                "execution invariant: contract key must not be empty (execution {execution_id})"
            ),
            Self::NonPositiveQty { execution_id, qty } => write!(
                f,
                "execution invariant: qty must be > 0, got {qty} (execution {execution_id})"
            ),
            Self::NegativePrice {
                execution_id,
                price,
            } => write!(
                f,
                "execution invariant: price must be >= 0, got {price} (execution {execution_id})"
            ),
            Self::NegativeFee { execution_id, fee } => write!(
                f,
                "execution invariant: fee must be >= 0, got {fee} (execution {execution_id})"
            ),
            Self::ConflictingDuplicate { execution_id } => write!(
                f,
                "execution {execution_id} seen twice with different content"
            ),
            Self::UnresolvedMultiplier { execution_id, key } => write!(
                f,
                "no multiplier resolved for {key} (execution {execution_id})"
            ),
        }
    }
}

impl std::error::Error for EngineError {}
