use crate::core::types::NativeSignal;
use std::time::Duration;
use thiserror::Error;

/// Failure taxonomy surfaced to callers.
///
/// Exactly one of these kinds is produced per lock request. `StoreIo`
/// carries the original store-native signal untouched so diagnostics
/// never lose the backend's own error code.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LockError {
    #[error("lock wait timed out after {waited:?}")]
    Timeout { waited: Duration },

    #[error("lock conflict: {reason}")]
    Conflict { reason: String },

    #[error("unclassified store failure: {0}")]
    StoreIo(NativeSignal),

    #[error("invalid lock request: {0}")]
    InvalidRequest(String),

    #[error("transaction error: {0}")]
    Transaction(String),
}

pub type Result<T> = std::result::Result<T, LockError>;
