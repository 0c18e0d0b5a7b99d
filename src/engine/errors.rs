//! # Storage Engine Errors

use thiserror::Error;

/// Result type for storage-engine calls
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures reported by a storage-engine handle. The compiler inspects them
/// only for success/failure and propagates them unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Storage engine unavailable: {0}")]
    Unavailable(String),

    #[error("Statement rejected: {0}")]
    Rejected(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unknown composite type: {0}")]
    UnknownType(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

impl EngineError {
    /// Stable code used in log lines
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Unavailable(_) => "UNAVAILABLE",
            EngineError::Rejected(_) => "REJECTED",
            EngineError::AlreadyExists(_) => "ALREADY_EXISTS",
            EngineError::UnknownType(_) => "UNKNOWN_TYPE",
            EngineError::Timeout(_) => "TIMEOUT",
        }
    }
}
