//! Audit error types.

use thiserror::Error;

/// Errors from the audit trail.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Writing to the sink failed.
    #[error("audit io error: {0}")]
    Io(#[from] std::io::Error),

    /// An entry could not be serialized.
    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
