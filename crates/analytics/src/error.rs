//! Error types for the analytics engine
//!
//! Every failure inside a per-user pipeline is caught at the user boundary:
//! other users in the same flush are never affected, and callers of the
//! query API never observe an error, only the absence of an update.

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while processing a user's sub-batch
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// A pipeline stage failed; partial results written before the failure
    /// are kept
    #[error("transient processing error: {0}")]
    Transient(String),

    /// A metric field was missing or malformed where one was expected.
    /// Normally handled as an insufficient-sample condition and never raised
    /// across the user boundary.
    #[error("data shape error: {0}")]
    DataShape(String),

    /// A durable-store write failed; in-memory state is untouched
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A per-user pipeline exceeded its time budget
    #[error("pipeline for user {user_id} timed out after {timeout_ms}ms")]
    Timeout { user_id: String, timeout_ms: u64 },
}

impl EngineError {
    /// Short tag used in log fields and flush reports
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Transient(_) => "transient",
            EngineError::DataShape(_) => "data_shape",
            EngineError::Persistence(_) => "persistence",
            EngineError::Timeout { .. } => "timeout",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::Timeout {
            user_id: "u1".to_string(),
            timeout_ms: 5000,
        };
        assert_eq!(err.to_string(), "pipeline for user u1 timed out after 5000ms");
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(EngineError::Transient("x".into()).kind(), "transient");
        assert_eq!(EngineError::DataShape("x".into()).kind(), "data_shape");
        assert_eq!(EngineError::Persistence("x".into()).kind(), "persistence");
    }
}
