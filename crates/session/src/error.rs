//! Error types for the session layer.

use thiserror::Error;

/// Result type alias for the session layer.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Failures surfaced to the presentation layer.
///
/// The layout engine itself never fails; everything here comes from talking
/// to the assignment service or from decoding what it sent back.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Connection, timeout or I/O failure
    #[error("Transport error: {0}")]
    Transport(String),
    /// Service answered with a non-success status
    #[error("Service returned {code}: {message}")]
    Status { code: u16, message: String },
    /// Response body was not valid JSON for the expected shape
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
    /// Service rejected the operation
    #[error("Service error: {0}")]
    Service(String),
}

impl SessionError {
    /// True when retrying the same request can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Transport(_) => true,
            SessionError::Status { code, .. } => *code >= 500,
            SessionError::Decode(_) => true,
            SessionError::Service(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(SessionError::Transport("refused".into()).is_retryable());
        assert!(SessionError::Status {
            code: 503,
            message: "busy".into()
        }
        .is_retryable());
        assert!(!SessionError::Status {
            code: 400,
            message: "bad".into()
        }
        .is_retryable());
        assert!(!SessionError::Service("unknown algorithm".into()).is_retryable());
    }
}
