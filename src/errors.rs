//! Error types for the toolbroker orchestration core
//!
//! Recoverable conditions (whitelist denials, unknown tools, tool timeouts)
//! are converted into error ToolResult blocks at the execution-engine
//! boundary so the model can explain them. Only transport-level and
//! loop-bound errors escape to the turn caller.

use std::path::PathBuf;
use thiserror::Error;

use crate::whitelist::OperationKind;

/// Main error type for the orchestration core
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Whitelist violation: recoverable, reported to the model
    #[error("access denied: {operation:?} on {path}", path = .path.display())]
    AccessDenied {
        path: PathBuf,
        operation: OperationKind,
    },

    /// Request named a tool that is not registered: recoverable
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution exceeded its configured timeout: recoverable
    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    /// Model transport failure (network, rate limit, server error): retryable
    #[error("model transport error: {0}")]
    Transport(String),

    /// Retry budget for the model call is spent: fatal for the turn
    #[error("model call failed after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Tool loop ran past the configured iteration bound: fatal for the turn
    #[error("tool loop exceeded {max_iterations} iterations")]
    ToolLoopExceeded { max_iterations: usize },

    /// Model response could not be interpreted: fatal, never guess intent
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// Tool rejected its arguments before doing any work: recoverable
    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{0}")]
    Internal(String),
}

/// Result type alias for orchestration operations
pub type Result<T> = std::result::Result<T, BrokerError>;

impl BrokerError {
    /// Whether the execution engine should convert this error into an error
    /// ToolResult instead of failing the turn.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BrokerError::AccessDenied { .. }
                | BrokerError::ToolNotFound(_)
                | BrokerError::ToolTimeout { .. }
                | BrokerError::InvalidArguments(_)
        )
    }

    /// Whether the orchestrator may retry the operation that produced this
    /// error. Only transient transport conditions qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Transport(_) | BrokerError::Http(_))
    }
}

/// Convert anyhow errors from integration edges into BrokerError
impl From<anyhow::Error> for BrokerError {
    fn from(err: anyhow::Error) -> Self {
        BrokerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_display() {
        let err = BrokerError::AccessDenied {
            path: PathBuf::from("/etc/passwd"),
            operation: OperationKind::Read,
        };
        assert!(err.to_string().contains("/etc/passwd"));
        assert!(err.to_string().contains("Read"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(BrokerError::ToolNotFound("grep".to_string()).is_recoverable());
        assert!(BrokerError::ToolTimeout {
            tool: "read_file".to_string(),
            timeout_ms: 5000,
        }
        .is_recoverable());

        assert!(!BrokerError::ToolLoopExceeded { max_iterations: 8 }.is_recoverable());
        assert!(!BrokerError::Transport("connection reset".to_string()).is_recoverable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BrokerError::Transport("503".to_string()).is_retryable());
        assert!(!BrokerError::MalformedResponse("bad json".to_string()).is_retryable());
        assert!(!BrokerError::Config("missing root".to_string()).is_retryable());
    }
}
