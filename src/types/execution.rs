//! Tool execution result and error-context types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::BrokerError;
use crate::sanitize;

/// Result of one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    /// Tool name that was executed
    pub tool: String,

    /// Whether execution was successful
    pub success: bool,

    /// Tool payload on success, sanitized error text on failure
    pub output: String,

    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ToolExecutionResult {
    /// Create successful result
    pub fn success(tool: impl Into<String>, output: impl Into<String>, duration: Duration) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            output: output.into(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create failed result. The error text is sanitized here, once, so it is
    /// safe for the model and for logs.
    pub fn failure(tool: impl Into<String>, error: impl AsRef<str>, duration: Duration) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            output: sanitize::sanitize(error.as_ref()),
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// Sanitized failure metadata attached to errors surfaced from a turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Operation that failed (e.g. "model_call", "execute_tools")
    pub operation: String,

    /// When the failure was recorded
    pub timestamp: DateTime<Utc>,

    /// Attempts made before giving up
    pub retry_count: u32,

    /// Sanitized detail, never contains raw secret material
    pub detail: String,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>, error: &BrokerError) -> Self {
        Self {
            operation: operation.into(),
            timestamp: Utc::now(),
            retry_count: 0,
            detail: sanitize::sanitize(&error.to_string()),
        }
    }

    pub fn with_retries(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}
