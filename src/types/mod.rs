//! Type definitions module
//!
//! Conversation structures exchanged with the model and the transient
//! execution/error types produced during one orchestration step.

pub mod conversation;
pub mod execution;

// Re-export commonly used types
pub use conversation::{ContentBlock, Conversation, Message, Role};
pub use execution::{ErrorContext, ToolExecutionResult};
