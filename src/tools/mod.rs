//! Tool execution system
//!
//! Capability trait and registry, whitelisted filesystem tools, and the
//! concurrent execution engine that turns one model turn's ToolRequest
//! blocks into ordered ToolResult blocks.

pub mod engine;
pub mod filesystem;
pub mod registry;

use std::sync::Arc;

use crate::config::BrokerConfig;

// Re-export commonly used types
pub use engine::{ExecutionEngine, ToolInvocation, DEFAULT_TOOL_TIMEOUT};
pub use filesystem::{ListDirTool, ReadFileTool, WriteFileTool};
pub use registry::{Tool, ToolRegistry, WhitelistHandle};

/// Registry holding the standard filesystem tools, bounds applied from the
/// configuration. The whitelist still has to be bound before execution.
pub fn standard_registry(config: &BrokerConfig) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(
        ReadFileTool::new().with_max_read_bytes(config.max_read_bytes),
    ));
    registry.register(Arc::new(WriteFileTool::new()));
    registry.register(Arc::new(ListDirTool::new()));
    registry
}
