//! toolbroker - whitelisted tool-use orchestration core
//!
//! Lets a conversational agent invoke filesystem tools under an explicit
//! whitelist, with every tool result routed back through the model before
//! anything reaches the user.
//!
//! # Architecture
//!
//! - `whitelist`: canonicalizing path validator over configured roots
//! - `sanitize`: idempotent redaction of secrets and paths at the trust boundary
//! - `tools`: capability trait, registry, filesystem tools, execution engine
//! - `orchestrator`: the bounded model/tool turn loop
//! - `transport`: model transport interface + HTTP messages client
//! - `telemetry`: structured execution-record sink

pub mod config;
pub mod errors;
pub mod orchestrator;
pub mod retry;
pub mod sanitize;
pub mod telemetry;
pub mod tools;
pub mod transport;
pub mod types;
pub mod whitelist;

// Re-export commonly used types
pub use config::{BrokerConfig, ConfigProvider, StaticProvider, TomlConfigProvider};
pub use errors::{BrokerError, Result};
pub use orchestrator::{Orchestrator, TurnPhase};
pub use retry::RetryPolicy;
pub use sanitize::Sanitizer;
pub use telemetry::{ExecutionRecord, TelemetryCollector, TelemetrySink};
pub use tools::{ExecutionEngine, ListDirTool, ReadFileTool, Tool, ToolRegistry, WriteFileTool};
pub use transport::{HttpTransport, ModelResponse, ModelTransport, ToolDescriptor};
pub use types::{ContentBlock, Conversation, ErrorContext, Message, Role, ToolExecutionResult};
pub use whitelist::{OperationKind, RootPolicy, WhitelistConfig, WhitelistValidator};
