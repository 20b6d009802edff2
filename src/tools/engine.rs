//! Tool execution engine
//!
//! Takes the ToolRequest blocks of one model turn, runs them concurrently,
//! and produces one ToolResult block per request in the original request
//! order. Every failure mode (unknown tool, whitelist denial, tool error,
//! timeout, panic) becomes an error ToolResult; nothing a tool does can
//! abort its siblings or the turn.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::Value;

use crate::config::BrokerConfig;
use crate::errors::BrokerError;
use crate::telemetry::{ExecutionRecord, TelemetrySink};
use crate::tools::registry::ToolRegistry;
use crate::types::{ContentBlock, Message, ToolExecutionResult};

/// Default per-tool timeout
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// One pending tool invocation, extracted from a model message
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub request_id: String,
    pub tool: String,
    pub arguments: Value,
}

impl ToolInvocation {
    /// Extract the invocations carried by a model message, in document order
    pub fn from_message(message: &Message) -> Vec<ToolInvocation> {
        message
            .tool_requests()
            .into_iter()
            .map(|(id, name, arguments)| ToolInvocation {
                request_id: id.to_string(),
                tool: name.to_string(),
                arguments: arguments.clone(),
            })
            .collect()
    }
}

/// Concurrent, order-preserving executor for one turn's tool requests
pub struct ExecutionEngine {
    registry: Arc<ToolRegistry>,
    telemetry: Arc<dyn TelemetrySink>,
    default_timeout: Duration,
    tool_timeouts: HashMap<String, Duration>,
}

impl ExecutionEngine {
    pub fn new(registry: Arc<ToolRegistry>, telemetry: Arc<dyn TelemetrySink>) -> Self {
        Self {
            registry,
            telemetry,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            tool_timeouts: HashMap::new(),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, tool: impl Into<String>, timeout: Duration) -> Self {
        self.tool_timeouts.insert(tool.into(), timeout);
        self
    }

    /// Apply the configured default and per-tool timeouts
    pub fn with_timeouts_from(mut self, config: &BrokerConfig) -> Self {
        self.default_timeout = config.default_tool_timeout();
        for (tool, ms) in &config.tool_timeouts_ms {
            self.tool_timeouts
                .insert(tool.clone(), Duration::from_millis(*ms));
        }
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn timeout_for(&self, tool: &str) -> Duration {
        self.tool_timeouts
            .get(tool)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Execute the invocations concurrently. The returned ToolResult blocks
    /// match the input order one-to-one regardless of completion order.
    pub async fn execute(&self, invocations: Vec<ToolInvocation>) -> Vec<ContentBlock> {
        if invocations.is_empty() {
            return Vec::new();
        }
        log::debug!("dispatching {} tool invocation(s)", invocations.len());

        let mut labels = Vec::with_capacity(invocations.len());
        let mut handles = Vec::with_capacity(invocations.len());
        for invocation in invocations {
            let registry = self.registry.clone();
            let timeout = self.timeout_for(&invocation.tool);
            labels.push((invocation.request_id.clone(), invocation.tool.clone()));
            handles.push(tokio::spawn(async move {
                run_invocation(registry, invocation, timeout).await
            }));
        }

        // join_all preserves input order; completion order is irrelevant.
        let joined = join_all(handles).await;

        let mut blocks = Vec::with_capacity(labels.len());
        for ((request_id, tool), outcome) in labels.into_iter().zip(joined) {
            let result = match outcome {
                Ok(result) => result,
                // Panic containment: a crashing tool yields an error result.
                Err(join_error) => {
                    log::error!("tool '{}' task aborted: {}", tool, join_error);
                    ToolExecutionResult::failure(
                        &tool,
                        format!("tool '{}' aborted unexpectedly", tool),
                        Duration::ZERO,
                    )
                }
            };

            self.telemetry.record(ExecutionRecord {
                tool: result.tool.clone(),
                success: result.success,
                duration: Duration::from_millis(result.duration_ms),
            });

            blocks.push(ContentBlock::tool_result(
                request_id,
                result.output,
                !result.success,
            ));
        }
        blocks
    }
}

async fn run_invocation(
    registry: Arc<ToolRegistry>,
    invocation: ToolInvocation,
    timeout: Duration,
) -> ToolExecutionResult {
    let start = Instant::now();

    let outcome = match registry.get(&invocation.tool) {
        None => Err(BrokerError::ToolNotFound(invocation.tool.clone())),
        Some(tool) => match tokio::time::timeout(timeout, tool.execute(&invocation.arguments)).await
        {
            Ok(result) => result,
            Err(_) => Err(BrokerError::ToolTimeout {
                tool: invocation.tool.clone(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        },
    };

    let elapsed = start.elapsed();
    match outcome {
        Ok(output) => {
            log::debug!("tool '{}' succeeded in {:?}", invocation.tool, elapsed);
            ToolExecutionResult::success(&invocation.tool, output, elapsed)
        }
        Err(error) => {
            if error.is_recoverable() {
                log::debug!("tool '{}' failed: {}", invocation.tool, error);
            } else {
                log::warn!("tool '{}' failed: {}", invocation.tool, error);
            }
            // failure() sanitizes the error text once, before it
            // reaches the model or any log sink downstream.
            ToolExecutionResult::failure(&invocation.tool, error.to_string(), elapsed)
        }
    }
}
