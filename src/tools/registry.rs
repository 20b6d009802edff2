//! Tool capability trait and name-keyed registry
//!
//! Tools are trait objects owning their own argument schemas. Security policy
//! is not baked into a tool at construction: the shared whitelist validator
//! is injected afterwards through `bind_whitelist`, and filesystem tools
//! refuse to run until it has been.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::{BrokerError, Result};
use crate::transport::ToolDescriptor;
use crate::whitelist::{OperationKind, WhitelistValidator};

/// Capability interface implemented by every tool
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (e.g. "read_file")
    fn name(&self) -> &str;

    /// Human-readable description advertised to the model
    fn description(&self) -> &str;

    /// JSON Schema for the tool arguments
    fn schema(&self) -> Value;

    /// Inject the shared whitelist validator after construction
    fn bind_whitelist(&self, validator: Arc<WhitelistValidator>);

    /// Execute with the given arguments. May suspend for I/O; the execution
    /// engine enforces the per-tool timeout around this call.
    async fn execute(&self, arguments: &Value) -> Result<String>;
}

/// Late-bound handle to the whitelist validator, shared by tool impls
#[derive(Debug, Default)]
pub struct WhitelistHandle {
    inner: RwLock<Option<Arc<WhitelistValidator>>>,
}

impl WhitelistHandle {
    pub fn bind(&self, validator: Arc<WhitelistValidator>) {
        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(validator);
    }

    /// Validate through the bound validator. An unbound handle is a wiring
    /// defect and fails closed: no validator, no filesystem access.
    pub fn validate(&self, tool: &str, path: impl AsRef<std::path::Path>, operation: OperationKind) -> Result<std::path::PathBuf> {
        let guard = self.inner.read().unwrap_or_else(|e| e.into_inner());
        match guard.as_ref() {
            Some(validator) => validator.validate(path, operation),
            None => Err(BrokerError::Internal(format!(
                "tool '{}' has no whitelist validator bound",
                tool
            ))),
        }
    }
}

/// Name-keyed registry of tool trait objects
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Inject the validator into every registered tool
    pub fn bind_whitelist(&self, validator: Arc<WhitelistValidator>) {
        for tool in self.tools.values() {
            tool.bind_whitelist(validator.clone());
        }
    }

    /// Descriptors advertised to the model transport
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                input_schema: tool.schema(),
            })
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
