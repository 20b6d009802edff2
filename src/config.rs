//! Configuration for the orchestration core
//!
//! Everything the core needs (whitelist roots, per-tool timeouts, retry
//! limits, the tool-loop bound) arrives through `ConfigProvider` as explicit
//! values; nothing is hardcoded inside the engine or orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{BrokerError, Result};
use crate::retry::RetryPolicy;
use crate::whitelist::{OperationKind, RootPolicy, WhitelistConfig};

fn default_max_tool_iterations() -> usize {
    8
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

fn default_max_read_bytes() -> u64 {
    2_097_152
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    8_000
}

/// Retry/backoff limits for model calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            base_delay_ms: default_retry_base_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, self.base_delay_ms, self.max_delay_ms)
    }
}

/// One whitelist root as configured (canonicalized when applied)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistRootEntry {
    pub path: PathBuf,
    pub operations: Vec<OperationKind>,
}

/// Complete configuration consumed by the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Bound on model round-trips that execute tools within one turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: usize,

    /// Timeout applied to tools without a specific entry
    #[serde(default = "default_tool_timeout_ms")]
    pub default_tool_timeout_ms: u64,

    /// Per-tool timeout overrides
    #[serde(default)]
    pub tool_timeouts_ms: HashMap<String, u64>,

    /// Model-call retry limits
    #[serde(default)]
    pub retry: RetryConfig,

    /// Allowed filesystem roots and their permitted operations
    #[serde(default)]
    pub whitelist_roots: Vec<WhitelistRootEntry>,

    /// Cap on file reads performed by tools
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            default_tool_timeout_ms: default_tool_timeout_ms(),
            tool_timeouts_ms: HashMap::new(),
            retry: RetryConfig::default(),
            whitelist_roots: Vec::new(),
            max_read_bytes: default_max_read_bytes(),
        }
    }
}

impl BrokerConfig {
    pub fn default_tool_timeout(&self) -> Duration {
        Duration::from_millis(self.default_tool_timeout_ms)
    }

    pub fn tool_timeout(&self, tool: &str) -> Duration {
        self.tool_timeouts_ms
            .get(tool)
            .map(|ms| Duration::from_millis(*ms))
            .unwrap_or_else(|| self.default_tool_timeout())
    }

    /// Canonicalize the configured roots into a validator config. Roots that
    /// do not exist fail loudly here rather than silently allowing nothing.
    pub fn whitelist_config(&self) -> Result<WhitelistConfig> {
        let mut roots = Vec::with_capacity(self.whitelist_roots.len());
        for entry in &self.whitelist_roots {
            roots.push(RootPolicy::new(&entry.path, entry.operations.iter().copied())?);
        }
        Ok(WhitelistConfig::new(roots))
    }
}

/// Supplies configuration to the core; implementations own where it lives
pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<BrokerConfig>;
}

/// Fixed in-memory configuration, for embedding and tests
pub struct StaticProvider {
    config: BrokerConfig,
}

impl StaticProvider {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

impl ConfigProvider for StaticProvider {
    fn load(&self) -> Result<BrokerConfig> {
        Ok(self.config.clone())
    }
}

/// TOML file provider
pub struct TomlConfigProvider {
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Write the configuration back, creating parent directories as needed.
    pub fn save(&self, config: &BrokerConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let rendered = toml::to_string_pretty(config)
            .map_err(|e| BrokerError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(&self.path, rendered)?;
        Ok(())
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn load(&self) -> Result<BrokerConfig> {
        if !self.path.exists() {
            return Ok(BrokerConfig::default());
        }

        let contents = fs::read_to_string(&self.path)?;
        toml::from_str(&contents).map_err(|e| {
            BrokerError::Config(format!(
                "failed to parse {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.max_tool_iterations, 8);
        assert_eq!(config.default_tool_timeout(), Duration::from_secs(30));
        assert!(config.whitelist_roots.is_empty());
    }

    #[test]
    fn test_per_tool_timeout_override() {
        let mut config = BrokerConfig::default();
        config.tool_timeouts_ms.insert("read_file".to_string(), 5_000);

        assert_eq!(config.tool_timeout("read_file"), Duration::from_millis(5_000));
        assert_eq!(config.tool_timeout("write_file"), Duration::from_secs(30));
    }

    #[test]
    fn test_whitelist_config_canonicalizes() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = BrokerConfig::default();
        config.whitelist_roots.push(WhitelistRootEntry {
            path: temp.path().to_path_buf(),
            operations: vec![OperationKind::Read, OperationKind::List],
        });

        let whitelist = config.whitelist_config().unwrap();
        assert_eq!(whitelist.roots.len(), 1);
        assert_eq!(whitelist.roots[0].root, temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_missing_root_fails_loudly() {
        let mut config = BrokerConfig::default();
        config.whitelist_roots.push(WhitelistRootEntry {
            path: PathBuf::from("/does/not/exist/anywhere"),
            operations: vec![OperationKind::Read],
        });

        assert!(matches!(
            config.whitelist_config(),
            Err(BrokerError::Config(_))
        ));
    }

    #[test]
    fn test_toml_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(temp.path().join("broker.toml"));

        let mut config = BrokerConfig::default();
        config.max_tool_iterations = 4;
        config.retry.max_attempts = 5;
        provider.save(&config).unwrap();

        let loaded = provider.load().unwrap();
        assert_eq!(loaded.max_tool_iterations, 4);
        assert_eq!(loaded.retry.max_attempts, 5);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let provider = TomlConfigProvider::new(temp.path().join("absent.toml"));

        let loaded = provider.load().unwrap();
        assert_eq!(loaded.max_tool_iterations, 8);
    }

    #[test]
    fn test_static_provider() {
        let mut config = BrokerConfig::default();
        config.max_tool_iterations = 2;
        let provider = StaticProvider::new(config);

        assert_eq!(provider.load().unwrap().max_tool_iterations, 2);
    }

    #[test]
    fn test_partial_toml_uses_field_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("partial.toml");
        fs::write(&path, "max_tool_iterations = 3\n").unwrap();

        let loaded = TomlConfigProvider::new(&path).load().unwrap();
        assert_eq!(loaded.max_tool_iterations, 3);
        assert_eq!(loaded.retry.max_attempts, 3);
        assert_eq!(loaded.max_read_bytes, 2_097_152);
    }
}
