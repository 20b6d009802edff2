//! Filesystem tool implementations
//!
//! Every operation validates its target through the bound whitelist before
//! touching the filesystem; the validator hands back the canonical path and
//! I/O only ever happens on that form.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::{BrokerError, Result};
use crate::tools::registry::{Tool, WhitelistHandle};
use crate::whitelist::{OperationKind, WhitelistValidator};

/// Default cap on file reads, in bytes
pub const DEFAULT_MAX_READ_BYTES: u64 = 2_097_152;

fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, arguments: &Value) -> Result<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|e| BrokerError::InvalidArguments(format!("{}: {}", tool, e)))
}

/// Read a file inside the whitelist
pub struct ReadFileTool {
    whitelist: WhitelistHandle,
    max_read_bytes: u64,
}

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self {
            whitelist: WhitelistHandle::default(),
            max_read_bytes: DEFAULT_MAX_READ_BYTES,
        }
    }

    pub fn with_max_read_bytes(mut self, max: u64) -> Self {
        self.max_read_bytes = max;
        self
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to read"
                }
            },
            "required": ["path"]
        })
    }

    fn bind_whitelist(&self, validator: Arc<WhitelistValidator>) {
        self.whitelist.bind(validator);
    }

    async fn execute(&self, arguments: &Value) -> Result<String> {
        let args: ReadFileArgs = parse_args(self.name(), arguments)?;
        let canonical = self.whitelist.validate(self.name(), &args.path, OperationKind::Read)?;

        let metadata = tokio::fs::metadata(&canonical).await?;
        if !metadata.is_file() {
            return Err(BrokerError::InvalidArguments(format!(
                "not a regular file: {}",
                args.path
            )));
        }
        if metadata.len() > self.max_read_bytes {
            return Err(BrokerError::InvalidArguments(format!(
                "file is {} bytes, read limit is {}",
                metadata.len(),
                self.max_read_bytes
            )));
        }

        let content = tokio::fs::read_to_string(&canonical).await?;
        Ok(content)
    }
}

/// Write (or append to) a file inside the whitelist
pub struct WriteFileTool {
    whitelist: WhitelistHandle,
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
    #[serde(default)]
    append: bool,
}

impl WriteFileTool {
    pub fn new() -> Self {
        Self {
            whitelist: WhitelistHandle::default(),
        }
    }
}

impl Default for WriteFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating it if necessary"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting",
                    "default": false
                }
            },
            "required": ["path", "content"]
        })
    }

    fn bind_whitelist(&self, validator: Arc<WhitelistValidator>) {
        self.whitelist.bind(validator);
    }

    async fn execute(&self, arguments: &Value) -> Result<String> {
        let args: WriteFileArgs = parse_args(self.name(), arguments)?;
        let canonical = self.whitelist.validate(self.name(), &args.path, OperationKind::Write)?;

        if args.append {
            use tokio::io::AsyncWriteExt;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&canonical)
                .await?;
            file.write_all(args.content.as_bytes()).await?;
        } else {
            tokio::fs::write(&canonical, args.content.as_bytes()).await?;
        }

        Ok(format!("wrote {} bytes to {}", args.content.len(), args.path))
    }
}

/// List a directory inside the whitelist
pub struct ListDirTool {
    whitelist: WhitelistHandle,
}

#[derive(Deserialize)]
struct ListDirArgs {
    path: String,
}

impl ListDirTool {
    pub fn new() -> Self {
        Self {
            whitelist: WhitelistHandle::default(),
        }
    }
}

impl Default for ListDirTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the entries of a directory"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the directory to list"
                }
            },
            "required": ["path"]
        })
    }

    fn bind_whitelist(&self, validator: Arc<WhitelistValidator>) {
        self.whitelist.bind(validator);
    }

    async fn execute(&self, arguments: &Value) -> Result<String> {
        let args: ListDirArgs = parse_args(self.name(), arguments)?;
        let canonical = self.whitelist.validate(self.name(), &args.path, OperationKind::List)?;

        if !canonical.is_dir() {
            return Err(BrokerError::InvalidArguments(format!(
                "not a directory: {}",
                args.path
            )));
        }

        let entries = list_entries(&canonical).await?;
        Ok(entries.join("\n"))
    }
}

async fn list_entries(path: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    let mut read_dir = tokio::fs::read_dir(path).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let file_type = entry.file_type().await?;
        let kind = if file_type.is_dir() {
            "DIR "
        } else if file_type.is_file() {
            "FILE"
        } else {
            "LINK"
        };
        entries.push(format!("{} {}", kind, name));
    }

    entries.sort();
    Ok(entries)
}
