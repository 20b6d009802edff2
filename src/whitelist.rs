//! Whitelist-based filesystem access control
//!
//! Every filesystem-touching tool validates its target path here before
//! performing I/O. Validation always happens on the canonical form of the
//! path (symlinks and `..` resolved) so traversal tricks cannot escape the
//! configured roots.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::errors::{BrokerError, Result};

/// Operation kinds a whitelist root can permit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Read,
    Write,
    List,
}

/// A single allowed root and the operations it permits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootPolicy {
    /// Canonicalized root directory
    pub root: PathBuf,

    /// Operations permitted under this root
    pub operations: HashSet<OperationKind>,
}

impl RootPolicy {
    /// Build a policy, canonicalizing the root. The root must exist.
    pub fn new(root: impl AsRef<Path>, operations: impl IntoIterator<Item = OperationKind>) -> Result<Self> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|e| {
            BrokerError::Config(format!("cannot canonicalize whitelist root {}: {}", root.display(), e))
        })?;

        Ok(Self {
            root: canonical,
            operations: operations.into_iter().collect(),
        })
    }

    /// Policy permitting read, write, and list under one root
    pub fn full_access(root: impl AsRef<Path>) -> Result<Self> {
        Self::new(
            root,
            [OperationKind::Read, OperationKind::Write, OperationKind::List],
        )
    }

    fn permits(&self, operation: OperationKind) -> bool {
        self.operations.contains(&operation)
    }
}

/// Set of allowed roots, read-mostly
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhitelistConfig {
    pub roots: Vec<RootPolicy>,
}

impl WhitelistConfig {
    pub fn new(roots: Vec<RootPolicy>) -> Self {
        Self { roots }
    }
}

/// Path validator shared by all tool executions
///
/// Reads are concurrent; administrative updates take the write lock and
/// replace the whole root set. An execution validated before a replacement
/// keeps the canonical path it was handed; in-flight work is checked against
/// the snapshot current at validation time.
#[derive(Debug)]
pub struct WhitelistValidator {
    config: RwLock<WhitelistConfig>,
}

impl WhitelistValidator {
    pub fn new(config: WhitelistConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    /// Verify the path is inside a root permitting `operation` and return its
    /// canonical form.
    ///
    /// Nonexistent targets (a file about to be written) are verified through
    /// their canonicalized parent directory, then reassembled with the file
    /// name. Comparison is only ever done on canonical paths.
    pub fn validate(&self, path: impl AsRef<Path>, operation: OperationKind) -> Result<PathBuf> {
        let path = path.as_ref();

        let canonical = match canonicalize_target(path) {
            Some(p) => p,
            None => return Err(self.denied(path, operation)),
        };

        let config = self.config.read().unwrap_or_else(|e| e.into_inner());
        let allowed = config
            .roots
            .iter()
            .any(|policy| canonical.starts_with(&policy.root) && policy.permits(operation));
        drop(config);

        if allowed {
            Ok(canonical)
        } else {
            log::warn!(
                "whitelist denied {:?} on {}",
                operation,
                crate::sanitize::Sanitizer::default().sanitize(&path.display().to_string())
            );
            Err(self.denied(path, operation))
        }
    }

    /// Administrative replacement of the allowed-root set. Exclusive; never
    /// observed mid-update by a concurrent `validate`.
    pub fn replace(&self, config: WhitelistConfig) {
        let mut guard = self.config.write().unwrap_or_else(|e| e.into_inner());
        *guard = config;
    }

    /// Current number of configured roots
    pub fn root_count(&self) -> usize {
        self.config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .roots
            .len()
    }

    fn denied(&self, path: &Path, operation: OperationKind) -> BrokerError {
        BrokerError::AccessDenied {
            path: path.to_path_buf(),
            operation,
        }
    }
}

/// Canonicalize a path that may not exist yet. Existing paths resolve fully;
/// a missing final component resolves through its parent. Returns None when
/// nothing on the path can be resolved.
fn canonicalize_target(path: &Path) -> Option<PathBuf> {
    if let Ok(canonical) = path.canonicalize() {
        return Some(canonical);
    }

    let parent = path.parent()?;
    if parent.as_os_str().is_empty() {
        return None;
    }
    let parent_canonical = parent.canonicalize().ok()?;
    let file_name = path.file_name()?;
    Some(parent_canonical.join(file_name))
}
