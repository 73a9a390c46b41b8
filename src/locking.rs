//! Dependency-locking provider contract and a JSON-file implementation.
//!
//! The engine only consumes lock state: when locking is enabled on a
//! configuration's resolution strategy, each locked dependency becomes a
//! synthetic constraint (strict when the state demands validation).

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A single locked dependency coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedDependency {
    pub group: String,
    pub module: String,
    pub version: String,
}

/// Persisted lock state for one configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockState {
    #[serde(default)]
    pub locked_dependencies: Vec<LockedDependency>,
    /// When true the lock must hold exactly (strict constraints); when
    /// false the locked versions are preferences (update/lenient mode).
    #[serde(default)]
    pub must_validate: bool,
}

/// Source of persisted lock state, keyed by configuration name.
pub trait DependencyLockingProvider: Send + Sync {
    fn load_lock_state(&self, configuration: &str) -> anyhow::Result<LockState>;
}

/// Provider for builds without lock files: every configuration is unlocked.
pub struct NoLocking;

impl DependencyLockingProvider for NoLocking {
    fn load_lock_state(&self, _configuration: &str) -> anyhow::Result<LockState> {
        Ok(LockState::default())
    }
}

/// Lock state stored as a JSON map of configuration name to [`LockState`].
/// A missing file means nothing is locked.
pub struct JsonLockFile {
    path: PathBuf,
}

impl JsonLockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DependencyLockingProvider for JsonLockFile {
    fn load_lock_state(&self, configuration: &str) -> anyhow::Result<LockState> {
        if !self.path.exists() {
            return Ok(LockState::default());
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading lock file {}", self.path.display()))?;
        let all: BTreeMap<String, LockState> = serde_json::from_str(&contents)
            .with_context(|| format!("parsing lock file {}", self.path.display()))?;
        Ok(all.get(configuration).cloned().unwrap_or_default())
    }
}
