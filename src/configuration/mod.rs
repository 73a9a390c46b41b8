//! Configuration nodes and their owning container.
//!
//! A [`ConfigurationContainer`] owns the shared collaborators (exclusive
//! domain, external resolver, lock-state provider, reporter) and the
//! registry of named [`ConfigurationNode`]s. Nodes created by `copy` are
//! detached: they share the collaborators but live outside the registry.

mod consistency;
mod hierarchy;
mod mutation;
mod node;
mod resolution;
mod usage;

pub use node::{ConfigurationNode, DependencyAction, ResolutionListener};
pub use resolution::{LenientResolution, ResolutionState};

use std::sync::{Arc, Mutex};

use crate::domain::BuildDomain;
use crate::error::{ConfigError, ConfigResult};
use crate::locking::DependencyLockingProvider;
use crate::report::Reporter;
use crate::resolver::ConfigurationResolver;
use crate::types::ConfigurationRole;

/// Repository declarations, kept only to diagnose the project-repositories-
/// shadow-settings misconfiguration when resolution fails.
#[derive(Debug, Default)]
pub(crate) struct RepositoryDeclarations {
    pub project: Vec<String>,
    pub settings: Vec<String>,
}

/// Collaborators shared by a container and all of its nodes, detached
/// copies included.
pub(crate) struct CoreServices {
    pub project_path: String,
    pub domain: BuildDomain,
    pub resolver: Arc<dyn ConfigurationResolver>,
    pub locking: Arc<dyn DependencyLockingProvider>,
    pub reporter: Arc<dyn Reporter>,
    /// Narrow lock guarding extends-from edge edits; resolution uses the
    /// per-node state cell instead.
    pub hierarchy_lock: Mutex<()>,
    pub repositories: Mutex<RepositoryDeclarations>,
}

/// Registry of the non-detached nodes of one container, used for the
/// attribute-uniqueness check and cross-configuration observation.
pub(crate) struct NodeRegistry {
    nodes: Mutex<Vec<Arc<ConfigurationNode>>>,
}

impl NodeRegistry {
    fn new() -> Self {
        Self {
            nodes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn find(&self, name: &str) -> Option<Arc<ConfigurationNode>> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.name() == name)
            .cloned()
    }

    pub(crate) fn all(&self) -> Vec<Arc<ConfigurationNode>> {
        self.nodes.lock().unwrap().clone()
    }

    fn insert(&self, node: Arc<ConfigurationNode>) {
        self.nodes.lock().unwrap().push(node);
    }
}

/// Factory and registry for the configurations of one project.
pub struct ConfigurationContainer {
    services: Arc<CoreServices>,
    registry: Arc<NodeRegistry>,
}

impl ConfigurationContainer {
    /// Create a container owned by the current thread's domain.
    pub fn new(
        project_path: &str,
        resolver: Arc<dyn ConfigurationResolver>,
        locking: Arc<dyn DependencyLockingProvider>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            services: Arc::new(CoreServices {
                project_path: project_path.to_string(),
                domain: BuildDomain::new(),
                resolver,
                locking,
                reporter,
                hierarchy_lock: Mutex::new(()),
                repositories: Mutex::new(RepositoryDeclarations::default()),
            }),
            registry: Arc::new(NodeRegistry::new()),
        }
    }

    /// Record the repository declarations in effect, used only for the
    /// resolution-failure hint.
    pub fn declare_repositories(&self, project: Vec<String>, settings: Vec<String>) {
        let mut repos = self.services.repositories.lock().unwrap();
        repos.project = project;
        repos.settings = settings;
    }

    /// Create and register a configuration with the given role. The role is
    /// fixed at creation; `lock_usage` additionally prevents any later
    /// flipping of the nominally mutable flags.
    pub fn create(
        &self,
        name: &str,
        role: ConfigurationRole,
        lock_usage: bool,
    ) -> ConfigResult<Arc<ConfigurationNode>> {
        if self.registry.find(name).is_some() {
            return Err(ConfigError::already_exists(name));
        }
        let node = ConfigurationNode::create(
            self.services.clone(),
            Arc::downgrade(&self.registry),
            name,
            role,
            lock_usage,
            false,
        )?;
        self.registry.insert(node.clone());
        tracing::debug!(
            target: "config_graph::container",
            configuration = %node.identity_path(),
            role = node.role_at_creation().map(|r| r.name).unwrap_or("unknown"),
            "created configuration"
        );
        Ok(node)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ConfigurationNode>> {
        self.registry.find(name)
    }

    pub fn all(&self) -> Vec<Arc<ConfigurationNode>> {
        self.registry.all()
    }

    /// Register the calling thread as a managed worker of this container's
    /// domain, allowing it to drive resolution (with a deprecation).
    pub fn register_current_worker(&self) {
        self.services.domain.register_current_worker();
    }
}
