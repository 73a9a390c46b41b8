//! Contract between the lifecycle engine and the external graph resolver.
//!
//! The engine never solves graphs itself: it hands a configuration and a
//! mutable results holder to a [`ConfigurationResolver`] and caches whatever
//! comes back, failures included.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::configuration::ConfigurationNode;
use crate::types::{AttributeMap, ModuleVersionIdentifier, PublishedArtifact};

/// Identifies a component in a resolved graph: an external module or a
/// local project component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentIdentifier {
    Module(ModuleVersionIdentifier),
    Project { path: String },
}

impl fmt::Display for ComponentIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentIdentifier::Module(id) => write!(f, "{}", id),
            ComponentIdentifier::Project { path } => write!(f, "project {}", path),
        }
    }
}

/// A node of the resolved dependency graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedComponent {
    pub id: ComponentIdentifier,
    /// Outgoing edges, by target component.
    pub dependencies: Vec<ComponentIdentifier>,
}

/// The resolved dependency graph: a root plus all reachable components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGraph {
    pub root: ComponentIdentifier,
    pub components: Vec<ResolvedComponent>,
}

impl ResolvedGraph {
    /// All module-coordinate components (local project components skipped).
    pub fn module_versions(&self) -> impl Iterator<Item = &ModuleVersionIdentifier> {
        self.components.iter().filter_map(|c| match &c.id {
            ComponentIdentifier::Module(id) => Some(id),
            ComponentIdentifier::Project { .. } => None,
        })
    }

    pub fn contains_module(&self, group: &str, name: &str, version: &str) -> bool {
        self.module_versions()
            .any(|id| id.group == group && id.name == name && id.version == version)
    }
}

/// An artifact visited while resolving, with the variant attributes it was
/// selected under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub component: ComponentIdentifier,
    pub artifact: PublishedArtifact,
    #[serde(default)]
    pub attributes: AttributeMap,
}

/// Index of all artifacts visited during graph resolution, usable for later
/// attribute-filtered selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub artifacts: Vec<ResolvedArtifact>,
}

impl ArtifactIndex {
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Artifacts whose attributes contain every requested entry.
    pub fn select(&self, requested: &AttributeMap) -> Vec<&ResolvedArtifact> {
        self.artifacts
            .iter()
            .filter(|a| {
                requested
                    .iter()
                    .all(|(key, value)| a.attributes.get(key) == Some(value))
            })
            .collect()
    }
}

/// A local project configuration referenced by the resolved graph, reported
/// so the engine can propagate observation across project boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedProjectConfiguration {
    pub project_path: String,
    pub configuration: String,
}

/// Mutable results holder populated by the external resolver.
///
/// A failure is captured here rather than unwound: the engine caches the
/// whole holder and replays the failure to every subsequent accessor.
#[derive(Clone, Default)]
pub struct ResolverResults {
    pub graph: Option<Arc<ResolvedGraph>>,
    pub visited_artifacts: Option<Arc<ArtifactIndex>>,
    pub resolved_project_configurations: Vec<ResolvedProjectConfiguration>,
    /// A failure that still produced a usable graph (e.g. one unresolved
    /// leaf); surfaced lazily through lenient accessors.
    pub non_fatal_failure: Option<Arc<anyhow::Error>>,
    /// A failure that invalidates the result entirely.
    pub fatal_failure: Option<Arc<anyhow::Error>>,
}

impl ResolverResults {
    pub fn has_error(&self) -> bool {
        self.non_fatal_failure.is_some() || self.fatal_failure.is_some()
    }
}

impl fmt::Debug for ResolverResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverResults")
            .field("graph", &self.graph.as_ref().map(|g| g.components.len()))
            .field("visited_artifacts", &self.visited_artifacts.as_ref().map(|a| a.len()))
            .field("has_error", &self.has_error())
            .finish()
    }
}

/// Marker error for "module not found" failures. The engine matches this in
/// a captured failure chain to decide whether to attach the
/// repository-shadowing hint.
#[derive(Debug, Clone)]
pub struct ModuleNotFound {
    pub selector: String,
}

impl ModuleNotFound {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

impl fmt::Display for ModuleNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Could not find {}.", self.selector)
    }
}

impl std::error::Error for ModuleNotFound {}

/// The external graph/artifact resolver.
///
/// Each method populates `results`; a returned error is treated as a fatal
/// resolution failure and captured into the results holder by the caller.
pub trait ConfigurationResolver: Send + Sync {
    /// Lightweight walk sufficient to compute task dependencies.
    fn resolve_build_dependencies(
        &self,
        node: &ConfigurationNode,
        results: &mut ResolverResults,
    ) -> anyhow::Result<()>;

    /// Full dependency-graph resolution.
    fn resolve_graph(
        &self,
        node: &ConfigurationNode,
        results: &mut ResolverResults,
    ) -> anyhow::Result<()>;

    /// Artifact resolution against an already-resolved graph.
    fn resolve_artifacts(
        &self,
        node: &ConfigurationNode,
        results: &mut ResolverResults,
    ) -> anyhow::Result<()>;
}
