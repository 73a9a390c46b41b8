//! Core value types for the configuration lifecycle engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ConfigError, ConfigResult};

/// Identifies a module without a version (e.g. `org.slf4j:slf4j-api`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleIdentifier {
    pub group: String,
    pub name: String,
}

impl ModuleIdentifier {
    pub fn new(group: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.name)
    }
}

/// Identifies a specific version of a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleVersionIdentifier {
    pub group: String,
    pub name: String,
    pub version: String,
}

impl ModuleVersionIdentifier {
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            version: version.into(),
        }
    }

    pub fn module(&self) -> ModuleIdentifier {
        ModuleIdentifier::new(self.group.clone(), self.name.clone())
    }
}

impl fmt::Display for ModuleVersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.name, self.version)
    }
}

/// A version constraint on a dependency or synthetic constraint.
///
/// A strict constraint pins the version exactly; a preferred constraint
/// allows the conflict resolver to upgrade it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConstraint {
    pub version: String,
    pub strict: bool,
}

impl VersionConstraint {
    /// A strict constraint: the resolved version must match exactly.
    pub fn strictly(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            strict: true,
        }
    }

    /// A preferred constraint: used unless conflict resolution overrides it.
    pub fn prefer(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            strict: false,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.strict {
            write!(f, "strictly {}", self.version)
        } else {
            write!(f, "{}", self.version)
        }
    }
}

/// Attribute values are open-ended JSON scalars/structures keyed by name.
pub type AttributeMap = BTreeMap<String, serde_json::Value>;

/// A dependency declared directly on a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredDependency {
    pub module: ModuleIdentifier,
    pub version: VersionConstraint,
    pub transitive: bool,
    #[serde(default)]
    pub attributes: AttributeMap,
    pub reason: Option<String>,
}

impl DeclaredDependency {
    pub fn new(group: &str, name: &str, version: &str) -> Self {
        Self {
            module: ModuleIdentifier::new(group, name),
            version: VersionConstraint::prefer(version),
            transitive: true,
            attributes: AttributeMap::new(),
            reason: None,
        }
    }
}

/// A version constraint declared directly on a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredConstraint {
    pub module: ModuleIdentifier,
    pub version: VersionConstraint,
    pub reason: Option<String>,
}

impl DeclaredConstraint {
    pub fn new(group: &str, name: &str, version: &str) -> Self {
        Self {
            module: ModuleIdentifier::new(group, name),
            version: VersionConstraint::prefer(version),
            reason: None,
        }
    }
}

/// A constraint generated internally rather than declared by a user:
/// from persisted lock state or from a consistent-resolution source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticDependency {
    pub module: ModuleIdentifier,
    pub version: VersionConstraint,
    pub reason: String,
    /// True when derived from lock state, false when derived from a
    /// consistent-resolution source.
    pub from_lock_state: bool,
}

/// An artifact published by a configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub name: String,
    pub extension: String,
    pub classifier: Option<String>,
    /// Path of the backing file, relative to the project.
    pub file: String,
}

impl PublishedArtifact {
    pub fn new(name: &str, extension: &str, file: &str) -> Self {
        Self {
            name: name.to_string(),
            extension: extension.to_string(),
            classifier: None,
            file: file.to_string(),
        }
    }
}

/// A parsed exclude rule: either part may be absent, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExcludeRule {
    pub group: Option<String>,
    pub module: Option<String>,
}

impl ExcludeRule {
    /// Parse the raw map notation `{group: .., module: ..}`.
    /// Only the keys `group` and `module` are recognized.
    pub fn parse(raw: &BTreeMap<String, String>) -> ConfigResult<Self> {
        if raw.is_empty() {
            return Err(ConfigError::empty_exclude_rule());
        }
        for key in raw.keys() {
            if key != "group" && key != "module" {
                return Err(ConfigError::invalid_exclude_rule(key));
            }
        }
        Ok(Self {
            group: raw.get("group").cloned(),
            module: raw.get("module").cloned(),
        })
    }
}

/// The monotonic stage of resolution a configuration has reached.
///
/// Totally ordered; only advances, except for an explicit external reset
/// back to `Unresolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveState {
    Unresolved = 0,
    BuildDependenciesResolved = 1,
    GraphResolved = 2,
    ArtifactsResolved = 3,
}

impl ResolveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolveState::Unresolved => "UNRESOLVED",
            ResolveState::BuildDependenciesResolved => "BUILD_DEPENDENCIES_RESOLVED",
            ResolveState::GraphResolved => "GRAPH_RESOLVED",
            ResolveState::ArtifactsResolved => "ARTIFACTS_RESOLVED",
        }
    }

    pub(crate) fn from_u8(val: u8) -> ResolveState {
        match val {
            1 => ResolveState::BuildDependenciesResolved,
            2 => ResolveState::GraphResolved,
            3 => ResolveState::ArtifactsResolved,
            _ => ResolveState::Unresolved,
        }
    }
}

impl fmt::Display for ResolveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of mutation attempts against a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Dependencies, constraints, exclude rules and other inputs to the
    /// resolved graph.
    Dependencies,
    /// Attributes of an already-declared dependency.
    DependencyAttributes,
    /// Published artifacts.
    Artifacts,
    /// The extends-from edge set.
    Hierarchy,
    /// The resolution strategy; local to a node, always mutable.
    Strategy,
    /// The capability role flags.
    Usage,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MutationKind::Dependencies => "dependencies",
            MutationKind::DependencyAttributes => "dependency attributes",
            MutationKind::Artifacts => "artifacts",
            MutationKind::Hierarchy => "hierarchy",
            MutationKind::Strategy => "resolution strategy",
            MutationKind::Usage => "usage",
        };
        f.write_str(text)
    }
}

/// The fixed-at-creation capability profile of a configuration.
///
/// Three capability flags plus three independent deprecation flags. A copy
/// of a configuration gets an "adjusted" role computed by
/// [`ConfigurationRole::adjusted_for_copy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationRole {
    pub name: &'static str,
    pub consumable: bool,
    pub resolvable: bool,
    pub declarable: bool,
    pub consumption_deprecated: bool,
    pub resolution_deprecated: bool,
    pub declaration_deprecated: bool,
}

/// Open-ended role kept for configurations that predate fixed roles.
pub const LEGACY: ConfigurationRole = ConfigurationRole {
    name: "Legacy",
    consumable: true,
    resolvable: true,
    declarable: true,
    consumption_deprecated: false,
    resolution_deprecated: false,
    declaration_deprecated: false,
};

/// A configuration other projects select artifacts from.
pub const CONSUMABLE: ConfigurationRole = ConfigurationRole {
    name: "Consumable",
    consumable: true,
    resolvable: false,
    declarable: false,
    consumption_deprecated: false,
    resolution_deprecated: false,
    declaration_deprecated: false,
};

/// A configuration that resolves a dependency graph.
pub const RESOLVABLE: ConfigurationRole = ConfigurationRole {
    name: "Resolvable",
    consumable: false,
    resolvable: true,
    declarable: false,
    consumption_deprecated: false,
    resolution_deprecated: false,
    declaration_deprecated: false,
};

/// A configuration dependencies are declared against, to be inherited by
/// resolvable/consumable configurations.
pub const DEPENDENCY_SCOPE: ConfigurationRole = ConfigurationRole {
    name: "Dependency Scope",
    consumable: false,
    resolvable: false,
    declarable: true,
    consumption_deprecated: false,
    resolution_deprecated: false,
    declaration_deprecated: false,
};

/// A resolvable configuration that also accepts declarations.
pub const RESOLVABLE_DEPENDENCY_SCOPE: ConfigurationRole = ConfigurationRole {
    name: "Resolvable Dependency Scope",
    consumable: false,
    resolvable: true,
    declarable: true,
    consumption_deprecated: false,
    resolution_deprecated: false,
    declaration_deprecated: false,
};

impl ConfigurationRole {
    /// The role given to copies: everything is permitted, but capabilities
    /// that were disabled (or already deprecated) on the source become
    /// deprecated on the copy.
    pub fn adjusted_for_copy(
        deprecate_consumption: bool,
        deprecate_resolution: bool,
        deprecate_declaration: bool,
    ) -> Self {
        Self {
            name: "adjusted current usage",
            consumable: true,
            resolvable: true,
            declarable: true,
            consumption_deprecated: deprecate_consumption,
            resolution_deprecated: deprecate_resolution,
            declaration_deprecated: deprecate_declaration,
        }
    }

    /// Human-readable description of the permitted usage, for lock errors.
    pub fn describe_usage(&self) -> String {
        let mut lines = Vec::new();
        let mut describe = |allowed: bool, deprecated: bool, what: &str| {
            if allowed {
                if deprecated {
                    lines.push(format!("\t{} (deprecated)", what));
                } else {
                    lines.push(format!("\t{}", what));
                }
            }
        };
        describe(self.consumable, self.consumption_deprecated, "Consumable - this configuration can be selected by another project as a dependency");
        describe(self.resolvable, self.resolution_deprecated, "Resolvable - this configuration can be resolved by this project to a set of files");
        describe(self.declarable, self.declaration_deprecated, "Declarable - this configuration can have dependencies added to it");
        if lines.is_empty() {
            lines.push("\tThis configuration does not allow any usage".to_string());
        }
        lines.join("\n")
    }
}

/// Per-node resolution strategy knobs consulted by the state machine.
/// Strategy mutations are always permitted and never cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionStrategy {
    /// When set, computing task dependencies requires a full graph resolve
    /// instead of the lighter build-dependencies walk.
    pub resolve_graph_to_determine_task_dependencies: bool,
    /// When set, lock state is loaded and turned into synthetic constraints.
    pub dependency_locking_enabled: bool,
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        Self {
            resolve_graph_to_determine_task_dependencies: false,
            dependency_locking_enabled: false,
        }
    }
}
