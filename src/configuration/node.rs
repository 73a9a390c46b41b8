//! The configuration node: declared content, usage flags and cached
//! resolution state for one named configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use crate::cell::{ExclusiveCell, MemoCell};
use crate::error::{ConfigError, ConfigResult, ErrorCode};
use crate::types::{
    AttributeMap, ConfigurationRole, DeclaredConstraint, DeclaredDependency, ExcludeRule,
    ModuleIdentifier, MutationKind, PublishedArtifact, ResolutionStrategy, SyntheticDependency,
};

use super::resolution::ResolutionState;
use super::{CoreServices, NodeRegistry};

/// Callback invoked immediately before or after graph resolution.
pub type ResolutionListener = Arc<dyn Fn(&ConfigurationNode) + Send + Sync>;

/// Callback that may rewrite the declared dependency list just before the
/// configuration is locked for resolution.
pub type DependencyAction = Arc<dyn Fn(&mut Vec<DeclaredDependency>) + Send + Sync>;

/// The three capability flags plus their deprecation shadows. Kept behind
/// one mutex so flag reads are internally consistent.
#[derive(Clone)]
pub(crate) struct UsageState {
    pub consumable: bool,
    pub resolvable: bool,
    pub declarable: bool,
    pub consumption_deprecated: bool,
    pub resolution_deprecated: bool,
    pub declaration_deprecated: bool,
    pub usage_can_be_mutated: bool,
    pub consumption_alternatives: Vec<String>,
    pub resolution_alternatives: Vec<String>,
    pub declaration_alternatives: Vec<String>,
}

/// Content declared directly on this node, as opposed to inherited.
pub(crate) struct OwnedDeclarations {
    pub dependencies: Vec<DeclaredDependency>,
    pub constraints: Vec<DeclaredConstraint>,
    pub artifacts: Vec<PublishedArtifact>,
    /// Raw exclude notations; parsed lazily so malformed rules surface on
    /// first read, not at declaration time.
    pub exclude_rules_raw: Vec<BTreeMap<String, String>>,
    pub attributes: AttributeMap,
    pub capabilities: Vec<String>,
    pub transitive: bool,
    pub description: Option<String>,
}

impl Default for OwnedDeclarations {
    fn default() -> Self {
        Self {
            dependencies: Vec::new(),
            constraints: Vec::new(),
            artifacts: Vec::new(),
            exclude_rules_raw: Vec::new(),
            attributes: AttributeMap::new(),
            capabilities: Vec::new(),
            transitive: true,
            description: None,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct ListenerLists {
    pub before: Vec<ResolutionListener>,
    pub after: Vec<ResolutionListener>,
}

#[derive(Clone, Default)]
pub(crate) struct DependencyActions {
    /// Run only while the dependency list is still empty.
    pub defaults: Vec<DependencyAction>,
    /// Run unconditionally, after the defaults.
    pub with: Vec<DependencyAction>,
}

pub(crate) struct ConsistencySource {
    pub source: Weak<ConfigurationNode>,
    pub reason: String,
}

/// A named, mutable set of dependency declarations with a one-shot
/// resolution lifecycle. Always handled through `Arc`.
pub struct ConfigurationNode {
    pub(crate) services: Arc<CoreServices>,
    /// Empty for detached copies; they are invisible to sibling checks.
    pub(crate) registry: Weak<NodeRegistry>,
    name: String,
    identity_path: String,
    detached: bool,
    /// Unset only while the node is still being initialized; usage-change
    /// warnings are suppressed during that window.
    role_at_creation: OnceLock<ConfigurationRole>,
    pub(crate) usage: Mutex<UsageState>,
    pub(crate) locked: AtomicBool,
    pub(crate) own: Mutex<OwnedDeclarations>,
    pub(crate) parsed_excludes: Mutex<Option<Vec<ExcludeRule>>>,
    pub(crate) parents: Mutex<Vec<Arc<ConfigurationNode>>>,
    /// Configurations that extend this one and must veto parent mutations.
    pub(crate) observers: Mutex<Vec<Weak<ConfigurationNode>>>,
    pub(crate) state: ExclusiveCell<ResolutionState>,
    /// Deepest resolve state any consumer requested this node at, as a
    /// watermark independent of the node's own resolve state.
    pub(crate) observed: AtomicU8,
    /// Set by dependency-affecting mutations, cleared when a graph resolve
    /// consumes them. Still set after resolve means double resolution.
    pub(crate) dependencies_modified: AtomicBool,
    pub(crate) inside_before_resolve: AtomicBool,
    pub(crate) listeners: Mutex<ListenerLists>,
    pub(crate) actions: Mutex<DependencyActions>,
    pub(crate) consistency: Mutex<Option<ConsistencySource>>,
    pub(crate) synthetic: MemoCell<Vec<SyntheticDependency>>,
    pub(crate) strategy: Mutex<ResolutionStrategy>,
    copy_count: AtomicUsize,
}

impl ConfigurationNode {
    pub(crate) fn create(
        services: Arc<CoreServices>,
        registry: Weak<NodeRegistry>,
        name: &str,
        role: ConfigurationRole,
        lock_usage: bool,
        detached: bool,
    ) -> ConfigResult<Arc<Self>> {
        let identity_path = if services.project_path == ":" {
            format!(":{}", name)
        } else {
            format!("{}:{}", services.project_path, name)
        };
        let node = Arc::new(Self {
            services,
            registry,
            name: name.to_string(),
            identity_path,
            detached,
            role_at_creation: OnceLock::new(),
            usage: Mutex::new(UsageState {
                consumable: role.consumable,
                resolvable: role.resolvable,
                declarable: role.declarable,
                consumption_deprecated: false,
                resolution_deprecated: false,
                declaration_deprecated: false,
                usage_can_be_mutated: true,
                consumption_alternatives: Vec::new(),
                resolution_alternatives: Vec::new(),
                declaration_alternatives: Vec::new(),
            }),
            locked: AtomicBool::new(false),
            own: Mutex::new(OwnedDeclarations::default()),
            parsed_excludes: Mutex::new(None),
            parents: Mutex::new(Vec::new()),
            observers: Mutex::new(Vec::new()),
            state: ExclusiveCell::new(ResolutionState::unresolved()),
            observed: AtomicU8::new(0),
            dependencies_modified: AtomicBool::new(false),
            inside_before_resolve: AtomicBool::new(false),
            listeners: Mutex::new(ListenerLists::default()),
            actions: Mutex::new(DependencyActions::default()),
            consistency: Mutex::new(None),
            synthetic: MemoCell::new(),
            strategy: Mutex::new(ResolutionStrategy::default()),
            copy_count: AtomicUsize::new(0),
        });
        if role.consumption_deprecated {
            node.deprecate_for_consumption(&[])?;
        }
        if role.resolution_deprecated {
            node.deprecate_for_resolution(&[])?;
        }
        if role.declaration_deprecated {
            node.deprecate_for_declaration_against(&[])?;
        }
        if lock_usage {
            node.prevent_usage_mutation();
        }
        let _ = node.role_at_creation.set(role);
        Ok(node)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Build-wide unique path, e.g. `:app:runtimeClasspath`.
    pub fn identity_path(&self) -> &str {
        &self.identity_path
    }

    pub fn display_name(&self) -> String {
        format!("configuration '{}'", self.identity_path)
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn role_at_creation(&self) -> Option<&ConfigurationRole> {
        self.role_at_creation.get()
    }

    pub fn description(&self) -> Option<String> {
        self.own.lock().unwrap().description.clone()
    }

    /// The description is presentation-only and never guarded.
    pub fn set_description(&self, description: Option<String>) {
        self.own.lock().unwrap().description = description;
    }

    pub fn is_transitive(&self) -> bool {
        self.own.lock().unwrap().transitive
    }

    pub fn set_transitive(&self, transitive: bool) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Dependencies)?;
        self.own.lock().unwrap().transitive = transitive;
        Ok(())
    }

    // Declared content

    pub fn dependencies(&self) -> Vec<DeclaredDependency> {
        self.own.lock().unwrap().dependencies.clone()
    }

    pub fn constraints(&self) -> Vec<DeclaredConstraint> {
        self.own.lock().unwrap().constraints.clone()
    }

    pub fn artifacts(&self) -> Vec<PublishedArtifact> {
        self.own.lock().unwrap().artifacts.clone()
    }

    pub fn attributes(&self) -> AttributeMap {
        self.own.lock().unwrap().attributes.clone()
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.own.lock().unwrap().capabilities.clone()
    }

    pub fn add_dependency(&self, dependency: DeclaredDependency) -> ConfigResult<()> {
        self.assert_is_declarable()?;
        self.validate_mutation(MutationKind::Dependencies)?;
        self.own.lock().unwrap().dependencies.push(dependency);
        Ok(())
    }

    pub fn add_constraint(&self, constraint: DeclaredConstraint) -> ConfigResult<()> {
        self.assert_is_declarable()?;
        self.validate_mutation(MutationKind::Dependencies)?;
        self.own.lock().unwrap().constraints.push(constraint);
        Ok(())
    }

    pub fn add_artifact(&self, artifact: PublishedArtifact) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Artifacts)?;
        self.own.lock().unwrap().artifacts.push(artifact);
        Ok(())
    }

    /// Record an exclude notation. Validation of the notation itself is
    /// deferred to [`ConfigurationNode::exclude_rules`].
    pub fn add_exclude_rule(&self, raw: BTreeMap<String, String>) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Dependencies)?;
        *self.parsed_excludes.lock().unwrap() = None;
        self.own.lock().unwrap().exclude_rules_raw.push(raw);
        Ok(())
    }

    /// The exclude rules declared directly on this node, parsed and cached.
    pub fn exclude_rules(&self) -> ConfigResult<Vec<ExcludeRule>> {
        let mut cache = self.parsed_excludes.lock().unwrap();
        if let Some(parsed) = cache.as_ref() {
            return Ok(parsed.clone());
        }
        let raw = self.own.lock().unwrap().exclude_rules_raw.clone();
        let parsed = raw
            .iter()
            .map(ExcludeRule::parse)
            .collect::<ConfigResult<Vec<_>>>()?;
        *cache = Some(parsed.clone());
        Ok(parsed)
    }

    /// Set a variant attribute. Attributes freeze when the configuration is
    /// locked for mutation, not when it is resolved.
    pub fn set_attribute(&self, key: &str, value: serde_json::Value) -> ConfigResult<()> {
        if self.is_locked() {
            return Err(ConfigError::attributes_locked(&self.display_name()));
        }
        self.own.lock().unwrap().attributes.insert(key.to_string(), value);
        Ok(())
    }

    pub fn add_capability(&self, capability: &str) -> ConfigResult<()> {
        if self.is_locked() {
            return Err(ConfigError::attributes_locked(&self.display_name()));
        }
        self.own.lock().unwrap().capabilities.push(capability.to_string());
        Ok(())
    }

    /// Amend the attributes of an already-declared dependency. Permitted in
    /// a relaxed window: only declarability gates it, never resolve state.
    pub fn set_dependency_attribute(
        &self,
        module: &ModuleIdentifier,
        key: &str,
        value: serde_json::Value,
    ) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::DependencyAttributes)?;
        let mut own = self.own.lock().unwrap();
        let dependency = own
            .dependencies
            .iter_mut()
            .find(|d| &d.module == module)
            .ok_or_else(|| {
                ConfigError::new(
                    ErrorCode::InvalidNotation,
                    format!("No dependency on {} is declared in {}", module, self.display_name()),
                )
            })?;
        dependency.attributes.insert(key.to_string(), value);
        Ok(())
    }

    // Resolution strategy

    pub fn resolution_strategy(&self) -> ResolutionStrategy {
        self.strategy.lock().unwrap().clone()
    }

    pub fn update_resolution_strategy(
        &self,
        f: impl FnOnce(&mut ResolutionStrategy),
    ) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Strategy)?;
        f(&mut *self.strategy.lock().unwrap());
        Ok(())
    }

    // Dependency actions

    /// Register defaults applied only if no dependencies were declared by
    /// the time resolution starts.
    pub fn default_dependencies(
        &self,
        action: impl Fn(&mut Vec<DeclaredDependency>) + Send + Sync + 'static,
    ) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Dependencies)?;
        self.actions.lock().unwrap().defaults.push(Arc::new(action));
        Ok(())
    }

    pub fn with_dependencies(
        &self,
        action: impl Fn(&mut Vec<DeclaredDependency>) + Send + Sync + 'static,
    ) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Dependencies)?;
        self.actions.lock().unwrap().with.push(Arc::new(action));
        Ok(())
    }

    /// Run and discard pending dependency actions, parents included.
    /// Normally driven by resolution; callable early to force the final
    /// dependency set.
    pub fn run_dependency_actions(&self) {
        let pending = std::mem::take(&mut *self.actions.lock().unwrap());
        for action in &pending.defaults {
            let mut own = self.own.lock().unwrap();
            if own.dependencies.is_empty() {
                action(&mut own.dependencies);
            }
        }
        for action in &pending.with {
            action(&mut self.own.lock().unwrap().dependencies);
        }
        for parent in self.parents.lock().unwrap().clone() {
            parent.run_dependency_actions();
        }
    }

    // Copies

    /// Detached copy carrying this node's directly declared dependencies.
    pub fn copy(self: &Arc<Self>) -> ConfigResult<Arc<ConfigurationNode>> {
        let (dependencies, constraints) = {
            let own = self.own.lock().unwrap();
            (own.dependencies.clone(), own.constraints.clone())
        };
        self.create_copy(dependencies, constraints)
    }

    /// Detached copy carrying the full inherited dependency set, flattened.
    pub fn copy_recursive(self: &Arc<Self>) -> ConfigResult<Arc<ConfigurationNode>> {
        self.create_copy(self.all_dependencies(), self.all_constraints())
    }

    fn create_copy(
        self: &Arc<Self>,
        dependencies: Vec<DeclaredDependency>,
        constraints: Vec<DeclaredConstraint>,
    ) -> ConfigResult<Arc<ConfigurationNode>> {
        let usage = self.usage.lock().unwrap().clone();
        let role = ConfigurationRole::adjusted_for_copy(
            !usage.consumable || usage.consumption_deprecated,
            !usage.resolvable || usage.resolution_deprecated,
            !usage.declarable || usage.declaration_deprecated,
        );

        let count = self.copy_count.fetch_add(1, Ordering::SeqCst) + 1;
        let copy_name = if count == 1 {
            format!("{}Copy", self.name)
        } else {
            format!("{}Copy{}", self.name, count)
        };

        // Aggregate inherited views before taking any lock on the copy.
        let all_artifacts = self.all_artifacts();
        let all_excludes = self.all_exclude_rules()?;

        let copy = ConfigurationNode::create(
            self.services.clone(),
            Weak::new(),
            &copy_name,
            role,
            !usage.usage_can_be_mutated,
            true,
        )?;

        {
            let mut copy_usage = copy.usage.lock().unwrap();
            copy_usage.consumption_alternatives = usage.consumption_alternatives.clone();
            copy_usage.resolution_alternatives = usage.resolution_alternatives.clone();
            copy_usage.declaration_alternatives = usage.declaration_alternatives.clone();
        }

        let (transitive, description, attributes, capabilities) = {
            let own = self.own.lock().unwrap();
            (
                own.transitive,
                own.description.clone(),
                own.attributes.clone(),
                own.capabilities.clone(),
            )
        };
        {
            let mut copy_own = copy.own.lock().unwrap();
            copy_own.dependencies = dependencies;
            copy_own.constraints = constraints;
            copy_own.artifacts = all_artifacts;
            copy_own.exclude_rules_raw = all_excludes
                .iter()
                .map(|rule| {
                    let mut raw = BTreeMap::new();
                    if let Some(group) = &rule.group {
                        raw.insert("group".to_string(), group.clone());
                    }
                    if let Some(module) = &rule.module {
                        raw.insert("module".to_string(), module.clone());
                    }
                    raw
                })
                .collect();
            copy_own.transitive = transitive;
            copy_own.description = description;
            copy_own.attributes = attributes;
            copy_own.capabilities = capabilities;
        }

        *copy.actions.lock().unwrap() = self.actions.lock().unwrap().clone();
        *copy.listeners.lock().unwrap() = self.listeners.lock().unwrap().clone();
        *copy.strategy.lock().unwrap() = self.strategy.lock().unwrap().clone();

        tracing::debug!(
            target: "config_graph::container",
            source = %self.identity_path,
            copy = %copy.identity_path(),
            "copied configuration"
        );
        Ok(copy)
    }
}

impl fmt::Display for ConfigurationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

impl fmt::Debug for ConfigurationNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationNode")
            .field("identity_path", &self.identity_path)
            .field("detached", &self.detached)
            .field("state", &self.state.get().state())
            .finish()
    }
}
