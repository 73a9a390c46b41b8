//! Mutation validation, the cascade to extending configurations, and the
//! lock-for-mutation step.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{MutationKind, ResolveState};

use super::hierarchy::upgrade_observers;
use super::node::ConfigurationNode;

impl ConfigurationNode {
    /// Gate every mutation: check it against this node's lifecycle, record
    /// it, and cascade it to every configuration extending this one. Called
    /// before the mutation is applied, so a veto leaves state untouched.
    pub fn validate_mutation(&self, kind: MutationKind) -> ConfigResult<()> {
        self.prevent_illegal_mutation(kind)?;
        self.mark_as_modified(kind);
        self.notify_observers(kind)
    }

    fn prevent_illegal_mutation(&self, kind: MutationKind) -> ConfigResult<()> {
        // Dependency attributes stay amendable through the whole lifecycle;
        // only declarability gates them.
        if kind == MutationKind::DependencyAttributes {
            return self.assert_is_declarable();
        }
        let state = self.state.get().state();
        if state == ResolveState::ArtifactsResolved {
            return Err(ConfigError::mutation_after_resolve(kind, &self.display_name()));
        } else if state == ResolveState::GraphResolved {
            if kind == MutationKind::Dependencies {
                return Err(ConfigError::mutation_after_build_dependencies(
                    kind,
                    &self.display_name(),
                ));
            }
        } else {
            let observed = self.observed_state();
            if observed >= ResolveState::GraphResolved && kind != MutationKind::Strategy {
                return Err(ConfigError::mutation_after_observation(
                    kind,
                    &self.display_name(),
                    observed,
                    self.inside_before_resolve.load(Ordering::SeqCst),
                ));
            }
        }
        if kind == MutationKind::Usage {
            self.assert_usage_is_mutable()?;
        }
        Ok(())
    }

    /// The relaxed rule applied when something in this node's ancestry
    /// mutates: the child only vetoes what would invalidate results it has
    /// already produced.
    pub(crate) fn validate_parent_mutation(&self, kind: MutationKind) -> ConfigResult<()> {
        // Strategy is local to a node and never cascades.
        if kind == MutationKind::Strategy {
            return Ok(());
        }
        if kind != MutationKind::DependencyAttributes {
            let state = self.state.get().state();
            if state == ResolveState::ArtifactsResolved {
                return Err(ConfigError::parent_mutation_after_resolve(
                    kind,
                    &self.display_name(),
                ));
            }
            if state == ResolveState::GraphResolved && kind == MutationKind::Dependencies {
                return Err(ConfigError::parent_mutation_after_build_dependencies(
                    kind,
                    &self.display_name(),
                ));
            }
        }
        self.mark_as_modified(kind);
        self.notify_observers(kind)
    }

    fn mark_as_modified(&self, kind: MutationKind) {
        // Strategy edits and dependency-attribute amendments do not change
        // the graph inputs that double-resolution detection watches.
        if kind == MutationKind::Strategy || kind == MutationKind::DependencyAttributes {
            return;
        }
        self.dependencies_modified.store(true, Ordering::SeqCst);
    }

    fn notify_observers(&self, kind: MutationKind) -> ConfigResult<()> {
        let observers = upgrade_observers(&self.observers.lock().unwrap());
        for observer in observers {
            observer.validate_parent_mutation(kind)?;
        }
        Ok(())
    }

    // Locking

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Lock this configuration against further mutation. Idempotent. For a
    /// consumable configuration this also checks that its attribute set is
    /// unique among the locked consumable siblings of the project.
    pub fn lock(&self) -> ConfigResult<()> {
        self.lock_internal(false).map(|_| ())
    }

    /// Like [`ConfigurationNode::lock`] but collects attribute-uniqueness
    /// violations instead of failing on the first one.
    pub fn lock_lenient(&self) -> Vec<ConfigError> {
        match self.lock_internal(true) {
            Ok(violations) => violations,
            Err(err) => vec![err],
        }
    }

    fn lock_internal(&self, lenient: bool) -> ConfigResult<Vec<ConfigError>> {
        if self.locked.swap(true, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        self.prevent_usage_mutation();
        self.log_if_improper();
        let has_attributes = !self.own.lock().unwrap().attributes.is_empty();
        if self.must_have_unique_attributes() && has_attributes {
            return self.ensure_unique_attributes(lenient);
        }
        Ok(Vec::new())
    }

    /// Strictly consumable configurations advertise variants and must be
    /// distinguishable; the default configuration is grandfathered out.
    pub(crate) fn must_have_unique_attributes(&self) -> bool {
        let usage = self.usage.lock().unwrap();
        usage.consumable && !usage.resolvable && self.name() != "default"
    }

    fn ensure_unique_attributes(&self, lenient: bool) -> ConfigResult<Vec<ConfigError>> {
        // Detached copies have no siblings to collide with.
        let Some(registry) = self.registry.upgrade() else {
            return Ok(Vec::new());
        };
        let my_capabilities = self.effective_capabilities();
        let my_attributes = self.own.lock().unwrap().attributes.clone();
        let collisions: Vec<String> = registry
            .all()
            .iter()
            .filter(|other| !std::ptr::eq(Arc::as_ptr(other), self as *const _))
            .filter(|other| other.must_have_unique_attributes() && other.is_locked())
            .filter(|other| other.effective_capabilities() == my_capabilities)
            .filter(|other| other.own.lock().unwrap().attributes == my_attributes)
            .map(|other| other.display_name())
            .collect();
        if collisions.is_empty() {
            return Ok(Vec::new());
        }
        let err = ConfigError::duplicate_attributes(&self.display_name(), &collisions);
        if lenient {
            Ok(vec![err])
        } else {
            Err(err)
        }
    }

    /// Declared capabilities, or the implicit project capability when none
    /// were declared.
    fn effective_capabilities(&self) -> BTreeSet<String> {
        let declared = self.own.lock().unwrap().capabilities.clone();
        if declared.is_empty() {
            let mut implicit = BTreeSet::new();
            implicit.insert(format!("project:{}", self.services.project_path));
            implicit
        } else {
            declared.into_iter().collect()
        }
    }

    /// Advisory (not an error, for compatibility) when the role mixes
    /// usages that should be split across separate configurations.
    pub(crate) fn log_if_improper(&self) {
        let Some(role) = self.role_at_creation() else {
            return;
        };
        if *role == crate::types::LEGACY {
            return;
        }
        let (consumable, resolvable, declarable) = {
            let usage = self.usage.lock().unwrap();
            (usage.consumable, usage.resolvable, usage.declarable)
        };
        if consumable && resolvable {
            self.services.reporter.advisory(&format!(
                "The configuration {} is both resolvable and consumable. \
                 This is considered a legacy configuration and it will eventually only be possible to be one of these.",
                self.identity_path()
            ));
        }
        if consumable && declarable {
            self.services.reporter.advisory(&format!(
                "The configuration {} is both consumable and declarable. \
                 This combination is incorrect, only one of these flags should be set.",
                self.identity_path()
            ));
        }
    }
}
