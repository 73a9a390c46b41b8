//! Extends-from edges and the inherited views computed over them.

use std::sync::{Arc, Weak};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{
    DeclaredConstraint, DeclaredDependency, ExcludeRule, MutationKind, PublishedArtifact,
};

use super::node::ConfigurationNode;

impl ConfigurationNode {
    /// Add extends-from edges to the given configurations. Existing edges
    /// are kept; duplicates are ignored. Fails without touching the edge
    /// set if the mutation is vetoed or an edge would close a cycle.
    pub fn extends_from(self: &Arc<Self>, parents: &[Arc<ConfigurationNode>]) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Hierarchy)?;
        let _guard = self.services.hierarchy_lock.lock().unwrap();
        for parent in parents {
            self.add_parent_edge(parent)?;
        }
        Ok(())
    }

    /// Replace the extends-from edge set wholesale.
    pub fn set_extends_from(
        self: &Arc<Self>,
        parents: &[Arc<ConfigurationNode>],
    ) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Hierarchy)?;
        let _guard = self.services.hierarchy_lock.lock().unwrap();
        let old = std::mem::take(&mut *self.parents.lock().unwrap());
        for former in &old {
            former.remove_observer(self);
        }
        for parent in parents {
            self.add_parent_edge(parent)?;
        }
        Ok(())
    }

    /// Caller holds the hierarchy lock.
    fn add_parent_edge(self: &Arc<Self>, parent: &Arc<ConfigurationNode>) -> ConfigResult<()> {
        if parent.hierarchy().iter().any(|n| std::ptr::eq(Arc::as_ptr(n), Arc::as_ptr(self))) {
            let chain = parent
                .hierarchy()
                .iter()
                .map(|n| n.display_name())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(ConfigError::cyclic_hierarchy(
                &self.display_name(),
                &parent.display_name(),
                &format!("[{}]", chain),
            ));
        }
        let mut parents = self.parents.lock().unwrap();
        if parents.iter().any(|p| Arc::ptr_eq(p, parent)) {
            return Ok(());
        }
        parents.push(parent.clone());
        drop(parents);
        parent
            .observers
            .lock()
            .unwrap()
            .push(Arc::downgrade(self));
        Ok(())
    }

    fn remove_observer(&self, observer: &Arc<ConfigurationNode>) {
        self.observers.lock().unwrap().retain(|weak| {
            weak.upgrade()
                .map(|node| !Arc::ptr_eq(&node, observer))
                .unwrap_or(false)
        });
    }

    /// The configurations this one directly extends from, in edge order.
    pub fn extends_from_set(&self) -> Vec<Arc<ConfigurationNode>> {
        self.parents.lock().unwrap().clone()
    }

    /// The full hierarchy starting with this node: a depth-first preorder
    /// walk of the extends-from edges where revisiting a configuration
    /// moves it to the back, so shared ancestors sort after everything
    /// that inherits from them.
    pub fn hierarchy(self: &Arc<Self>) -> Vec<Arc<ConfigurationNode>> {
        let mut result: Vec<Arc<ConfigurationNode>> = vec![self.clone()];
        collect_ancestors(self, &mut result);
        result
    }

    // Inherited views. Computed per access so they track later edits to
    // any configuration in the hierarchy.

    /// Directly declared dependencies followed by inherited ones, first
    /// occurrence wins for duplicates.
    pub fn all_dependencies(&self) -> Vec<DeclaredDependency> {
        let mut result = self.dependencies();
        for parent in self.extends_from_set() {
            for dependency in parent.all_dependencies() {
                if !result.contains(&dependency) {
                    result.push(dependency);
                }
            }
        }
        result
    }

    pub fn all_constraints(&self) -> Vec<DeclaredConstraint> {
        let mut result = self.constraints();
        for parent in self.extends_from_set() {
            for constraint in parent.all_constraints() {
                if !result.contains(&constraint) {
                    result.push(constraint);
                }
            }
        }
        result
    }

    pub fn all_artifacts(&self) -> Vec<PublishedArtifact> {
        let mut result = self.artifacts();
        for parent in self.extends_from_set() {
            for artifact in parent.all_artifacts() {
                if !result.contains(&artifact) {
                    result.push(artifact);
                }
            }
        }
        result
    }

    pub fn all_exclude_rules(&self) -> ConfigResult<Vec<ExcludeRule>> {
        let mut result = self.exclude_rules()?;
        for parent in self.extends_from_set() {
            for rule in parent.all_exclude_rules()? {
                if !result.contains(&rule) {
                    result.push(rule);
                }
            }
        }
        Ok(result)
    }
}

fn collect_ancestors(node: &Arc<ConfigurationNode>, result: &mut Vec<Arc<ConfigurationNode>>) {
    for parent in node.extends_from_set() {
        // Move-to-back on revisit keeps every ancestor after all of its
        // extenders seen so far.
        result.retain(|seen| !Arc::ptr_eq(seen, &parent));
        result.push(parent.clone());
        collect_ancestors(&parent, result);
    }
}

// Weak references to dropped observers are pruned on the next edge removal;
// upgrade failures during notification are simply skipped.
pub(crate) fn upgrade_observers(observers: &[Weak<ConfigurationNode>]) -> Vec<Arc<ConfigurationNode>> {
    observers.iter().filter_map(Weak::upgrade).collect()
}
