//! Consistent-resolution sources and synthetic dependency generation.
//!
//! Synthetic dependencies are constraints the engine injects on top of the
//! declared ones: locked versions from persisted lock state, and strict
//! pins derived from an already-resolved source configuration so that two
//! related graphs (say compile and runtime) agree on versions.

use std::sync::Arc;

use crate::error::{ConfigError, ConfigResult};
use crate::types::{ModuleIdentifier, ResolveState, SyntheticDependency, VersionConstraint};

use super::node::{ConfigurationNode, ConsistencySource};

impl ConfigurationNode {
    /// Pin every module version this configuration resolves to whatever
    /// `source` resolved it to. The source is resolved on demand when the
    /// synthetic dependencies are first requested, not now; cycles through
    /// sources are likewise detected at use.
    pub fn should_resolve_consistently_with(&self, source: &Arc<ConfigurationNode>) {
        let reason = format!(
            "version resolved in {} by consistent resolution",
            source.display_name()
        );
        *self.consistency.lock().unwrap() = Some(ConsistencySource {
            source: Arc::downgrade(source),
            reason,
        });
    }

    pub fn disable_consistent_resolution(&self) {
        *self.consistency.lock().unwrap() = None;
    }

    pub fn consistent_resolution_source(&self) -> Option<Arc<ConfigurationNode>> {
        self.consistency
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|c| c.source.upgrade())
    }

    /// The injected constraints for this configuration: lock-state
    /// constraints first, then consistent-resolution pins. Generated once
    /// and memoized; a failure leaves the memo empty so it can be retried.
    pub fn synthetic_dependencies(&self) -> ConfigResult<Arc<Vec<SyntheticDependency>>> {
        self.synthetic
            .get_or_try_init(|| self.generate_synthetic_dependencies())
    }

    fn generate_synthetic_dependencies(&self) -> ConfigResult<Vec<SyntheticDependency>> {
        let mut synthetic = Vec::new();
        if self.resolution_strategy().dependency_locking_enabled {
            let lock_state = self
                .services
                .locking
                .load_lock_state(self.name())
                .map_err(|err| ConfigError::lock_state(format!("{:#}", err)))?;
            let strict = lock_state.must_validate;
            for locked in lock_state.locked_dependencies {
                let (version, reason) = if strict {
                    (
                        VersionConstraint::strictly(&locked.version),
                        format!("dependency was locked to version '{}'", locked.version),
                    )
                } else {
                    (
                        VersionConstraint::prefer(&locked.version),
                        format!(
                            "dependency was locked to version '{}' (update/lenient mode)",
                            locked.version
                        ),
                    )
                };
                synthetic.push(SyntheticDependency {
                    module: ModuleIdentifier::new(locked.group, locked.module),
                    version,
                    reason,
                    from_lock_state: true,
                });
            }
        }
        synthetic.extend(self.consistent_resolution_constraints()?);
        tracing::debug!(
            target: "config_graph::resolution",
            configuration = %self.identity_path(),
            count = synthetic.len(),
            "generated synthetic dependencies"
        );
        Ok(synthetic)
    }

    fn consistent_resolution_constraints(&self) -> ConfigResult<Vec<SyntheticDependency>> {
        let (source, reason) = {
            let consistency = self.consistency.lock().unwrap();
            let Some(entry) = consistency.as_ref() else {
                return Ok(Vec::new());
            };
            match entry.source.upgrade() {
                Some(source) => (source, entry.reason.clone()),
                // The source configuration is gone; nothing to pin against.
                None => return Ok(Vec::new()),
            }
        };
        if !source.is_resolvable() {
            return Err(ConfigError::unresolvable_consistency_source(
                &source.display_name(),
                &self.display_name(),
            ));
        }
        self.assert_no_consistency_cycle()?;

        let state = source.resolve_to_state_or_later(ResolveState::ArtifactsResolved)?;
        let results = state.results()?;
        if let Some(failure) = &results.fatal_failure {
            return Err(source.resolution_error(failure));
        }
        let graph = results
            .graph
            .clone()
            .ok_or_else(ConfigError::results_not_available)?;
        Ok(graph
            .module_versions()
            .map(|id| SyntheticDependency {
                module: id.module(),
                version: VersionConstraint::strictly(id.version.clone()),
                reason: reason.clone(),
                from_lock_state: false,
            })
            .collect())
    }

    fn assert_no_consistency_cycle(&self) -> ConfigResult<()> {
        let mut visited: Vec<(*const ConfigurationNode, String)> =
            vec![(self as *const _, self.name().to_string())];
        let mut next = self.consistent_resolution_source();
        while let Some(node) = next {
            let ptr = Arc::as_ptr(&node);
            if visited.iter().any(|(seen, _)| *seen == ptr) {
                let chain = visited
                    .iter()
                    .map(|(_, name)| name.as_str())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                return Err(ConfigError::cyclic_consistent_resolution(&format!(
                    "{} -> {}",
                    chain,
                    self.name()
                )));
            }
            visited.push((ptr, node.name().to_string()));
            next = node.consistent_resolution_source();
        }
        Ok(())
    }
}
