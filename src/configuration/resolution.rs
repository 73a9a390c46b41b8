//! The four-state resolution machine.
//!
//! `UNRESOLVED < BUILD_DEPENDENCIES_RESOLVED < GRAPH_RESOLVED <
//! ARTIFACTS_RESOLVED`, advancing monotonically, each transition running at
//! most once. The cached state is published before post-resolve listeners
//! run, so a listener (or anything it triggers) observes the node as
//! resolved.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crate::cell::MemoCell;
use crate::error::{ConfigError, ConfigResult};
use crate::resolver::{ModuleNotFound, ResolvedGraph, ResolverResults};
use crate::types::ResolveState;

use super::node::ConfigurationNode;

/// One published snapshot of where resolution stands: the state reached and
/// the results captured on the way there, failures included.
#[derive(Debug)]
pub struct ResolutionState {
    state: ResolveState,
    results: Option<Arc<ResolverResults>>,
}

impl ResolutionState {
    pub(crate) fn unresolved() -> Self {
        Self {
            state: ResolveState::Unresolved,
            results: None,
        }
    }

    fn reached(state: ResolveState, results: Arc<ResolverResults>) -> Self {
        Self {
            state,
            results: Some(results),
        }
    }

    pub fn state(&self) -> ResolveState {
        self.state
    }

    pub fn has_error(&self) -> bool {
        self.results.as_ref().map(|r| r.has_error()).unwrap_or(false)
    }

    /// The raw cached results, without replaying captured failures.
    pub fn results(&self) -> ConfigResult<Arc<ResolverResults>> {
        self.results
            .clone()
            .ok_or_else(ConfigError::results_not_available)
    }
}

impl ConfigurationNode {
    pub fn resolve_state(&self) -> ResolveState {
        self.state.get().state()
    }

    pub fn observed_state(&self) -> ResolveState {
        ResolveState::from_u8(self.observed.load(Ordering::SeqCst))
    }

    pub fn before_resolve(&self, listener: impl Fn(&ConfigurationNode) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().before.push(Arc::new(listener));
    }

    pub fn after_resolve(&self, listener: impl Fn(&ConfigurationNode) + Send + Sync + 'static) {
        self.listeners.lock().unwrap().after.push(Arc::new(listener));
    }

    /// Record that a consumer included this configuration in a resolution
    /// at the given depth, and propagate the watermark to every ancestor.
    pub fn mark_as_observed(&self, requested: ResolveState) {
        self.observed.fetch_max(requested as u8, Ordering::SeqCst);
        self.mark_parents_observed(requested);
    }

    pub(crate) fn mark_parents_observed(&self, requested: ResolveState) {
        for parent in self.extends_from_set() {
            parent.mark_as_observed(requested);
        }
    }

    fn mark_referenced_configurations_observed(
        &self,
        requested: ResolveState,
        results: &ResolverResults,
    ) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        for reference in &results.resolved_project_configurations {
            // The registry only holds this project's configurations; a
            // same-named configuration of another project is not ours.
            if reference.project_path != self.services.project_path {
                continue;
            }
            let Some(node) = registry.find(&reference.configuration) else {
                continue;
            };
            if std::ptr::eq(Arc::as_ptr(&node), self as *const _) {
                continue;
            }
            node.mark_as_observed(requested);
            tracing::debug!(
                target: "config_graph::resolution",
                configuration = %node.identity_path(),
                observed_by = %self.identity_path(),
                "marked referenced configuration as observed"
            );
        }
    }

    /// Drive resolution forward to at least `target`, returning the cached
    /// state snapshot. Captured resolution failures are not replayed here;
    /// use the value accessors for that.
    pub fn resolve_to_state_or_later(&self, target: ResolveState) -> ConfigResult<Arc<ResolutionState>> {
        self.assert_is_resolvable()?;
        self.warn_if_deprecated_for_resolving();
        self.log_if_improper();

        let current = self.state.get();
        if current.state() >= target {
            return Ok(current);
        }

        if !self.services.domain.has_mutable_state() {
            if !self.services.domain.is_worker_thread() {
                return Err(ConfigError::unmanaged_thread(self.identity_path()));
            }
            self.services.reporter.deprecation(&format!(
                "Resolution of the configuration {} was attempted from a context different than the project context. \
                 This will fail with an error in a future release.",
                self.identity_path()
            ));
            return self
                .services
                .domain
                .with_mutable_state(|| self.resolve_exclusively(target));
        }
        self.resolve_exclusively(target)
    }

    fn resolve_exclusively(&self, target: ResolveState) -> ConfigResult<Arc<ResolutionState>> {
        self.state.update(|initial| {
            let mut current = initial;
            if target >= ResolveState::GraphResolved {
                current = self.resolve_graph_if_required(target, current)?;
            }
            if target == ResolveState::ArtifactsResolved {
                current = self.resolve_artifacts_if_required(current)?;
            }
            Ok(current)
        })
    }

    fn resolve_graph_if_required(
        &self,
        target: ResolveState,
        current: Arc<ResolutionState>,
    ) -> ConfigResult<Arc<ResolutionState>> {
        if current.state() >= ResolveState::GraphResolved {
            if self.dependencies_modified.load(Ordering::SeqCst) {
                return Err(ConfigError::double_resolution(&self.display_name()));
            }
            return Ok(current);
        }

        self.run_dependency_actions();
        self.lock()?;

        let before = self.listeners.lock().unwrap().before.clone();
        self.inside_before_resolve.store(true, Ordering::SeqCst);
        for listener in &before {
            listener(self);
        }
        self.inside_before_resolve.store(false, Ordering::SeqCst);

        let mut results = ResolverResults::default();
        if let Err(failure) = self.services.resolver.resolve_graph(self, &mut results) {
            results.fatal_failure = Some(Arc::new(failure));
        }
        self.dependencies_modified.store(false, Ordering::SeqCst);
        let results = Arc::new(results);

        // Publish before anything downstream runs, so listeners and
        // concurrent readers already see the node as graph-resolved.
        let reached = Arc::new(ResolutionState::reached(
            ResolveState::GraphResolved,
            results.clone(),
        ));
        self.state.set(reached.clone());

        self.mark_parents_observed(target);
        self.mark_referenced_configurations_observed(target, &results);

        // One-shot listeners: taken regardless of the outcome, so a retry
        // after failure cannot fire them twice.
        let taken = std::mem::take(&mut *self.listeners.lock().unwrap());

        if results.fatal_failure.is_none() && results.non_fatal_failure.is_none() {
            for listener in &taken.after {
                listener(self);
            }
            // A listener may have advanced the state further.
            tracing::debug!(
                target: "config_graph::resolution",
                configuration = %self.identity_path(),
                "graph resolution finished"
            );
            return Ok(self.state.get());
        }

        tracing::debug!(
            target: "config_graph::resolution",
            configuration = %self.identity_path(),
            "graph resolution failed"
        );
        Ok(reached)
    }

    fn resolve_artifacts_if_required(
        &self,
        current: Arc<ResolutionState>,
    ) -> ConfigResult<Arc<ResolutionState>> {
        if current.state() == ResolveState::ArtifactsResolved {
            return Ok(current);
        }
        if current.state() != ResolveState::GraphResolved {
            return Err(ConfigError::artifacts_before_graph());
        }
        let mut results = (*current.results()?).clone();
        if results.fatal_failure.is_none() {
            if let Err(failure) = self.services.resolver.resolve_artifacts(self, &mut results) {
                results.fatal_failure = Some(Arc::new(failure));
            }
        }
        Ok(Arc::new(ResolutionState::reached(
            ResolveState::ArtifactsResolved,
            Arc::new(results),
        )))
    }

    /// Resolve fully and return the results, failing if the resolver
    /// captured any failure (fatal or not).
    pub fn resolve(&self) -> ConfigResult<Arc<ResolverResults>> {
        let state = self.resolve_to_state_or_later(ResolveState::ArtifactsResolved)?;
        self.strict_results(&state)
    }

    /// The graph computed just deeply enough to schedule producing tasks.
    /// Skips full graph resolution unless the strategy demands it.
    pub fn resolve_for_build_dependencies(&self) -> ConfigResult<Arc<ResolverResults>> {
        self.assert_is_resolvable()?;
        if self
            .resolution_strategy()
            .resolve_graph_to_determine_task_dependencies
        {
            let state = self.resolve_to_state_or_later(ResolveState::GraphResolved)?;
            return state.results();
        }
        let state = self.state.update(|initial| -> ConfigResult<Arc<ResolutionState>> {
            if initial.state() != ResolveState::Unresolved {
                return Ok(initial);
            }
            let mut results = ResolverResults::default();
            if let Err(failure) = self
                .services
                .resolver
                .resolve_build_dependencies(self, &mut results)
            {
                results.fatal_failure = Some(Arc::new(failure));
            }
            self.mark_referenced_configurations_observed(
                ResolveState::BuildDependenciesResolved,
                &results,
            );
            Ok(Arc::new(ResolutionState::reached(
                ResolveState::BuildDependenciesResolved,
                Arc::new(results),
            )))
        })?;
        state.results()
    }

    /// Discard all cached resolution state, returning to `UNRESOLVED`. The
    /// single sanctioned break of monotonicity; the caller owns the
    /// consequences for anything already handed out.
    pub fn reset_resolution_state(&self) {
        self.state.set(Arc::new(ResolutionState::unresolved()));
        tracing::debug!(
            target: "config_graph::resolution",
            configuration = %self.identity_path(),
            "resolution state reset"
        );
    }

    fn strict_results(&self, state: &ResolutionState) -> ConfigResult<Arc<ResolverResults>> {
        let results = state.results()?;
        if let Some(failure) = &results.fatal_failure {
            return Err(self.resolution_error(failure));
        }
        if let Some(failure) = &results.non_fatal_failure {
            return Err(self.resolution_error(failure));
        }
        Ok(results)
    }

    pub(crate) fn resolution_error(&self, failure: &anyhow::Error) -> ConfigError {
        ConfigError::resolution(
            &self.display_name(),
            failure,
            self.failure_hint(failure).as_deref(),
        )
    }

    /// Project-level repositories silently replace the settings-level ones;
    /// when a module cannot be found and both are declared, that shadowing
    /// is the likeliest culprit.
    fn failure_hint(&self, failure: &anyhow::Error) -> Option<String> {
        let repos = self.services.repositories.lock().unwrap();
        if repos.project.is_empty() || repos.settings.is_empty() {
            return None;
        }
        let module_not_found = failure
            .chain()
            .any(|cause| cause.downcast_ref::<ModuleNotFound>().is_some());
        if module_not_found {
            Some(
                "The project declares repositories, effectively ignoring the repositories you have declared in the settings."
                    .to_string(),
            )
        } else {
            None
        }
    }

    /// Lenient view over this configuration's resolution: a non-fatal
    /// failure is handed to `error_handler` once instead of failing the
    /// access.
    pub fn lenient_resolution(
        self: &Arc<Self>,
        error_handler: Option<Box<dyn FnOnce(&anyhow::Error) + Send>>,
    ) -> LenientResolution {
        LenientResolution {
            node: self.clone(),
            handler: Mutex::new(error_handler),
            memo: MemoCell::new(),
        }
    }
}

/// Lazily-resolving accessor that consumes one non-fatal failure through a
/// handler. Fatal failures still fail every access.
pub struct LenientResolution {
    node: Arc<ConfigurationNode>,
    handler: Mutex<Option<Box<dyn FnOnce(&anyhow::Error) + Send>>>,
    memo: MemoCell<Arc<ResolverResults>>,
}

impl LenientResolution {
    pub fn results(&self) -> ConfigResult<Arc<ResolverResults>> {
        let memoized = self.memo.get_or_try_init(|| {
            let state = self
                .node
                .resolve_to_state_or_later(ResolveState::ArtifactsResolved)?;
            let results = state.results()?;
            if let Some(failure) = &results.fatal_failure {
                return Err(self.node.resolution_error(failure));
            }
            if let Some(failure) = &results.non_fatal_failure {
                match self.handler.lock().unwrap().take() {
                    Some(handler) => handler(failure),
                    None => return Err(self.node.resolution_error(failure)),
                }
            }
            Ok(results)
        })?;
        Ok((*memoized).clone())
    }

    pub fn graph(&self) -> ConfigResult<Arc<ResolvedGraph>> {
        let results = self.results()?;
        results
            .graph
            .clone()
            .ok_or_else(ConfigError::results_not_available)
    }
}
