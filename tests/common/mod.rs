//! Shared test fixtures: a scripted resolver and container builders.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use config_graph::configuration::ConfigurationContainer;
use config_graph::locking::{DependencyLockingProvider, NoLocking};
use config_graph::report::RecordingReporter;
use config_graph::resolver::{
    ArtifactIndex, ComponentIdentifier, ConfigurationResolver, ModuleNotFound, ResolvedArtifact,
    ResolvedComponent, ResolvedGraph, ResolvedProjectConfiguration, ResolverResults,
};
use config_graph::types::ModuleVersionIdentifier;
use config_graph::ConfigurationNode;

/// Resolver that synthesizes a graph from the declared dependencies,
/// honoring strict synthetic constraints, and counts its invocations.
#[derive(Default)]
pub struct StubResolver {
    pub build_dependency_resolves: AtomicUsize,
    pub graph_resolves: AtomicUsize,
    pub artifact_resolves: AtomicUsize,
    /// When set, graph resolution fails fatally with this message.
    pub fail_graph_with: Mutex<Option<String>>,
    /// When set, graph resolution fails fatally with a module-not-found
    /// error for this selector.
    pub fail_module_not_found: Mutex<Option<String>>,
    /// When set, graph resolution succeeds but records a non-fatal failure.
    pub non_fatal_failure: Mutex<Option<String>>,
    /// Project configurations every resolution reports as referenced.
    pub references: Mutex<Vec<ResolvedProjectConfiguration>>,
}

impl StubResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refer_to(&self, project_path: &str, configuration: &str) {
        self.references.lock().unwrap().push(ResolvedProjectConfiguration {
            project_path: project_path.to_string(),
            configuration: configuration.to_string(),
        });
    }

    fn build_graph(&self, node: &ConfigurationNode) -> anyhow::Result<ResolvedGraph> {
        let synthetic = node.synthetic_dependencies().map_err(anyhow::Error::new)?;
        let root = ComponentIdentifier::Project {
            path: node.identity_path().to_string(),
        };
        let mut components = Vec::new();
        let mut edges = Vec::new();
        for dependency in node.all_dependencies() {
            let version = synthetic
                .iter()
                .find(|s| s.module == dependency.module && s.version.strict)
                .map(|s| s.version.version.clone())
                .unwrap_or_else(|| dependency.version.version.clone());
            let id = ComponentIdentifier::Module(ModuleVersionIdentifier::new(
                dependency.module.group.clone(),
                dependency.module.name.clone(),
                version,
            ));
            edges.push(id.clone());
            components.push(ResolvedComponent {
                id,
                dependencies: Vec::new(),
            });
        }
        components.insert(
            0,
            ResolvedComponent {
                id: root.clone(),
                dependencies: edges,
            },
        );
        Ok(ResolvedGraph { root, components })
    }
}

impl ConfigurationResolver for StubResolver {
    fn resolve_build_dependencies(
        &self,
        node: &ConfigurationNode,
        results: &mut ResolverResults,
    ) -> anyhow::Result<()> {
        self.build_dependency_resolves.fetch_add(1, Ordering::SeqCst);
        let root = ComponentIdentifier::Project {
            path: node.identity_path().to_string(),
        };
        results.graph = Some(Arc::new(ResolvedGraph {
            root: root.clone(),
            components: vec![ResolvedComponent {
                id: root,
                dependencies: Vec::new(),
            }],
        }));
        results.resolved_project_configurations = self.references.lock().unwrap().clone();
        Ok(())
    }

    fn resolve_graph(
        &self,
        node: &ConfigurationNode,
        results: &mut ResolverResults,
    ) -> anyhow::Result<()> {
        self.graph_resolves.fetch_add(1, Ordering::SeqCst);
        if let Some(selector) = self.fail_module_not_found.lock().unwrap().clone() {
            return Err(anyhow::Error::new(ModuleNotFound::new(selector)));
        }
        if let Some(message) = self.fail_graph_with.lock().unwrap().clone() {
            anyhow::bail!("{}", message);
        }
        results.graph = Some(Arc::new(self.build_graph(node)?));
        results.resolved_project_configurations = self.references.lock().unwrap().clone();
        if let Some(message) = self.non_fatal_failure.lock().unwrap().clone() {
            results.non_fatal_failure = Some(Arc::new(anyhow::anyhow!("{}", message)));
        }
        Ok(())
    }

    fn resolve_artifacts(
        &self,
        node: &ConfigurationNode,
        results: &mut ResolverResults,
    ) -> anyhow::Result<()> {
        self.artifact_resolves.fetch_add(1, Ordering::SeqCst);
        let component = ComponentIdentifier::Project {
            path: node.identity_path().to_string(),
        };
        let artifacts = node
            .all_artifacts()
            .into_iter()
            .map(|artifact| ResolvedArtifact {
                component: component.clone(),
                artifact,
                attributes: node.attributes(),
            })
            .collect();
        results.visited_artifacts = Some(Arc::new(ArtifactIndex { artifacts }));
        Ok(())
    }
}

/// A container wired to a stub resolver and a recording reporter.
pub struct TestBuild {
    pub container: ConfigurationContainer,
    pub resolver: Arc<StubResolver>,
    pub reporter: Arc<RecordingReporter>,
}

pub fn setup_build() -> TestBuild {
    setup_build_with_locking(Arc::new(NoLocking))
}

pub fn setup_build_with_locking(locking: Arc<dyn DependencyLockingProvider>) -> TestBuild {
    let resolver = Arc::new(StubResolver::new());
    let reporter = Arc::new(RecordingReporter::new());
    let container =
        ConfigurationContainer::new(":app", resolver.clone(), locking, reporter.clone());
    TestBuild {
        container,
        resolver,
        reporter,
    }
}
