//! Tests for the resolve-state machine: exclusivity, idempotence,
//! listener ordering, failure caching and the observation watermark.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use common::setup_build;
use config_graph::types::{DeclaredDependency, DEPENDENCY_SCOPE, LEGACY};
use config_graph::{ErrorCode, ResolveState};

#[test]
fn resolving_builds_a_graph_from_declared_dependencies() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    runtime
        .add_dependency(DeclaredDependency::new("org.example", "lib", "1.0"))
        .unwrap();

    let results = runtime.resolve().unwrap();
    let graph = results.graph.as_ref().expect("graph must be cached");
    assert!(graph.contains_module("org.example", "lib", "1.0"));
    assert_eq!(runtime.resolve_state(), ResolveState::ArtifactsResolved);
    assert!(runtime.is_locked(), "resolution locks the configuration");

    // Cached: a second full resolve must not call the resolver again.
    runtime.resolve().unwrap();
    assert_eq!(build.resolver.graph_resolves.load(Ordering::SeqCst), 1);
    assert_eq!(build.resolver.artifact_resolves.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_resolution_runs_the_resolver_exactly_once() {
    let build = Arc::new(setup_build());
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    runtime
        .add_dependency(DeclaredDependency::new("org.example", "lib", "1.0"))
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..50 {
        let build = build.clone();
        let node = runtime.clone();
        handles.push(std::thread::spawn(move || {
            build.container.register_current_worker();
            let state = node
                .resolve_to_state_or_later(ResolveState::GraphResolved)
                .expect("worker resolution failed");
            assert!(state.state() >= ResolveState::GraphResolved);
        }));
    }
    for handle in handles {
        handle.join().expect("worker thread panicked");
    }

    assert_eq!(
        build.resolver.graph_resolves.load(Ordering::SeqCst),
        1,
        "graph resolution must run exactly once"
    );
    assert_eq!(runtime.resolve_state(), ResolveState::GraphResolved);
}

#[test]
fn unmanaged_threads_may_not_resolve() {
    let build = Arc::new(setup_build());
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();

    let node = runtime.clone();
    std::thread::spawn(move || {
        let err = node
            .resolve_to_state_or_later(ResolveState::GraphResolved)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UnmanagedThread);
    })
    .join()
    .unwrap();

    assert_eq!(runtime.resolve_state(), ResolveState::Unresolved);
}

#[test]
fn worker_threads_resolve_with_a_deprecation() {
    let build = Arc::new(setup_build());
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();

    let b = build.clone();
    let node = runtime.clone();
    std::thread::spawn(move || {
        b.container.register_current_worker();
        node.resolve_to_state_or_later(ResolveState::GraphResolved)
            .expect("registered worker must be able to resolve");
    })
    .join()
    .unwrap();

    assert!(
        build
            .reporter
            .has_deprecation_containing("was attempted from a context different"),
        "expected a worker-thread deprecation, got {:?}",
        build.reporter.deprecations()
    );
}

#[test]
fn state_is_published_before_after_resolve_listeners_run() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();

    let observed = Arc::new(Mutex::new(None));
    let captured = observed.clone();
    runtime.after_resolve(move |node| {
        *captured.lock().unwrap() = Some(node.resolve_state());
    });
    runtime
        .resolve_to_state_or_later(ResolveState::GraphResolved)
        .unwrap();

    assert_eq!(
        *observed.lock().unwrap(),
        Some(ResolveState::GraphResolved),
        "listeners must observe the already-published state"
    );
}

#[test]
fn listeners_are_discarded_after_a_failed_attempt() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    *build.resolver.fail_graph_with.lock().unwrap() = Some("boom".to_string());

    let after_calls = Arc::new(AtomicUsize::new(0));
    let counter = after_calls.clone();
    runtime.after_resolve(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let err = runtime.resolve().unwrap_err();
    assert_eq!(err.code, ErrorCode::ResolutionFailed);
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);

    // The failure is cached and replayed without re-running the resolver.
    let err = runtime.resolve().unwrap_err();
    assert_eq!(err.code, ErrorCode::ResolutionFailed);
    assert_eq!(build.resolver.graph_resolves.load(Ordering::SeqCst), 1);

    // Even after an explicit reset and a successful retry, the discarded
    // listeners stay gone.
    *build.resolver.fail_graph_with.lock().unwrap() = None;
    runtime.reset_resolution_state();
    assert_eq!(runtime.resolve_state(), ResolveState::Unresolved);
    runtime.resolve().unwrap();
    assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    assert_eq!(build.resolver.graph_resolves.load(Ordering::SeqCst), 2);
}

#[test]
fn non_resolvable_configurations_refuse_to_resolve() {
    let build = setup_build();
    let deps = build.container.create("implementation", DEPENDENCY_SCOPE, false).unwrap();
    let err = deps
        .resolve_to_state_or_later(ResolveState::GraphResolved)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RoleViolation);
    assert!(
        err.message.contains("'canBeResolved=false'"),
        "unexpected message: {}",
        err.message
    );
}

#[test]
fn build_dependency_resolution_uses_the_lightweight_walk() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();

    runtime.resolve_for_build_dependencies().unwrap();
    assert_eq!(runtime.resolve_state(), ResolveState::BuildDependenciesResolved);
    assert_eq!(build.resolver.build_dependency_resolves.load(Ordering::SeqCst), 1);
    assert_eq!(build.resolver.graph_resolves.load(Ordering::SeqCst), 0);

    // Repeat is a no-op; a later full resolve still runs the real thing.
    runtime.resolve_for_build_dependencies().unwrap();
    assert_eq!(build.resolver.build_dependency_resolves.load(Ordering::SeqCst), 1);
    runtime
        .resolve_to_state_or_later(ResolveState::GraphResolved)
        .unwrap();
    assert_eq!(build.resolver.graph_resolves.load(Ordering::SeqCst), 1);
}

#[test]
fn strategy_can_force_full_graph_resolution_for_task_dependencies() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    runtime
        .update_resolution_strategy(|strategy| {
            strategy.resolve_graph_to_determine_task_dependencies = true;
        })
        .unwrap();

    runtime.resolve_for_build_dependencies().unwrap();
    assert_eq!(runtime.resolve_state(), ResolveState::GraphResolved);
    assert_eq!(build.resolver.build_dependency_resolves.load(Ordering::SeqCst), 0);
    assert_eq!(build.resolver.graph_resolves.load(Ordering::SeqCst), 1);
}

#[test]
fn module_not_found_with_shadowed_settings_repositories_gets_a_hint() {
    let build = setup_build();
    build.container.declare_repositories(
        vec!["https://repo.example.com/project".to_string()],
        vec!["https://repo.example.com/settings".to_string()],
    );
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    *build.resolver.fail_module_not_found.lock().unwrap() =
        Some("org.example:lib:1.0".to_string());

    let err = runtime.resolve().unwrap_err();
    assert_eq!(err.code, ErrorCode::ResolutionFailed);
    assert!(
        err.details
            .as_deref()
            .unwrap_or("")
            .contains("ignoring the repositories you have declared in the settings"),
        "expected the repository-shadowing hint, got {:?}",
        err.details
    );
}

#[test]
fn plain_failures_get_no_repository_hint() {
    let build = setup_build();
    build.container.declare_repositories(
        vec!["https://repo.example.com/project".to_string()],
        vec!["https://repo.example.com/settings".to_string()],
    );
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    *build.resolver.fail_graph_with.lock().unwrap() = Some("checksum mismatch".to_string());

    let err = runtime.resolve().unwrap_err();
    assert_eq!(err.details, None);
}

#[test]
fn lenient_resolution_hands_a_non_fatal_failure_to_the_handler_once() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    runtime
        .add_dependency(DeclaredDependency::new("org.example", "lib", "1.0"))
        .unwrap();
    *build.resolver.non_fatal_failure.lock().unwrap() =
        Some("could not fetch one variant".to_string());

    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    let lenient = runtime.lenient_resolution(Some(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    })));

    let graph = lenient.graph().unwrap();
    assert!(graph.contains_module("org.example", "lib", "1.0"));
    assert_eq!(handled.load(Ordering::SeqCst), 1);

    // Memoized: the handler does not fire again.
    lenient.results().unwrap();
    assert_eq!(handled.load(Ordering::SeqCst), 1);

    // Strict access still sees the failure.
    let err = runtime.resolve().unwrap_err();
    assert_eq!(err.code, ErrorCode::ResolutionFailed);
}

#[test]
fn lenient_resolution_without_a_handler_still_fails() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    *build.resolver.non_fatal_failure.lock().unwrap() = Some("partial".to_string());

    let lenient = runtime.lenient_resolution(None);
    let err = lenient.results().unwrap_err();
    assert_eq!(err.code, ErrorCode::ResolutionFailed);
}

#[test]
fn referenced_project_configurations_become_observed() {
    let build = setup_build();
    let other = build.container.create("other", LEGACY, false).unwrap();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    build.resolver.refer_to(":app", "other");

    runtime
        .resolve_to_state_or_later(ResolveState::ArtifactsResolved)
        .unwrap();

    assert_eq!(other.observed_state(), ResolveState::ArtifactsResolved);
    let err = other
        .add_dependency(DeclaredDependency::new("org.example", "lib", "1.0"))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MutationAfterLock);
}

#[test]
fn references_into_other_projects_do_not_observe_local_configurations() {
    let build = setup_build();
    let other = build.container.create("other", LEGACY, false).unwrap();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    // Same configuration name, different project.
    build.resolver.refer_to(":lib", "other");

    runtime
        .resolve_to_state_or_later(ResolveState::ArtifactsResolved)
        .unwrap();

    assert_eq!(other.observed_state(), ResolveState::Unresolved);
    other
        .add_dependency(DeclaredDependency::new("org.example", "lib", "1.0"))
        .unwrap();
}

#[test]
fn resolving_a_deprecated_configuration_warns_with_alternatives() {
    let build = setup_build();
    let compile = build.container.create("compile", LEGACY, false).unwrap();
    compile.deprecate_for_resolution(&["compileClasspath"]).unwrap();

    compile
        .resolve_to_state_or_later(ResolveState::GraphResolved)
        .unwrap();

    assert!(
        build
            .reporter
            .has_deprecation_containing("deprecated for resolution"),
        "expected a resolution deprecation, got {:?}",
        build.reporter.deprecations()
    );
    assert!(build.reporter.has_deprecation_containing("compileClasspath"));
}

#[test]
fn reset_returns_to_unresolved_and_allows_a_fresh_resolve() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    runtime.resolve().unwrap();
    assert_eq!(runtime.resolve_state(), ResolveState::ArtifactsResolved);

    runtime.reset_resolution_state();
    assert_eq!(runtime.resolve_state(), ResolveState::Unresolved);

    runtime.resolve().unwrap();
    assert_eq!(build.resolver.graph_resolves.load(Ordering::SeqCst), 2);
}
