//! Tests for capability roles, usage locking and copies.

mod common;

use std::collections::BTreeMap;

use common::setup_build;
use config_graph::types::{
    DeclaredDependency, PublishedArtifact, CONSUMABLE, DEPENDENCY_SCOPE, LEGACY, RESOLVABLE,
};
use config_graph::ErrorCode;

#[test]
fn roles_fix_capabilities_at_creation() {
    let build = setup_build();
    let resolvable = build.container.create("runtimeClasspath", RESOLVABLE, false).unwrap();
    assert!(resolvable.is_resolvable());
    assert!(!resolvable.is_consumable());
    assert!(!resolvable.is_declarable());

    let err = resolvable
        .add_dependency(DeclaredDependency::new("org.example", "lib", "1.0"))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RoleViolation);
    assert!(err.message.contains("'canBeDeclared=false'"));

    let scope = build.container.create("implementation", DEPENDENCY_SCOPE, false).unwrap();
    let err = scope.assert_is_consumable().unwrap_err();
    assert!(err.message.contains("'canBeConsumed=false'"));
}

#[test]
fn noop_usage_flips_are_silent_even_when_locked() {
    let build = setup_build();
    let locked = build.container.create("elements", RESOLVABLE, true).unwrap();
    assert!(!locked.is_usage_mutable());

    // Setting a flag to its current value is not a mutation at all.
    locked.set_can_be_resolved(true).unwrap();
    locked.set_can_be_consumed(false).unwrap();
    assert!(build.reporter.deprecations().is_empty());
}

#[test]
fn locked_usage_rejects_real_flips_naming_the_role() {
    let build = setup_build();
    let locked = build.container.create("elements", RESOLVABLE, true).unwrap();

    let err = locked.set_can_be_consumed(true).unwrap_err();
    assert_eq!(err.code, ErrorCode::UsageLocked);
    assert!(
        err.message.contains("locked upon creation to the role: 'Resolvable'"),
        "unexpected message: {}",
        err.message
    );
    assert!(err.message.contains("Resolvable - this configuration can be resolved"));
    assert!(!locked.is_consumable(), "failed flip must not change the flag");
}

#[test]
fn locked_legacy_usage_uses_the_plain_message() {
    let build = setup_build();
    let legacy = build.container.create("compile", LEGACY, false).unwrap();
    legacy.prevent_usage_mutation();

    let err = legacy.set_can_be_consumed(false).unwrap_err();
    assert_eq!(err.code, ErrorCode::UsageLocked);
    assert!(
        err.message.ends_with("as it has been locked."),
        "unexpected message: {}",
        err.message
    );
}

#[test]
fn real_usage_flips_warn_outside_the_special_cases() {
    let build = setup_build();
    let custom = build.container.create("custom", RESOLVABLE, false).unwrap();
    custom.set_can_be_consumed(true).unwrap();

    assert!(
        build.reporter.has_deprecation_containing(
            "Allowed usage is changing for configuration ':app:custom', consumable was false and is now true"
        ),
        "expected a usage-change deprecation, got {:?}",
        build.reporter.deprecations()
    );
}

#[test]
fn api_elements_changes_are_exempt_from_the_warning() {
    let build = setup_build();
    let api = build.container.create("apiElements", CONSUMABLE, false).unwrap();
    api.set_can_be_resolved(true).unwrap();
    api.set_can_be_consumed(false).unwrap();
    assert!(build.reporter.deprecations().is_empty());
}

#[test]
fn runtime_elements_exemption_only_covers_disabling_consumption() {
    let build = setup_build();
    let elements = build.container.create("runtimeElements", CONSUMABLE, false).unwrap();

    elements.set_can_be_consumed(false).unwrap();
    assert!(build.reporter.deprecations().is_empty());

    elements.set_can_be_resolved(true).unwrap();
    assert!(
        build.reporter.has_deprecation_containing("resolvable was false and is now true"),
        "only the consumable flip is exempt for runtimeElements"
    );
}

#[test]
fn deprecation_escalation_warns_once_per_axis() {
    let build = setup_build();
    let custom = build.container.create("custom", RESOLVABLE, false).unwrap();

    custom.deprecate_for_resolution(&["newClasspath"]).unwrap();
    custom.deprecate_for_resolution(&["newClasspath"]).unwrap();

    let warnings = build
        .reporter
        .deprecations()
        .iter()
        .filter(|m| m.contains("deprecated for resolution"))
        .count();
    assert_eq!(warnings, 1);
    assert!(custom.is_deprecated_for_resolution());
}

#[test]
fn copies_are_detached_and_renamed() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();

    let first = runtime.copy().unwrap();
    let second = runtime.copy().unwrap();
    assert_eq!(first.name(), "runtimeCopy");
    assert_eq!(second.name(), "runtimeCopy2");
    assert!(first.is_detached());
    assert!(
        build.container.get("runtimeCopy").is_none(),
        "copies must not join the container"
    );

    // Detached copies flip usage without warnings.
    first.set_can_be_consumed(false).unwrap();
    assert!(build.reporter.deprecations().is_empty());
}

#[test]
fn copies_deprecate_the_capabilities_the_source_lacked() {
    let build = setup_build();
    let resolvable = build.container.create("runtimeClasspath", RESOLVABLE, false).unwrap();
    let copy = resolvable.copy().unwrap();

    // Copies may do anything, but what the source could not do is flagged.
    assert!(copy.is_consumable() && copy.is_resolvable() && copy.is_declarable());
    assert!(copy.is_deprecated_for_consumption());
    assert!(!copy.is_deprecated_for_resolution());
    assert!(copy.is_deprecated_for_declaration());
}

#[test]
fn copies_of_usage_locked_configurations_stay_locked() {
    let build = setup_build();
    let locked = build.container.create("elements", RESOLVABLE, true).unwrap();
    let copy = locked.copy().unwrap();
    assert!(!copy.is_usage_mutable());
}

#[test]
fn copy_carries_content_and_copy_recursive_flattens() {
    let build = setup_build();
    let base = build.container.create("base", LEGACY, false).unwrap();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    runtime.extends_from(&[base.clone()]).unwrap();

    base.add_dependency(DeclaredDependency::new("org.example", "inherited", "1.0"))
        .unwrap();
    base.add_artifact(PublishedArtifact::new("base", "jar", "build/base.jar"))
        .unwrap();
    runtime
        .add_dependency(DeclaredDependency::new("org.example", "own", "2.0"))
        .unwrap();
    runtime.set_transitive(false).unwrap();
    runtime.set_description(Some("runtime deps".to_string()));
    runtime.set_attribute("usage", serde_json::json!("java-runtime")).unwrap();
    let mut exclude = BTreeMap::new();
    exclude.insert("group".to_string(), "org.slf4j".to_string());
    runtime.add_exclude_rule(exclude).unwrap();

    let flat = runtime.copy();
    let flat = flat.unwrap();
    assert_eq!(
        flat.dependencies().len(),
        1,
        "plain copy takes only directly declared dependencies"
    );

    let recursive = runtime.copy_recursive().unwrap();
    let names: Vec<String> = recursive
        .dependencies()
        .iter()
        .map(|d| d.module.name.clone())
        .collect();
    assert_eq!(names, vec!["own".to_string(), "inherited".to_string()]);

    // Artifacts and excludes come over flattened either way; scalar
    // settings are preserved.
    assert_eq!(recursive.artifacts().len(), 1);
    assert_eq!(recursive.exclude_rules().unwrap().len(), 1);
    assert!(!recursive.is_transitive());
    assert_eq!(recursive.description().as_deref(), Some("runtime deps"));
    assert_eq!(
        recursive.attributes().get("usage"),
        Some(&serde_json::json!("java-runtime"))
    );
    assert!(recursive.extends_from_set().is_empty(), "hierarchy is not copied");
}

#[test]
fn copies_resolve_independently_of_the_source() {
    let build = setup_build();
    let runtime = build.container.create("runtime", LEGACY, false).unwrap();
    runtime
        .add_dependency(DeclaredDependency::new("org.example", "lib", "1.0"))
        .unwrap();
    runtime.resolve().unwrap();

    let copy = runtime.copy_recursive().unwrap();
    copy.add_dependency(DeclaredDependency::new("org.example", "extra", "3.0"))
        .unwrap();
    let results = copy.resolve().unwrap();
    assert!(results
        .graph
        .as_ref()
        .unwrap()
        .contains_module("org.example", "extra", "3.0"));
    assert_eq!(build.resolver.graph_resolves.load(std::sync::atomic::Ordering::SeqCst), 2);
}
