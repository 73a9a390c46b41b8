//! Structured error types for the configuration lifecycle engine.

use serde::Serialize;
use std::fmt;

use crate::types::{MutationKind, ResolveState};

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Capability errors
    RoleViolation,
    UsageLocked,

    // Temporal errors (something was observed or resolved first)
    MutationAfterLock,
    DoubleResolution,

    // Graph shape errors
    CyclicHierarchy,
    CyclicConsistentResolution,

    // Declaration errors
    InvalidNotation,
    AlreadyExists,
    AttributeUniquenessViolation,

    // Resolution errors
    ResolutionFailed,
    UnmanagedThread,
    InvalidState,

    // Collaborator errors
    LockStateError,
    InternalError,
}

/// Structured error for configuration operations.
#[derive(Debug, Serialize)]
pub struct ConfigError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ConfigError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors

    pub fn not_resolvable(name: &str) -> Self {
        Self::new(
            ErrorCode::RoleViolation,
            format!(
                "Resolving dependency configuration '{}' is not allowed as it is defined as 'canBeResolved=false'.\n\
                 Instead, a resolvable ('canBeResolved=true') dependency configuration that extends '{}' should be resolved.",
                name, name
            ),
        )
    }

    pub fn not_declarable(name: &str) -> Self {
        Self::new(
            ErrorCode::RoleViolation,
            format!(
                "Declaring dependencies for configuration '{}' is not allowed as it is defined as 'canBeDeclared=false'.",
                name
            ),
        )
    }

    pub fn not_consumable(name: &str) -> Self {
        Self::new(
            ErrorCode::RoleViolation,
            format!(
                "Selecting configuration '{}' is not allowed as it is defined as 'canBeConsumed=false'.",
                name
            ),
        )
    }

    pub fn usage_locked(display_name: &str, role_name: &str, usage_description: &str) -> Self {
        Self::new(
            ErrorCode::UsageLocked,
            format!(
                "Cannot change the allowed usage of {}, as it was locked upon creation to the role: '{}'.\n\
                 This role permits the following usage:\n{}\n\
                 Ideally, each configuration should be used for a single purpose.",
                display_name, role_name, usage_description
            ),
        )
    }

    pub fn usage_locked_legacy(display_name: &str) -> Self {
        Self::new(
            ErrorCode::UsageLocked,
            format!("Cannot change the allowed usage of {}, as it has been locked.", display_name),
        )
    }

    pub fn mutation_after_resolve(kind: MutationKind, display_name: &str) -> Self {
        Self::new(
            ErrorCode::MutationAfterLock,
            format!(
                "Cannot change {} of {} after it has been resolved ({}).",
                kind,
                display_name,
                ResolveState::ArtifactsResolved
            ),
        )
    }

    pub fn mutation_after_build_dependencies(kind: MutationKind, display_name: &str) -> Self {
        Self::new(
            ErrorCode::MutationAfterLock,
            format!(
                "Cannot change {} of {} after task dependencies have been resolved ({}).",
                kind,
                display_name,
                ResolveState::GraphResolved
            ),
        )
    }

    pub fn mutation_after_observation(
        kind: MutationKind,
        display_name: &str,
        observed: ResolveState,
        inside_before_resolve: bool,
    ) -> Self {
        let hint = if inside_before_resolve {
            " Use 'defaultDependencies' instead of 'beforeResolve' to specify default dependencies for a configuration."
        } else {
            ""
        };
        Self::new(
            ErrorCode::MutationAfterLock,
            format!(
                "Cannot change {} of {} after it has been included in dependency resolution ({}).{}",
                kind, display_name, observed, hint
            ),
        )
    }

    pub fn parent_mutation_after_resolve(kind: MutationKind, display_name: &str) -> Self {
        Self::new(
            ErrorCode::MutationAfterLock,
            format!(
                "Cannot change {} of parent of {} after it has been resolved ({}).",
                kind,
                display_name,
                ResolveState::ArtifactsResolved
            ),
        )
    }

    pub fn parent_mutation_after_build_dependencies(kind: MutationKind, display_name: &str) -> Self {
        Self::new(
            ErrorCode::MutationAfterLock,
            format!(
                "Cannot change {} of parent of {} after task dependencies have been resolved ({}).",
                kind,
                display_name,
                ResolveState::GraphResolved
            ),
        )
    }

    pub fn attributes_locked(display_name: &str) -> Self {
        Self::new(
            ErrorCode::MutationAfterLock,
            format!("Cannot change attributes of {} after it has been locked for mutation.", display_name),
        )
    }

    pub fn double_resolution(display_name: &str) -> Self {
        Self::new(
            ErrorCode::DoubleResolution,
            format!("Attempted to resolve {} that has been resolved previously.", display_name),
        )
    }

    pub fn cyclic_hierarchy(display_name: &str, parent_name: &str, chain: &str) -> Self {
        Self::new(
            ErrorCode::CyclicHierarchy,
            format!(
                "Cyclic extendsFrom from {} and {} is not allowed. See existing hierarchy: {}",
                display_name, parent_name, chain
            ),
        )
    }

    pub fn cyclic_consistent_resolution(chain: &str) -> Self {
        Self::new(
            ErrorCode::CyclicConsistentResolution,
            format!("Cycle detected in consistent resolution sources: {}", chain),
        )
    }

    pub fn unresolvable_consistency_source(source_name: &str, display_name: &str) -> Self {
        Self::new(
            ErrorCode::RoleViolation,
            format!(
                "You can't use {} as a consistent resolution source for {} because it isn't a resolvable configuration.",
                source_name, display_name
            ),
        )
    }

    pub fn invalid_exclude_rule(key: &str) -> Self {
        Self::new(
            ErrorCode::InvalidNotation,
            format!("Invalid exclude rule key '{}': only 'group' and 'module' are allowed", key),
        )
    }

    pub fn empty_exclude_rule() -> Self {
        Self::new(
            ErrorCode::InvalidNotation,
            "An exclude rule must specify a 'group', a 'module', or both",
        )
    }

    pub fn already_exists(name: &str) -> Self {
        Self::new(
            ErrorCode::AlreadyExists,
            format!("Cannot add a configuration with name '{}' as a configuration with that name already exists.", name),
        )
    }

    pub fn duplicate_attributes(display_name: &str, collisions: &[String]) -> Self {
        Self::new(
            ErrorCode::AttributeUniquenessViolation,
            format!(
                "Consumable configurations with identical capabilities within a project (other than the default configuration) \
                 must have unique attributes, but {} and [{}] contain identical attribute sets.",
                display_name,
                collisions.join(", ")
            ),
        )
        .with_details("Consider adding an additional attribute to one of the configurations to disambiguate them.")
    }

    pub fn resolution(display_name: &str, cause: &anyhow::Error, hint: Option<&str>) -> Self {
        let err = Self::new(
            ErrorCode::ResolutionFailed,
            format!("Could not resolve all dependencies for {}: {:#}", display_name, cause),
        );
        match hint {
            Some(hint) => err.with_details(hint),
            None => err,
        }
    }

    pub fn unmanaged_thread(identity_path: &str) -> Self {
        Self::new(
            ErrorCode::UnmanagedThread,
            format!("The configuration {} was resolved from a thread not managed by the build.", identity_path),
        )
    }

    pub fn artifacts_before_graph() -> Self {
        Self::new(
            ErrorCode::InvalidState,
            "Cannot resolve artifacts before graph has been resolved.",
        )
    }

    pub fn results_not_available() -> Self {
        Self::new(
            ErrorCode::InvalidState,
            "Cannot query results until resolution has happened.",
        )
    }

    pub fn lock_state(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::LockStateError, err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ConfigError {}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ConfigError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ConfigError>() {
            Ok(config_err) => config_err,
            Err(err) => ConfigError::internal(format!("{:#}", err)),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
