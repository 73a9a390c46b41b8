//! Resolution-lifecycle engine for dependency configurations.
//!
//! A configuration is a named, mutable declaration of dependencies,
//! constraints and artifacts that can be composed into an extends-from
//! hierarchy, locked from further change, and resolved exactly once into a
//! dependency graph and then into resolved artifacts. This crate owns the
//! lifecycle: hierarchy inheritance, mutation validation and cascade,
//! the four-state resolution state machine, consistent-resolution constraint
//! synthesis, and the usage-role locking model. The actual graph solving is
//! delegated to an external [`resolver::ConfigurationResolver`].

pub mod cell;
pub mod configuration;
pub mod domain;
pub mod error;
pub mod locking;
pub mod logging;
pub mod report;
pub mod resolver;
pub mod types;

pub use configuration::{ConfigurationContainer, ConfigurationNode, LenientResolution};
pub use error::{ConfigError, ConfigResult, ErrorCode};
pub use types::{ConfigurationRole, MutationKind, ResolveState};
