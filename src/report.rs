//! Deprecation and advisory reporting.
//!
//! All user-facing deprecation warnings and role-sanity advisories are
//! emitted through a single collaborator so the engine's control flow stays
//! free of logging side effects and tests can capture what was reported.

use std::sync::Mutex;

/// Sink for deprecation warnings and advisory messages.
pub trait Reporter: Send + Sync {
    /// A deprecation: the behavior still works but is discouraged and will
    /// eventually become an error.
    fn deprecation(&self, message: &str);

    /// A non-fatal, informational advisory (e.g. a role-sanity warning).
    fn advisory(&self, message: &str);
}

/// Production reporter backed by `tracing`.
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn deprecation(&self, message: &str) {
        tracing::warn!(target: "config_graph::deprecation", "{}", message);
    }

    fn advisory(&self, message: &str) {
        tracing::info!(target: "config_graph::advisory", "{}", message);
    }
}

/// Reporter that records messages for inspection in tests.
#[derive(Default)]
pub struct RecordingReporter {
    deprecations: Mutex<Vec<String>>,
    advisories: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deprecations(&self) -> Vec<String> {
        self.deprecations.lock().unwrap().clone()
    }

    pub fn advisories(&self) -> Vec<String> {
        self.advisories.lock().unwrap().clone()
    }

    pub fn has_deprecation_containing(&self, needle: &str) -> bool {
        self.deprecations
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.contains(needle))
    }
}

impl Reporter for RecordingReporter {
    fn deprecation(&self, message: &str) {
        self.deprecations.lock().unwrap().push(message.to_string());
    }

    fn advisory(&self, message: &str) {
        self.advisories.lock().unwrap().push(message.to_string());
    }
}
