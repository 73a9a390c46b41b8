//! Capability flags, their deprecation shadows, and the usage lock.

use crate::error::{ConfigError, ConfigResult};
use crate::types::{MutationKind, LEGACY};

use super::node::ConfigurationNode;

impl ConfigurationNode {
    pub fn is_consumable(&self) -> bool {
        self.usage.lock().unwrap().consumable
    }

    pub fn is_resolvable(&self) -> bool {
        self.usage.lock().unwrap().resolvable
    }

    pub fn is_declarable(&self) -> bool {
        self.usage.lock().unwrap().declarable
    }

    pub fn is_deprecated_for_consumption(&self) -> bool {
        self.usage.lock().unwrap().consumption_deprecated
    }

    pub fn is_deprecated_for_resolution(&self) -> bool {
        self.usage.lock().unwrap().resolution_deprecated
    }

    pub fn is_deprecated_for_declaration(&self) -> bool {
        self.usage.lock().unwrap().declaration_deprecated
    }

    pub fn is_usage_mutable(&self) -> bool {
        self.usage.lock().unwrap().usage_can_be_mutated
    }

    /// Permanently forbid flipping the capability flags. One-way.
    pub fn prevent_usage_mutation(&self) {
        self.usage.lock().unwrap().usage_can_be_mutated = false;
    }

    pub(crate) fn assert_usage_is_mutable(&self) -> ConfigResult<()> {
        if self.is_usage_mutable() {
            return Ok(());
        }
        match self.role_at_creation() {
            Some(role) if *role != LEGACY => Err(ConfigError::usage_locked(
                &self.display_name(),
                role.name,
                &role.describe_usage(),
            )),
            _ => Err(ConfigError::usage_locked_legacy(&self.display_name())),
        }
    }

    pub(crate) fn assert_is_resolvable(&self) -> ConfigResult<()> {
        if self.is_resolvable() {
            Ok(())
        } else {
            Err(ConfigError::not_resolvable(self.name()))
        }
    }

    pub(crate) fn assert_is_declarable(&self) -> ConfigResult<()> {
        if self.is_declarable() {
            Ok(())
        } else {
            Err(ConfigError::not_declarable(self.name()))
        }
    }

    pub fn assert_is_consumable(&self) -> ConfigResult<()> {
        if self.is_consumable() {
            Ok(())
        } else {
            Err(ConfigError::not_consumable(self.name()))
        }
    }

    // Flag flips. A no-op flip skips the mutation guard entirely.

    pub fn set_can_be_consumed(&self, allowed: bool) -> ConfigResult<()> {
        if self.usage.lock().unwrap().consumable == allowed {
            return Ok(());
        }
        self.validate_mutation(MutationKind::Usage)?;
        self.usage.lock().unwrap().consumable = allowed;
        self.maybe_warn_on_changing_usage("consumable", allowed);
        Ok(())
    }

    pub fn set_can_be_resolved(&self, allowed: bool) -> ConfigResult<()> {
        if self.usage.lock().unwrap().resolvable == allowed {
            return Ok(());
        }
        self.validate_mutation(MutationKind::Usage)?;
        self.usage.lock().unwrap().resolvable = allowed;
        self.maybe_warn_on_changing_usage("resolvable", allowed);
        Ok(())
    }

    pub fn set_can_be_declared(&self, allowed: bool) -> ConfigResult<()> {
        if self.usage.lock().unwrap().declarable == allowed {
            return Ok(());
        }
        self.validate_mutation(MutationKind::Usage)?;
        self.usage.lock().unwrap().declarable = allowed;
        self.maybe_warn_on_changing_usage("declarable against", allowed);
        Ok(())
    }

    // Deprecation escalation. Idempotent per axis: the warning fires only
    // on the first call.

    pub fn deprecate_for_consumption(&self, alternatives: &[&str]) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Usage)?;
        let already = {
            let mut usage = self.usage.lock().unwrap();
            usage.consumption_alternatives =
                alternatives.iter().map(|s| s.to_string()).collect();
            std::mem::replace(&mut usage.consumption_deprecated, true)
        };
        if !already {
            self.maybe_warn_on_changing_usage("deprecated for consumption", true);
        }
        Ok(())
    }

    pub fn deprecate_for_resolution(&self, alternatives: &[&str]) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Usage)?;
        let already = {
            let mut usage = self.usage.lock().unwrap();
            usage.resolution_alternatives =
                alternatives.iter().map(|s| s.to_string()).collect();
            std::mem::replace(&mut usage.resolution_deprecated, true)
        };
        if !already {
            self.maybe_warn_on_changing_usage("deprecated for resolution", true);
        }
        Ok(())
    }

    pub fn deprecate_for_declaration_against(&self, alternatives: &[&str]) -> ConfigResult<()> {
        self.validate_mutation(MutationKind::Usage)?;
        let already = {
            let mut usage = self.usage.lock().unwrap();
            usage.declaration_alternatives =
                alternatives.iter().map(|s| s.to_string()).collect();
            std::mem::replace(&mut usage.declaration_deprecated, true)
        };
        if !already {
            self.maybe_warn_on_changing_usage("deprecated for declaration against", true);
        }
        Ok(())
    }

    /// Emitted when resolving a configuration whose resolution was
    /// deprecated in favor of alternatives.
    pub(crate) fn warn_if_deprecated_for_resolving(&self) {
        let (deprecated, alternatives) = {
            let usage = self.usage.lock().unwrap();
            (usage.resolution_deprecated, usage.resolution_alternatives.clone())
        };
        if !deprecated {
            return;
        }
        let mut message = format!(
            "The {} configuration has been deprecated for resolution. This will fail with an error in a future release.",
            self.name()
        );
        if !alternatives.is_empty() {
            message.push_str(&format!(
                " Please resolve the {} configuration instead.",
                alternatives.join(" or ")
            ));
        }
        self.services.reporter.deprecation(&message);
    }

    fn maybe_warn_on_changing_usage(&self, usage: &str, current: bool) {
        if self.is_special_case_of_changing_usage(usage, current) {
            return;
        }
        self.services.reporter.deprecation(&format!(
            "Allowed usage is changing for {}, {} was {} and is now {}. \
             Ideally, usage should be fixed upon creation.",
            self.display_name(),
            usage,
            !current,
            current
        ));
    }

    /// Usage changes that are tolerated silently. The list is deliberately
    /// narrow and name-based; note that the `runtimeElements` carve-out
    /// only covers disabling consumability.
    fn is_special_case_of_changing_usage(&self, usage: &str, current: bool) -> bool {
        let initializing = self.role_at_creation().is_none();
        let legacy = self
            .role_at_creation()
            .map(|role| *role == LEGACY)
            .unwrap_or(false);
        let permitted_producer_change = self.name() == "apiElements"
            || (self.name() == "runtimeElements" && usage == "consumable" && !current);
        initializing || self.is_detached() || legacy || permitted_producer_change
    }
}
