//! Feature-flag and access-permission gating
//!
//! Whitelist-only: a module is activated only when every flag and every
//! permission it declares evaluates truthy.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::module::registry::descriptor::ModuleDescriptor;

/// Predicate source for feature flags or access permissions
pub trait FeatureSource: Send + Sync {
    fn is_enabled(&self, key: &str) -> bool;
}

/// Feature source backed by a fixed key/value map
///
/// Keys absent from the map are disabled.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatureSource {
    values: HashMap<String, bool>,
}

impl StaticFeatureSource {
    pub fn new(values: HashMap<String, bool>) -> Self {
        Self { values }
    }

    /// Source where exactly the given keys are enabled
    pub fn enabled<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            values: keys.into_iter().map(|k| (k.into(), true)).collect(),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, enabled: bool) {
        self.values.insert(key.into(), enabled);
    }
}

impl FeatureSource for StaticFeatureSource {
    fn is_enabled(&self, key: &str) -> bool {
        self.values.get(key).copied().unwrap_or(false)
    }
}

/// Outcome of evaluating a descriptor's gating condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allowed,
    Denied {
        missing_flags: Vec<String>,
        missing_permissions: Vec<String>,
    },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Evaluates descriptors against a flag source and a permission source
#[derive(Clone)]
pub struct GateEvaluator {
    flags: Arc<dyn FeatureSource>,
    permissions: Arc<dyn FeatureSource>,
}

impl GateEvaluator {
    pub fn new(flags: Arc<dyn FeatureSource>, permissions: Arc<dyn FeatureSource>) -> Self {
        Self { flags, permissions }
    }

    /// Evaluator that denies every declared flag and permission
    pub fn deny_all() -> Self {
        Self::new(
            Arc::new(StaticFeatureSource::default()),
            Arc::new(StaticFeatureSource::default()),
        )
    }

    /// Evaluator built from configuration maps
    pub fn from_maps(flags: HashMap<String, bool>, permissions: HashMap<String, bool>) -> Self {
        Self::new(
            Arc::new(StaticFeatureSource::new(flags)),
            Arc::new(StaticFeatureSource::new(permissions)),
        )
    }

    pub fn evaluate(&self, descriptor: &ModuleDescriptor) -> GateDecision {
        let missing_flags: Vec<String> = descriptor
            .feature_flags
            .iter()
            .filter(|flag| !self.flags.is_enabled(flag))
            .cloned()
            .collect();
        let missing_permissions: Vec<String> = descriptor
            .access_permissions
            .iter()
            .filter(|perm| !self.permissions.is_enabled(perm))
            .cloned()
            .collect();

        if missing_flags.is_empty() && missing_permissions.is_empty() {
            GateDecision::Allowed
        } else {
            debug!(
                "Module {} gated off (flags: {:?}, permissions: {:?})",
                descriptor.name, missing_flags, missing_permissions
            );
            GateDecision::Denied {
                missing_flags,
                missing_permissions,
            }
        }
    }
}

impl Default for GateEvaluator {
    fn default() -> Self {
        Self::deny_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ungated_module_always_allowed() {
        let gate = GateEvaluator::deny_all();
        let d = ModuleDescriptor::normal("reports", "r.js");
        assert!(gate.evaluate(&d).is_allowed());
    }

    #[test]
    fn test_all_keys_must_be_truthy() {
        let mut flags = HashMap::new();
        flags.insert("beta".to_string(), true);
        flags.insert("dark".to_string(), false);
        let gate = GateEvaluator::from_maps(flags, HashMap::new());

        let d = ModuleDescriptor::normal("billing", "b.js")
            .with_feature_flags(["beta", "dark"])
            .with_access_permissions(["billing.read"]);
        assert_eq!(
            gate.evaluate(&d),
            GateDecision::Denied {
                missing_flags: vec!["dark".to_string()],
                missing_permissions: vec!["billing.read".to_string()],
            }
        );

        let d = ModuleDescriptor::normal("billing", "b.js").with_feature_flags(["beta"]);
        assert!(gate.evaluate(&d).is_allowed());
    }

    #[test]
    fn test_custom_source() {
        struct PrefixSource;
        impl FeatureSource for PrefixSource {
            fn is_enabled(&self, key: &str) -> bool {
                key.starts_with("admin.")
            }
        }
        let gate = GateEvaluator::new(
            Arc::new(StaticFeatureSource::enabled(["beta"])),
            Arc::new(PrefixSource),
        );
        let d = ModuleDescriptor::normal("audit", "a.js").with_access_permissions(["admin.audit"]);
        assert!(gate.evaluate(&d).is_allowed());
    }
}
