//! Shared-scope negotiation
//!
//! Builds the scope handed to a container's `init` so that singleton
//! dependencies are shared across modules instead of bundled per module.
//! Negotiation is advisory: it never fails a load.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One provided version of a shared dependency
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedVersionInfo {
    /// Build (module or host) that provided this version
    #[serde(default)]
    pub from: Option<String>,
    /// Whether the provider bundles it eagerly
    #[serde(default)]
    pub eager: bool,
    /// Whether the version has already been instantiated
    #[serde(default)]
    pub loaded: bool,
    /// Single-instance requirement
    #[serde(default)]
    pub singleton: bool,
}

/// All provided versions of one shared dependency, keyed by version string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDependency {
    pub versions: BTreeMap<String, SharedVersionInfo>,
}

/// Flat mapping from dependency name to its shared-version descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SharedScope {
    dependencies: BTreeMap<String, SharedDependency>,
}

impl SharedScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn get(&self, name: &str) -> Option<&SharedDependency> {
        self.dependencies.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.dependencies.keys().map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, dependency: SharedDependency) {
        self.dependencies.insert(name.into(), dependency);
    }

    /// Add entries for names this scope does not already provide
    pub fn merge_missing(&mut self, other: &SharedScope) {
        for (name, dependency) in &other.dependencies {
            self.dependencies
                .entry(name.clone())
                .or_insert_with(|| dependency.clone());
        }
    }
}

/// Builds a normalized [`SharedScope`] from the federation runtime's globals
#[derive(Debug, Clone, Default)]
pub struct SharedScopeNegotiator {
    /// Singletons the host provides regardless of runtime globals
    host_provided: SharedScope,
}

impl SharedScopeNegotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negotiator that also offers host-configured shared entries
    pub fn with_host_shared(shared: BTreeMap<String, SharedVersionInfo>, version: &str) -> Self {
        let mut host_provided = SharedScope::new();
        for (name, info) in shared {
            let mut dependency = SharedDependency::default();
            dependency.versions.insert(version.to_string(), info);
            host_provided.insert(name, dependency);
        }
        Self { host_provided }
    }

    /// Normalize the runtime's shared-state global into a flat scope
    ///
    /// Accepts the nested `{"default": {...}}` convention or a flat root object.
    /// Anything else yields the host-provided entries alone (possibly empty).
    pub fn negotiate(&self, shared_global: Option<&Value>) -> SharedScope {
        let mut scope = match shared_global.and_then(Self::scope_root) {
            Some(root) => Self::parse_entries(root),
            None => {
                debug!("No federation shared scope present, using empty scope");
                SharedScope::new()
            }
        };
        scope.merge_missing(&self.host_provided);
        debug!("Negotiated shared scope with {} dependencies", scope.len());
        scope
    }

    fn scope_root(global: &Value) -> Option<&serde_json::Map<String, Value>> {
        let root = global.as_object()?;
        match root.get("default").and_then(Value::as_object) {
            Some(nested) => Some(nested),
            None => Some(root),
        }
    }

    fn parse_entries(root: &serde_json::Map<String, Value>) -> SharedScope {
        let mut scope = SharedScope::new();
        for (name, versions) in root {
            let Some(versions) = versions.as_object() else {
                debug!("Skipping shared entry {}: not an object", name);
                continue;
            };
            let mut dependency = SharedDependency::default();
            for (version, info) in versions {
                match serde_json::from_value::<SharedVersionInfo>(info.clone()) {
                    Ok(info) => {
                        dependency.versions.insert(version.clone(), info);
                    }
                    Err(e) => debug!("Skipping shared version {}@{}: {}", name, version, e),
                }
            }
            if !dependency.versions.is_empty() {
                scope.insert(name.clone(), dependency);
            }
        }
        scope
    }
}
