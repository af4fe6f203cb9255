//! Module descriptors
//!
//! Static metadata per module, derived from validated manifest entries.

use serde::Serialize;

use crate::module::registry::manifest::{LoadType, ModuleManifestEntry};

/// Scope identifier a script-tag container registers itself under
///
/// `module_` followed by the module name with every `-` replaced by `_`.
pub fn scope_name(module_name: &str) -> String {
    format!("module_{}", module_name.replace('-', "_"))
}

/// Static metadata describing one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: Option<String>,
    pub load_type: LoadType,
    pub load_priority: i32,
    /// Empty for locally bundled modules
    pub remote_entry: String,
    pub dependencies: Vec<String>,
    pub feature_flags: Vec<String>,
    pub access_permissions: Vec<String>,
}

impl ModuleDescriptor {
    /// Descriptor for an INIT module
    pub fn init(name: impl Into<String>, remote_entry: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            version: None,
            load_type: LoadType::Init,
            load_priority: priority,
            remote_entry: remote_entry.into(),
            dependencies: Vec::new(),
            feature_flags: Vec::new(),
            access_permissions: Vec::new(),
        }
    }

    /// Descriptor for a NORMAL module
    pub fn normal(name: impl Into<String>, remote_entry: impl Into<String>) -> Self {
        Self {
            load_type: LoadType::Normal,
            ..Self::init(name, remote_entry, 0)
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.load_priority = priority;
        self
    }

    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dedup(dependencies.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_feature_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.feature_flags = dedup(flags.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_access_permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access_permissions = dedup(permissions.into_iter().map(Into::into));
        self
    }

    /// Whether the module ships inside the host bundle
    pub fn is_local(&self) -> bool {
        self.remote_entry.trim().is_empty()
    }

    /// Whether activation depends on flags or permissions
    pub fn is_gated(&self) -> bool {
        !self.feature_flags.is_empty() || !self.access_permissions.is_empty()
    }

    pub fn scope_name(&self) -> String {
        scope_name(&self.name)
    }
}

/// Preserve first occurrence order, drop repeats
fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

impl From<ModuleManifestEntry> for ModuleDescriptor {
    fn from(entry: ModuleManifestEntry) -> Self {
        Self {
            name: entry.name,
            version: entry.version,
            load_type: entry.load_type,
            load_priority: entry.load_priority.unwrap_or(0),
            remote_entry: entry.remote_entry,
            dependencies: dedup(entry.dependencies.into_iter()),
            feature_flags: dedup(entry.feature_flags.into_iter()),
            access_permissions: dedup(entry.access_permissions.into_iter()),
        }
    }
}
