//! Module manifest parsing
//!
//! Handles parsing the module manifest (server-provided or local declaration)
//! into descriptor entries.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::module::traits::ModuleError;

/// When a module is activated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadType {
    /// Loaded sequentially before first render; failure aborts startup
    Init,
    /// Loaded after first render in dependency levels; failure is isolated
    Normal,
}

/// One manifest entry as published by the server or declared locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifestEntry {
    /// Module name (unique key)
    pub name: String,
    /// Module version (semantic versioning)
    #[serde(default)]
    pub version: Option<String>,
    /// INIT or NORMAL
    pub load_type: LoadType,
    /// Lower loads earlier; ties keep declaration order
    #[serde(default)]
    pub load_priority: Option<i32>,
    /// Remote entry URL, empty for locally bundled modules
    #[serde(default)]
    pub remote_entry: String,
    /// Modules that must be loaded first
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Flags that must all be enabled
    #[serde(default)]
    pub feature_flags: Vec<String>,
    /// Permissions that must all be granted
    #[serde(default)]
    pub access_permissions: Vec<String>,
}

/// Module manifest: the ordered list of declared modules
///
/// Accepts either `{"modules": [...]}` or a bare array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleManifest {
    #[serde(default)]
    pub modules: Vec<ModuleManifestEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    Wrapped(ModuleManifest),
    Bare(Vec<ModuleManifestEntry>),
}

impl From<ManifestDocument> for ModuleManifest {
    fn from(doc: ManifestDocument) -> Self {
        match doc {
            ManifestDocument::Wrapped(manifest) => manifest,
            ManifestDocument::Bare(modules) => ModuleManifest { modules },
        }
    }
}

impl ModuleManifest {
    /// Parse a JSON manifest
    pub fn from_json_str(contents: &str) -> Result<Self, ModuleError> {
        let doc: ManifestDocument = serde_json::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to parse manifest JSON: {}", e))
        })?;
        Ok(doc.into())
    }

    /// Parse a TOML manifest (`[[modules]]` tables)
    pub fn from_toml_str(contents: &str) -> Result<Self, ModuleError> {
        toml::from_str(contents).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to parse manifest TOML: {}", e))
        })
    }

    /// Load manifest from file, choosing the format by extension
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ModuleError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to read manifest file: {}", e))
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            _ => Self::from_json_str(&contents),
        }
    }

    /// Fetch a server-provided manifest
    #[cfg(feature = "remote-manifest")]
    pub async fn from_url(url: &str, timeout: std::time::Duration) -> Result<Self, ModuleError> {
        tracing::info!("Fetching module manifest from {}", url);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModuleError::OperationError(format!("HTTP client error: {}", e)))?;

        let response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                ModuleError::InvalidManifest(format!("Failed to fetch manifest {}: {}", url, e))
            })?;

        let body = response.text().await.map_err(|e| {
            ModuleError::InvalidManifest(format!("Failed to read manifest body: {}", e))
        })?;

        Self::from_json_str(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wrapped_json() {
        let manifest = ModuleManifest::from_json_str(
            r#"{
                "modules": [
                    { "name": "core", "loadType": "init", "loadPriority": 1, "remoteEntry": "" },
                    {
                        "name": "billing",
                        "version": "1.2.0",
                        "loadType": "normal",
                        "remoteEntry": "https://cdn.example.com/billing/remoteEntry.js",
                        "dependencies": ["core"],
                        "featureFlags": ["billing"],
                        "accessPermissions": ["billing.read"]
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.modules.len(), 2);
        assert_eq!(manifest.modules[0].load_type, LoadType::Init);
        assert_eq!(manifest.modules[0].load_priority, Some(1));
        let billing = &manifest.modules[1];
        assert_eq!(billing.load_priority, None);
        assert_eq!(billing.dependencies, vec!["core"]);
        assert_eq!(billing.feature_flags, vec!["billing"]);
        assert_eq!(billing.access_permissions, vec!["billing.read"]);
    }

    #[test]
    fn test_parse_bare_array() {
        let manifest = ModuleManifest::from_json_str(
            r#"[{ "name": "reports", "loadType": "normal", "remoteEntry": "r.js" }]"#,
        )
        .unwrap();
        assert_eq!(manifest.modules[0].name, "reports");
    }

    #[test]
    fn test_unknown_load_type_rejected() {
        let err = ModuleManifest::from_json_str(
            r#"[{ "name": "x", "loadType": "lazy", "remoteEntry": "" }]"#,
        )
        .unwrap_err();
        assert!(matches!(err, ModuleError::InvalidManifest(_)));
    }

    #[test]
    fn test_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.toml");
        std::fs::write(
            &path,
            r#"
[[modules]]
name = "shell"
loadType = "init"

[[modules]]
name = "settings"
loadType = "normal"
remoteEntry = "https://cdn.example.com/settings/remoteEntry.js"
dependencies = ["shell"]
"#,
        )
        .unwrap();

        let manifest = ModuleManifest::from_file(&path).unwrap();
        assert_eq!(manifest.modules.len(), 2);
        assert!(manifest.modules[0].remote_entry.is_empty());
        assert_eq!(manifest.modules[1].dependencies, vec!["shell"]);
    }
}
