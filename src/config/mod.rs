//! Configuration management for the module orchestrator
//!
//! Handles configuration loading (JSON or TOML), environment overrides and
//! validation.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

use crate::module::loader::shared_scope::{SharedScopeNegotiator, SharedVersionInfo};
use crate::module::loader::LoadOptions;
use crate::module::registry::ModuleManifest;
use crate::module::security::GateEvaluator;
use crate::utils::{env_int, env_opt, RetryConfig};

/// Version label under which host-configured shared singletons are offered
const HOST_SHARED_VERSION: &str = "host";

/// Remote container loader configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Total attempts per load
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Per-attempt timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Fixed delay between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retries() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_ms: default_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl LoaderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.retries, self.retry_delay())
    }
}

/// Where the module manifest comes from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSourceConfig {
    /// Local manifest file (JSON or TOML)
    #[serde(default)]
    pub path: Option<String>,

    /// Server-provided manifest endpoint (requires `remote-manifest`)
    #[serde(default)]
    pub url: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by RUST_LOG
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires `json-logging`)
    #[serde(default)]
    pub json_format: bool,
}

/// Orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Remote container loader settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Module manifest source
    #[serde(default)]
    pub manifest: Option<ManifestSourceConfig>,

    /// Feature flag values consulted when gating modules
    #[serde(default)]
    pub feature_flags: HashMap<String, bool>,

    /// Access permission values consulted when gating modules
    #[serde(default)]
    pub access_permissions: HashMap<String, bool>,

    /// Singletons the host offers in every shared scope
    #[serde(default)]
    pub shared: BTreeMap<String, SharedVersionInfo>,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

impl OrchestratorConfig {
    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OrchestratorConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OrchestratorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, choosing the format by file extension
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            other => Err(anyhow::anyhow!(
                "Unsupported config file extension {:?} (expected .json or .toml)",
                other
            )),
        }
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `MFE_*` environment overrides
    ///
    /// - `MFE_LOADER_RETRIES`
    /// - `MFE_LOADER_TIMEOUT_MS`
    /// - `MFE_LOADER_RETRY_DELAY_MS`
    /// - `MFE_LOG` (logging filter)
    pub fn apply_env_overrides(&mut self) {
        if let Some(retries) = env_int("MFE_LOADER_RETRIES") {
            self.loader.retries = retries;
        }
        if let Some(timeout_ms) = env_int("MFE_LOADER_TIMEOUT_MS") {
            self.loader.timeout_ms = timeout_ms;
        }
        if let Some(delay_ms) = env_int("MFE_LOADER_RETRY_DELAY_MS") {
            self.loader.retry_delay_ms = delay_ms;
        }
        if let Some(filter) = env_opt("MFE_LOG") {
            self.logging.get_or_insert_with(LoggingConfig::default).filter = Some(filter);
        }
    }

    /// Gate built from the configured flag and permission values
    pub fn gate_evaluator(&self) -> GateEvaluator {
        GateEvaluator::from_maps(self.feature_flags.clone(), self.access_permissions.clone())
    }

    /// Negotiator offering the host-configured shared singletons
    pub fn shared_negotiator(&self) -> SharedScopeNegotiator {
        SharedScopeNegotiator::with_host_shared(self.shared.clone(), HOST_SHARED_VERSION)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions::from(&self.loader)
    }

    /// Load the manifest named by the `manifest` section
    pub async fn load_manifest(&self) -> anyhow::Result<ModuleManifest> {
        let source = self
            .manifest
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("no manifest source configured"))?;

        if let Some(ref path) = source.path {
            return Ok(ModuleManifest::from_file(path)?);
        }

        match source.url {
            #[cfg(feature = "remote-manifest")]
            Some(ref url) => Ok(ModuleManifest::from_url(url, self.loader.timeout()).await?),
            #[cfg(not(feature = "remote-manifest"))]
            Some(ref url) => Err(anyhow::anyhow!(
                "manifest url {} requires the remote-manifest feature",
                url
            )),
            None => Err(anyhow::anyhow!("manifest must name a path or a url")),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.loader.retries == 0 {
            return Err(anyhow::anyhow!("loader.retries must be greater than 0"));
        }

        if self.loader.timeout_ms == 0 {
            return Err(anyhow::anyhow!("loader.timeout_ms must be greater than 0"));
        }

        if let Some(ref manifest) = self.manifest {
            match (&manifest.path, &manifest.url) {
                (Some(_), Some(_)) => {
                    return Err(anyhow::anyhow!(
                        "manifest must name either a path or a url, not both"
                    ));
                }
                (None, None) => {
                    return Err(anyhow::anyhow!("manifest must name a path or a url"));
                }
                _ => {}
            }
        }

        Ok(())
    }
}
