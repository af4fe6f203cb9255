//! Module system traits and interfaces
//!
//! Defines the contracts between the orchestrator, the remote containers it
//! loads, and the host that embeds it.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::module::loader::shared_scope::SharedScope;

/// Exposed key every remote container publishes its module configuration under
pub const EXPOSED_MODULE_KEY: &str = "./Module";

/// Module lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Declared in the registry, not yet requested
    Pending,
    /// Remote container is being fetched and initialized
    Loading,
    /// Module configuration resolved, init hook not yet completed
    Preloaded,
    /// Init hook completed
    Loaded,
    /// Load or init failed, or a hard dependency is unavailable
    Failed,
}

impl ModuleStatus {
    /// Whether the status ends the current load attempt
    pub fn is_terminal(&self) -> bool {
        matches!(self, ModuleStatus::Loaded | ModuleStatus::Failed)
    }
}

impl fmt::Display for ModuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleStatus::Pending => "pending",
            ModuleStatus::Loading => "loading",
            ModuleStatus::Preloaded => "preloaded",
            ModuleStatus::Loaded => "loaded",
            ModuleStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Route exposed by a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDescriptor {
    /// Route path (e.g. `/billing/invoices`)
    pub path: String,
    /// Optional route name used for menu entries
    #[serde(default)]
    pub name: Option<String>,
}

impl RouteDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: None,
        }
    }

    pub fn named(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: Some(name.into()),
        }
    }
}

/// Translation bundle registered by a module for one locale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationBundle {
    pub locale: String,
    pub namespace: String,
    pub entries: BTreeMap<String, String>,
}

/// Resolved module configuration
///
/// This is what a remote container's exposed factory ultimately yields, and what
/// locally bundled modules hand to the scheduler directly.
#[async_trait]
pub trait ModuleDefinition: Send + Sync {
    /// Routes this module contributes to the host router
    fn routes(&self) -> Vec<RouteDescriptor> {
        Vec::new()
    }

    /// Translation bundles this module registers
    fn translations(&self) -> Vec<TranslationBundle> {
        Vec::new()
    }

    /// Init hook, run once after routes and translations are bound
    async fn on_module_init(&self, _context: &BootstrapContext) -> Result<(), ModuleError> {
        Ok(())
    }
}

/// Exports produced by invoking an exposed factory
#[derive(Clone)]
pub enum ModuleExports {
    /// Exports carry a `default` export
    Default(Arc<dyn ModuleDefinition>),
    /// No `default` export; the export object itself is the configuration
    Namespace(Arc<dyn ModuleDefinition>),
}

impl ModuleExports {
    /// Default export, or the export object itself when there is none
    pub fn into_definition(self) -> Arc<dyn ModuleDefinition> {
        match self {
            ModuleExports::Default(def) | ModuleExports::Namespace(def) => def,
        }
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleExports::Default(_) => f.write_str("ModuleExports::Default(..)"),
            ModuleExports::Namespace(_) => f.write_str("ModuleExports::Namespace(..)"),
        }
    }
}

/// Factory returned by [`RemoteContainer::get`]
pub type ModuleFactory = Arc<dyn Fn() -> ModuleExports + Send + Sync>;

/// Runtime handle a remote module's build artifact exposes
#[async_trait]
pub trait RemoteContainer: Send + Sync {
    /// Register the container into a shared-dependency scope
    ///
    /// Containers report a second call with an "already initialized" error; the
    /// loader treats that as success.
    async fn init(&self, share_scope: &SharedScope) -> Result<(), ModuleError>;

    /// Resolve an exposed entry point to a factory
    async fn get(&self, exposed: &str) -> Result<ModuleFactory, ModuleError>;
}

/// Opaque dependency-injection registry owned by the host
pub trait ServiceRegistry: Send + Sync {
    fn bind(&self, token: &str, value: Arc<dyn Any + Send + Sync>);

    fn get(&self, token: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

/// Simple in-memory [`ServiceRegistry`]
#[derive(Default)]
pub struct InMemoryServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl InMemoryServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServiceRegistry for InMemoryServiceRegistry {
    fn bind(&self, token: &str, value: Arc<dyn Any + Send + Sync>) {
        let mut services = self
            .services
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        services.insert(token.to_string(), value);
    }

    fn get(&self, token: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        let services = self
            .services
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        services.get(token).cloned()
    }
}

/// Route bound by a module, as registered with the host router
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoundRoute {
    pub module: String,
    pub route: RouteDescriptor,
}

/// Routes registered by activated modules
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<Vec<BoundRoute>>,
}

impl RouteTable {
    /// Replace the routes registered by `module`
    pub fn bind(&self, module: &str, routes: Vec<RouteDescriptor>) {
        let mut table = self
            .routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.retain(|bound| bound.module != module);
        table.extend(routes.into_iter().map(|route| BoundRoute {
            module: module.to_string(),
            route,
        }));
    }

    pub fn routes(&self) -> Vec<BoundRoute> {
        self.routes
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Remove the routes registered by `module`, returning how many were dropped
    pub fn unbind(&self, module: &str) -> usize {
        let mut table = self
            .routes
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = table.len();
        table.retain(|bound| bound.module != module);
        before - table.len()
    }

    /// Routes registered by one module
    pub fn routes_for(&self, module: &str) -> Vec<RouteDescriptor> {
        self.routes()
            .into_iter()
            .filter(|bound| bound.module == module)
            .map(|bound| bound.route)
            .collect()
    }
}

/// Translations registered by activated modules
///
/// Bundles are kept per module so a module's contribution can be withdrawn.
/// On a key conflict the most recent registration wins.
#[derive(Debug, Default)]
pub struct TranslationCatalog {
    bundles: RwLock<Vec<(String, TranslationBundle)>>,
}

impl TranslationCatalog {
    pub fn register(&self, module: &str, bundles: Vec<TranslationBundle>) {
        let mut catalog = self
            .bundles
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        catalog.retain(|(owner, _)| owner != module);
        catalog.extend(bundles.into_iter().map(|bundle| (module.to_string(), bundle)));
    }

    /// Drop every bundle registered by `module`
    pub fn unregister(&self, module: &str) -> usize {
        let mut catalog = self
            .bundles
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = catalog.len();
        catalog.retain(|(owner, _)| owner != module);
        before - catalog.len()
    }

    pub fn lookup(&self, locale: &str, namespace: &str, key: &str) -> Option<String> {
        let catalog = self
            .bundles
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        catalog
            .iter()
            .rev()
            .filter(|(_, bundle)| bundle.locale == locale && bundle.namespace == namespace)
            .find_map(|(_, bundle)| bundle.entries.get(key).cloned())
    }
}

/// Context handed to every module's init hook
#[derive(Clone)]
pub struct BootstrapContext {
    services: Arc<dyn ServiceRegistry>,
    routes: Arc<RouteTable>,
    translations: Arc<TranslationCatalog>,
}

impl BootstrapContext {
    pub fn new(services: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            services,
            routes: Arc::new(RouteTable::default()),
            translations: Arc::new(TranslationCatalog::default()),
        }
    }

    pub fn services(&self) -> &Arc<dyn ServiceRegistry> {
        &self.services
    }

    pub fn routes(&self) -> &Arc<RouteTable> {
        &self.routes
    }

    pub fn translations(&self) -> &Arc<TranslationCatalog> {
        &self.translations
    }
}

impl Default for BootstrapContext {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryServiceRegistry::new()))
    }
}

/// Module system errors
///
/// `Clone` so that every caller joined on one shared load observes the
/// identical failure.
#[derive(Debug, Clone, Error)]
pub enum ModuleError {
    #[error("Remote module {module} timed out after {}ms", .timeout.as_millis())]
    RemoteModuleTimeout { module: String, timeout: Duration },

    #[error("Failed to load remote module {module} after {attempts} attempts: {source}")]
    RemoteModuleLoad {
        module: String,
        attempts: u32,
        #[source]
        source: Box<ModuleError>,
    },

    #[error("Remote container not found for module {module}: {reason}")]
    RemoteContainerNotFound { module: String, reason: String },

    #[error("Container initialization failed: {0}")]
    ContainerInit(String),

    #[error("Container could not resolve exposed module: {0}")]
    ContainerGet(String),

    #[error("Dynamic import failed: {0}")]
    ImportFailed(String),

    #[error("Script injection failed: {0}")]
    ScriptLoad(String),

    #[error("Invalid module manifest: {0}")]
    InvalidManifest(String),

    #[error("Circular dependency detected among modules: {0:?}")]
    DependencyCycle(Vec<String>),

    #[error("Module dependency missing: {0}")]
    DependencyMissing(String),

    #[error("Scope identifier {scope} is shared by modules {first} and {second}")]
    ScopeCollision {
        scope: String,
        first: String,
        second: String,
    },

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Module {module} cannot be activated: {reason}")]
    ModuleUnavailable { module: String, reason: String },

    #[error("Module initialization failed: {0}")]
    InitializationError(String),

    #[error("Invalid status transition for module {module}: {from} -> {to}")]
    InvalidTransition {
        module: String,
        from: ModuleStatus,
        to: ModuleStatus,
    },

    #[error("Startup aborted by init module {module}: {source}")]
    StartupAborted {
        module: String,
        #[source]
        source: Box<ModuleError>,
    },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Module operation failed: {0}")]
    OperationError(String),
}

impl ModuleError {
    /// Whether a container `init` failure only reports a repeated initialization
    pub fn is_already_initialized(&self) -> bool {
        match self {
            ModuleError::ContainerInit(message) => {
                let message = message.to_lowercase();
                message.contains("already initialized")
                    || message.contains("already been initialized")
            }
            _ => false,
        }
    }

    /// Attempt count carried by a retry-exhaustion error
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ModuleError::RemoteModuleLoad { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ModuleError {
    fn from(e: serde_json::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for ModuleError {
    fn from(e: toml::de::Error) -> Self {
        ModuleError::SerializationError(e.to_string())
    }
}

impl From<anyhow::Error> for ModuleError {
    fn from(e: anyhow::Error) -> Self {
        ModuleError::OperationError(e.to_string())
    }
}
