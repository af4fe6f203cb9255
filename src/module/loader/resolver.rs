//! Container resolution strategies
//!
//! A [`ContainerHost`] abstracts the runtime that actually executes remote
//! entries (browser, embedded JS engine, test double). Resolvers turn a module
//! name and remote-entry URL into a [`RemoteContainer`] using one host
//! mechanism each, tried in order by a [`ResolverChain`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::module::registry::descriptor::scope_name;
use crate::module::traits::{ModuleError, RemoteContainer};
use crate::utils::AttemptContext;

/// Result of dynamically importing a remote entry as an ES module
#[derive(Clone)]
pub enum EntryExports {
    /// Entry exports both `get` and `init`
    Container(Arc<dyn RemoteContainer>),
    /// Entry loaded but lacks a container capability; names what it does export
    Incomplete { exported: Vec<String> },
}

impl std::fmt::Debug for EntryExports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryExports::Container(_) => f.write_str("EntryExports::Container(..)"),
            EntryExports::Incomplete { exported } => f
                .debug_struct("EntryExports::Incomplete")
                .field("exported", exported)
                .finish(),
        }
    }
}

/// Runtime environment able to execute remote entries
#[async_trait]
pub trait ContainerHost: Send + Sync {
    /// Import the remote entry as an ES module
    async fn dynamic_import(
        &self,
        url: &str,
        ctx: &AttemptContext,
    ) -> Result<EntryExports, ModuleError>;

    /// Execute the remote entry as a classic script
    async fn inject_script(&self, url: &str, ctx: &AttemptContext) -> Result<(), ModuleError>;

    /// Container a classic script registered under a global scope name
    fn global_container(&self, scope: &str) -> Option<Arc<dyn RemoteContainer>>;

    /// Federation runtime's shared-state global, if present
    fn shared_globals(&self) -> Option<Value> {
        None
    }
}

/// One strategy for obtaining a container
#[async_trait]
pub trait ContainerResolver: Send + Sync {
    /// Strategy name used in logs
    fn name(&self) -> &'static str;

    async fn resolve(
        &self,
        module: &str,
        remote_entry: &str,
        ctx: &AttemptContext,
    ) -> Result<Arc<dyn RemoteContainer>, ModuleError>;
}

/// Resolves containers through native dynamic import
pub struct EsmImportResolver {
    host: Arc<dyn ContainerHost>,
}

impl EsmImportResolver {
    pub fn new(host: Arc<dyn ContainerHost>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ContainerResolver for EsmImportResolver {
    fn name(&self) -> &'static str {
        "esm-import"
    }

    async fn resolve(
        &self,
        module: &str,
        remote_entry: &str,
        ctx: &AttemptContext,
    ) -> Result<Arc<dyn RemoteContainer>, ModuleError> {
        match self.host.dynamic_import(remote_entry, ctx).await? {
            EntryExports::Container(container) => Ok(container),
            EntryExports::Incomplete { exported } => Err(ModuleError::RemoteContainerNotFound {
                module: module.to_string(),
                reason: format!(
                    "{} does not export both get and init (exports: {:?})",
                    remote_entry, exported
                ),
            }),
        }
    }
}

/// Resolves containers by injecting a script and reading its global scope
///
/// Each URL is injected at most once per resolver instance.
pub struct ScriptTagResolver {
    host: Arc<dyn ContainerHost>,
    loaded_scripts: Mutex<HashSet<String>>,
}

impl ScriptTagResolver {
    pub fn new(host: Arc<dyn ContainerHost>) -> Self {
        Self {
            host,
            loaded_scripts: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_loaded(&self, url: &str) -> bool {
        self.lock_scripts().contains(url)
    }

    fn lock_scripts(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.loaded_scripts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ContainerResolver for ScriptTagResolver {
    fn name(&self) -> &'static str {
        "script-tag"
    }

    async fn resolve(
        &self,
        module: &str,
        remote_entry: &str,
        ctx: &AttemptContext,
    ) -> Result<Arc<dyn RemoteContainer>, ModuleError> {
        if self.is_loaded(remote_entry) {
            debug!("Script {} already loaded, reusing global", remote_entry);
        } else {
            self.host.inject_script(remote_entry, ctx).await?;
            self.lock_scripts().insert(remote_entry.to_string());
            debug!("Injected script {}", remote_entry);
        }

        let scope = scope_name(module);
        self.host
            .global_container(&scope)
            .ok_or_else(|| ModuleError::RemoteContainerNotFound {
                module: module.to_string(),
                reason: format!("no global container registered under {}", scope),
            })
    }
}

/// Chain of responsibility over resolvers
///
/// Resolvers run in order; the first success wins. When all fail, the last
/// resolver's error is returned.
pub struct ResolverChain {
    resolvers: Vec<Arc<dyn ContainerResolver>>,
}

impl ResolverChain {
    pub fn new(resolvers: Vec<Arc<dyn ContainerResolver>>) -> Self {
        Self { resolvers }
    }

    /// ESM import first, then script tag with global fallback
    pub fn standard(host: Arc<dyn ContainerHost>) -> Self {
        Self::new(vec![
            Arc::new(EsmImportResolver::new(Arc::clone(&host))),
            Arc::new(ScriptTagResolver::new(host)),
        ])
    }

    pub async fn resolve(
        &self,
        module: &str,
        remote_entry: &str,
        ctx: &AttemptContext,
    ) -> Result<Arc<dyn RemoteContainer>, ModuleError> {
        let mut last_error = ModuleError::RemoteContainerNotFound {
            module: module.to_string(),
            reason: "no container resolvers configured".to_string(),
        };

        for resolver in &self.resolvers {
            match resolver.resolve(module, remote_entry, ctx).await {
                Ok(container) => {
                    debug!("Resolved container for {} via {}", module, resolver.name());
                    return Ok(container);
                }
                Err(e) => {
                    warn!(
                        "Resolver {} failed for module {}: {}",
                        resolver.name(),
                        module,
                        e
                    );
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}
