//! Remote module loader
//!
//! Fetches a remote module's container with per-attempt deadlines and fixed-delay
//! retry, initializes it with the negotiated shared scope and resolves the
//! exposed module. Loads are deduplicated per `(name, remote_entry)`.

use std::sync::Arc;
use std::time::Duration;

use futures::future::FutureExt;
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::module::loader::cache::{CacheKey, LoadCache, LoadResult};
use crate::module::loader::resolver::{ContainerHost, ResolverChain};
use crate::module::loader::shared_scope::SharedScopeNegotiator;
use crate::module::traits::{ModuleDefinition, ModuleError, EXPOSED_MODULE_KEY};
use crate::utils::{retry_async_fixed, with_deadline, AttemptContext, RetryConfig};

/// Per-load retry and timeout settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Total attempts
    pub retries: u32,
    /// Deadline for each attempt
    pub timeout: Duration,
    /// Fixed wait between attempts
    pub retry_delay: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&LoaderConfig::default())
    }
}

impl From<&LoaderConfig> for LoadOptions {
    fn from(config: &LoaderConfig) -> Self {
        Self {
            retries: config.retries,
            timeout: config.timeout(),
            retry_delay: config.retry_delay(),
        }
    }
}

impl LoadOptions {
    fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.retries, self.retry_delay)
    }
}

struct LoaderInner {
    host: Arc<dyn ContainerHost>,
    resolvers: ResolverChain,
    negotiator: SharedScopeNegotiator,
    cache: LoadCache,
    defaults: LoadOptions,
}

/// Loader for remote module containers
///
/// Cheap to clone; clones share the cache and the loaded-script set.
#[derive(Clone)]
pub struct RemoteModuleLoader {
    inner: Arc<LoaderInner>,
}

impl RemoteModuleLoader {
    /// Loader using the standard resolver chain and no host-configured shared deps
    pub fn new(host: Arc<dyn ContainerHost>) -> Self {
        Self::with_parts(
            Arc::clone(&host),
            ResolverChain::standard(host),
            SharedScopeNegotiator::new(),
            LoadOptions::default(),
        )
    }

    pub fn with_parts(
        host: Arc<dyn ContainerHost>,
        resolvers: ResolverChain,
        negotiator: SharedScopeNegotiator,
        defaults: LoadOptions,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                host,
                resolvers,
                negotiator,
                cache: LoadCache::new(),
                defaults,
            }),
        }
    }

    /// Options used by [`load`](Self::load)
    pub fn default_options(&self) -> LoadOptions {
        self.inner.defaults
    }

    /// Load with the loader's default options
    pub async fn load(&self, name: &str, remote_entry: &str) -> LoadResult {
        self.load_remote_module(name, remote_entry, &self.inner.defaults)
            .await
    }

    /// Load a remote module, joining any load already in flight for the same key
    ///
    /// Options only apply when this call starts a new load.
    pub async fn load_remote_module(
        &self,
        name: &str,
        remote_entry: &str,
        options: &LoadOptions,
    ) -> LoadResult {
        if name.is_empty() {
            return Err(ModuleError::ModuleNotFound(
                "module name must not be empty".to_string(),
            ));
        }

        let key = CacheKey::new(name, remote_entry);
        let options = *options;
        let (load, joined) = self.inner.cache.get_or_start(&key, |generation| {
            let inner = Arc::clone(&self.inner);
            let key = key.clone();
            async move {
                let result = inner.load_with_retry(&key, &options).await;
                if result.is_err() {
                    inner.cache.remove_generation(&key, generation);
                }
                result
            }
            .boxed()
        });

        if joined {
            debug!("Module {} joined existing load", name);
        }
        load.await
    }

    /// Forget the cached load for a key; the next call fetches again
    pub fn invalidate(&self, name: &str, remote_entry: &str) -> bool {
        let removed = self
            .inner
            .cache
            .invalidate(&CacheKey::new(name, remote_entry));
        if removed {
            info!("Invalidated cached load for module {}", name);
        }
        removed
    }

    pub fn is_cached(&self, name: &str, remote_entry: &str) -> bool {
        self.inner.cache.contains(&CacheKey::new(name, remote_entry))
    }

    pub fn cached_keys(&self) -> Vec<CacheKey> {
        self.inner.cache.keys()
    }
}

impl LoaderInner {
    async fn load_with_retry(&self, key: &CacheKey, options: &LoadOptions) -> LoadResult {
        info!(
            "Loading remote module {} from {} (retries: {}, timeout: {:?})",
            key.module, key.remote_entry, options.retries, options.timeout
        );

        let result = retry_async_fixed(&options.retry_config(), |attempt| {
            self.attempt(key, attempt, options.timeout)
        })
        .await;

        match result {
            Ok(definition) => {
                info!("Remote module {} loaded", key.module);
                Ok(definition)
            }
            Err(exhausted) => {
                warn!(
                    "Remote module {} failed after {} attempts: {}",
                    key.module, exhausted.attempts, exhausted.last_error
                );
                Err(ModuleError::RemoteModuleLoad {
                    module: key.module.clone(),
                    attempts: exhausted.attempts,
                    source: Box::new(exhausted.last_error),
                })
            }
        }
    }

    async fn attempt(&self, key: &CacheKey, attempt: u32, timeout: Duration) -> LoadResult {
        debug!("Attempt {} for module {}", attempt, key.module);
        let ctx = AttemptContext::starting_now(attempt, timeout);

        match with_deadline(&ctx, self.fetch(key, &ctx)).await {
            Some(result) => result,
            None => {
                warn!(
                    "Attempt {} for module {} timed out after {:?}",
                    attempt, key.module, timeout
                );
                Err(ModuleError::RemoteModuleTimeout {
                    module: key.module.clone(),
                    timeout,
                })
            }
        }
    }

    async fn fetch(&self, key: &CacheKey, ctx: &AttemptContext) -> LoadResult {
        let container = self
            .resolvers
            .resolve(&key.module, &key.remote_entry, ctx)
            .await?;

        let shared_globals = self.host.shared_globals();
        let scope = self.negotiator.negotiate(shared_globals.as_ref());
        debug!(
            "Negotiated shared scope for {} with {} entries",
            key.module,
            scope.len()
        );

        match container.init(&scope).await {
            Ok(()) => debug!("Container for {} initialized", key.module),
            Err(e) if e.is_already_initialized() => {
                debug!("Container for {} already initialized", key.module)
            }
            Err(e) => return Err(e),
        }

        let factory = container.get(EXPOSED_MODULE_KEY).await?;
        debug!("Resolved {} from container {}", EXPOSED_MODULE_KEY, key.module);

        let definition: Arc<dyn ModuleDefinition> = factory().into_definition();
        Ok(definition)
    }
}
