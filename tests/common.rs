//! Shared fixtures for loader and scheduler tests
//!
//! Provides an in-memory container host, a counting remote container and module
//! definitions that record their init hooks.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use mfe_orchestrator::module::loader::{
    ContainerHost, EntryExports, LoadOptions, ResolverChain, SharedScope, SharedScopeNegotiator,
};
use mfe_orchestrator::module::traits::{
    BootstrapContext, ModuleDefinition, ModuleError, ModuleExports, ModuleFactory,
    RemoteContainer, RouteDescriptor, TranslationBundle, EXPOSED_MODULE_KEY,
};
use mfe_orchestrator::module::RemoteModuleLoader;
use mfe_orchestrator::utils::AttemptContext;

/// Options for tests that should not wait on real-world defaults
pub fn fast_options() -> LoadOptions {
    LoadOptions {
        retries: 1,
        timeout: Duration::from_millis(1_000),
        retry_delay: Duration::from_millis(10),
    }
}

/// Loader over `host` with the standard chain and the given defaults
pub fn loader_with(host: &Arc<MockHost>, options: LoadOptions) -> RemoteModuleLoader {
    let host: Arc<dyn ContainerHost> = host.clone();
    RemoteModuleLoader::with_parts(
        Arc::clone(&host),
        ResolverChain::standard(host),
        SharedScopeNegotiator::new(),
        options,
    )
}

/// Remote container that counts calls and behaves like a federation runtime
pub struct MockContainer {
    definition: Arc<dyn ModuleDefinition>,
    init_error: Option<String>,
    pub init_calls: AtomicUsize,
    pub get_calls: AtomicUsize,
    /// Times shared state was actually taken from a scope
    pub shared_loads: AtomicUsize,
    pub last_scope: Mutex<Option<SharedScope>>,
}

impl MockContainer {
    pub fn new(definition: Arc<dyn ModuleDefinition>) -> Arc<Self> {
        Arc::new(Self {
            definition,
            init_error: None,
            init_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            shared_loads: AtomicUsize::new(0),
            last_scope: Mutex::new(None),
        })
    }

    /// Container whose `init` always fails with `message`
    pub fn failing_init(definition: Arc<dyn ModuleDefinition>, message: &str) -> Arc<Self> {
        Arc::new(Self {
            definition,
            init_error: Some(message.to_string()),
            init_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            shared_loads: AtomicUsize::new(0),
            last_scope: Mutex::new(None),
        })
    }

    pub fn inits(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn scope(&self) -> Option<SharedScope> {
        self.last_scope.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteContainer for MockContainer {
    async fn init(&self, share_scope: &SharedScope) -> Result<(), ModuleError> {
        let previous = self.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.init_error {
            return Err(ModuleError::ContainerInit(message.clone()));
        }
        if previous > 0 {
            return Err(ModuleError::ContainerInit(
                "Container already initialized".to_string(),
            ));
        }
        self.shared_loads.fetch_add(1, Ordering::SeqCst);
        *self.last_scope.lock().unwrap() = Some(share_scope.clone());
        Ok(())
    }

    async fn get(&self, exposed: &str) -> Result<ModuleFactory, ModuleError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if exposed != EXPOSED_MODULE_KEY {
            return Err(ModuleError::ContainerGet(exposed.to_string()));
        }
        let definition = Arc::clone(&self.definition);
        Ok(Arc::new(move || ModuleExports::Default(Arc::clone(&definition))))
    }
}

/// How a served remote entry behaves
#[derive(Clone)]
pub enum Behavior {
    /// Dynamic import yields the container
    Esm,
    /// Dynamic import fails; the script registers the container globally
    Script,
    /// Dynamic import yields an object without `get`/`init`; the script
    /// registers the container globally
    Incomplete,
    /// Neither import nor script ever completes
    Hang,
}

struct Served {
    behavior: Behavior,
    container: Arc<MockContainer>,
    scope: String,
    failures_left: u32,
    delay: Duration,
}

/// In-memory [`ContainerHost`]
#[derive(Default)]
pub struct MockHost {
    served: Mutex<HashMap<String, Served>>,
    globals: Mutex<HashMap<String, Arc<dyn RemoteContainer>>>,
    shared: Mutex<Option<Value>>,
    pub import_calls: AtomicUsize,
    pub script_calls: AtomicUsize,
    pub tokens: Mutex<Vec<CancellationToken>>,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `url`; `scope` is where script injection registers the container
    pub fn serve(&self, url: &str, scope: &str, behavior: Behavior, container: Arc<MockContainer>) {
        self.served.lock().unwrap().insert(
            url.to_string(),
            Served {
                behavior,
                container,
                scope: scope.to_string(),
                failures_left: 0,
                delay: Duration::ZERO,
            },
        );
    }

    /// Make the next `count` imports of `url` fail
    pub fn fail_first(&self, url: &str, count: u32) {
        if let Some(served) = self.served.lock().unwrap().get_mut(url) {
            served.failures_left = count;
        }
    }

    /// Delay every import of `url`
    pub fn delay(&self, url: &str, delay: Duration) {
        if let Some(served) = self.served.lock().unwrap().get_mut(url) {
            served.delay = delay;
        }
    }

    pub fn set_shared_globals(&self, value: Value) {
        *self.shared.lock().unwrap() = Some(value);
    }

    pub fn imports(&self) -> usize {
        self.import_calls.load(Ordering::SeqCst)
    }

    pub fn scripts(&self) -> usize {
        self.script_calls.load(Ordering::SeqCst)
    }

    fn lookup(&self, url: &str) -> Option<(Behavior, Arc<MockContainer>, String, bool, Duration)> {
        let mut served = self.served.lock().unwrap();
        let entry = served.get_mut(url)?;
        let fail = entry.failures_left > 0;
        if fail {
            entry.failures_left -= 1;
        }
        Some((
            entry.behavior.clone(),
            Arc::clone(&entry.container),
            entry.scope.clone(),
            fail,
            entry.delay,
        ))
    }
}

#[async_trait]
impl ContainerHost for MockHost {
    async fn dynamic_import(
        &self,
        url: &str,
        ctx: &AttemptContext,
    ) -> Result<EntryExports, ModuleError> {
        self.import_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(ctx.cancel.clone());

        let (behavior, container, _, fail, delay) = self
            .lookup(url)
            .ok_or_else(|| ModuleError::ImportFailed(format!("404 {}", url)))?;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(ModuleError::ImportFailed(format!("network error {}", url)));
        }

        match behavior {
            Behavior::Esm => Ok(EntryExports::Container(container)),
            Behavior::Script => Err(ModuleError::ImportFailed(format!(
                "{} is not an ES module",
                url
            ))),
            Behavior::Incomplete => Ok(EntryExports::Incomplete {
                exported: vec!["default".to_string()],
            }),
            Behavior::Hang => std::future::pending().await,
        }
    }

    async fn inject_script(&self, url: &str, _ctx: &AttemptContext) -> Result<(), ModuleError> {
        self.script_calls.fetch_add(1, Ordering::SeqCst);

        let served = {
            let served = self.served.lock().unwrap();
            served
                .get(url)
                .map(|s| (s.behavior.clone(), Arc::clone(&s.container), s.scope.clone()))
        };
        let (behavior, container, scope) =
            served.ok_or_else(|| ModuleError::ScriptLoad(format!("404 {}", url)))?;

        match behavior {
            Behavior::Script | Behavior::Incomplete => {
                self.globals.lock().unwrap().insert(scope, container);
                Ok(())
            }
            Behavior::Esm => Err(ModuleError::ScriptLoad(format!(
                "{} is an ES module",
                url
            ))),
            Behavior::Hang => std::future::pending().await,
        }
    }

    fn global_container(&self, scope: &str) -> Option<Arc<dyn RemoteContainer>> {
        self.globals.lock().unwrap().get(scope).cloned()
    }

    fn shared_globals(&self) -> Option<Value> {
        self.shared.lock().unwrap().clone()
    }
}

/// Ordered log of init hook events across modules
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn position(log: &EventLog, event: &str) -> usize {
    log.lock()
        .unwrap()
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("event {} not recorded", event))
}

/// Module definition that records `start:<name>` and `end:<name>` around its
/// init hook
pub struct RecordingModule {
    name: String,
    log: EventLog,
    init_delay: Duration,
    fail_init: bool,
    pub init_runs: AtomicUsize,
}

impl RecordingModule {
    pub fn new(name: &str, log: &EventLog) -> Arc<Self> {
        Self::build(name, log, Duration::ZERO, false)
    }

    pub fn slow(name: &str, log: &EventLog, init_delay: Duration) -> Arc<Self> {
        Self::build(name, log, init_delay, false)
    }

    pub fn failing(name: &str, log: &EventLog) -> Arc<Self> {
        Self::build(name, log, Duration::ZERO, true)
    }

    fn build(name: &str, log: &EventLog, init_delay: Duration, fail_init: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            log: Arc::clone(log),
            init_delay,
            fail_init,
            init_runs: AtomicUsize::new(0),
        })
    }

    pub fn runs(&self) -> usize {
        self.init_runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModuleDefinition for RecordingModule {
    fn routes(&self) -> Vec<RouteDescriptor> {
        vec![RouteDescriptor::named(format!("/{}", self.name), self.name.clone())]
    }

    /// One `en` bundle in the module's own namespace with a `title` key
    fn translations(&self) -> Vec<TranslationBundle> {
        let mut entries = BTreeMap::new();
        entries.insert("title".to_string(), self.name.clone());
        vec![TranslationBundle {
            locale: "en".to_string(),
            namespace: self.name.clone(),
            entries,
        }]
    }

    async fn on_module_init(&self, _context: &BootstrapContext) -> Result<(), ModuleError> {
        self.init_runs.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(format!("start:{}", self.name));
        if !self.init_delay.is_zero() {
            tokio::time::sleep(self.init_delay).await;
        }
        self.log.lock().unwrap().push(format!("end:{}", self.name));
        if self.fail_init {
            return Err(ModuleError::InitializationError(format!(
                "{} refused to start",
                self.name
            )));
        }
        Ok(())
    }
}

/// Serve a recording module over ESM at `<name>.js`
pub fn serve_module(host: &MockHost, name: &str, module: Arc<RecordingModule>) -> Arc<MockContainer> {
    let container = MockContainer::new(module);
    host.serve(
        &entry_url(name),
        &mfe_orchestrator::module::registry::scope_name(name),
        Behavior::Esm,
        Arc::clone(&container),
    );
    container
}

pub fn entry_url(name: &str) -> String {
    format!("https://cdn.example.com/{}/remoteEntry.js", name)
}
