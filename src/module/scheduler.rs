//! Module scheduler for orchestrating activation
//!
//! Runs INIT modules in priority order, then NORMAL modules level by level with
//! a full barrier between levels. Activation of one module fetches its
//! definition, binds routes and translations, and runs its init hook.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::module::loader::RemoteModuleLoader;
use crate::module::registry::dependencies::{ActivationPlan, Exclusion, ExclusionReason};
use crate::module::registry::ModuleRegistry;
use crate::module::security::gating::{GateDecision, GateEvaluator};
use crate::module::status::{StatusTracker, StatusView};
use crate::module::traits::{BootstrapContext, ModuleDefinition, ModuleError, ModuleStatus};

type SharedActivation = Shared<BoxFuture<'static, Result<(), ModuleError>>>;

/// A module that did not reach `loaded`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedModule {
    pub module: String,
    pub reason: String,
}

/// Outcome of [`ModuleScheduler::start`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StartupReport {
    /// Modules that reached `loaded`, in activation order
    pub loaded: Vec<String>,
    /// NORMAL modules that failed or could not run
    pub failed: Vec<FailedModule>,
    /// NORMAL modules left out by the plan
    pub excluded: Vec<Exclusion>,
}

impl StartupReport {
    /// Every scheduled module loaded
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failure(&self, module: &str) -> Option<&FailedModule> {
        self.failed.iter().find(|f| f.module == module)
    }

    fn record_failure(&mut self, module: &str, error: &ModuleError) {
        self.failed.push(FailedModule {
            module: module.to_string(),
            reason: error.to_string(),
        });
    }
}

/// Drives module activation
///
/// Clones share the status tracker, the loader cache and in-flight activations.
#[derive(Clone)]
pub struct ModuleScheduler {
    registry: Arc<ModuleRegistry>,
    loader: RemoteModuleLoader,
    gate: GateEvaluator,
    status: StatusTracker,
    context: BootstrapContext,
    /// Definitions of modules bundled with the host (empty remote entry)
    local: Arc<HashMap<String, Arc<dyn ModuleDefinition>>>,
    in_flight: Arc<Mutex<HashMap<String, SharedActivation>>>,
}

impl ModuleScheduler {
    pub fn new(registry: ModuleRegistry, loader: RemoteModuleLoader, gate: GateEvaluator) -> Self {
        let status = StatusTracker::new();
        for descriptor in registry.iter() {
            status.register(&descriptor.name);
        }

        Self {
            registry: Arc::new(registry),
            loader,
            gate,
            status,
            context: BootstrapContext::default(),
            local: Arc::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Use a host-provided bootstrap context
    pub fn with_context(mut self, context: BootstrapContext) -> Self {
        self.context = context;
        self
    }

    /// Provide the definition of a locally bundled module
    pub fn with_local_module(
        mut self,
        name: impl Into<String>,
        definition: Arc<dyn ModuleDefinition>,
    ) -> Self {
        Arc::make_mut(&mut self.local).insert(name.into(), definition);
        self
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.registry
    }

    pub fn context(&self) -> &BootstrapContext {
        &self.context
    }

    pub fn loader(&self) -> &RemoteModuleLoader {
        &self.loader
    }

    /// Read-only status projection for the rest of the application
    pub fn status_view(&self) -> StatusView {
        self.status.view()
    }

    /// Activation plan under the scheduler's gating
    pub fn plan(&self) -> Result<ActivationPlan, ModuleError> {
        ActivationPlan::build(&self.registry, &self.gate)
    }

    /// Run startup activation
    ///
    /// Returns an error when the plan is invalid or an INIT module fails; NORMAL
    /// failures are isolated and reported.
    pub async fn start(&self) -> Result<StartupReport, ModuleError> {
        let plan = self.plan()?;
        let mut report = StartupReport::default();

        info!("Activating {} init modules", plan.init.len());
        for name in &plan.init {
            if let Err(e) = self.activation(name).await {
                error!("Init module {} failed, aborting startup: {}", name, e);
                return Err(ModuleError::StartupAborted {
                    module: name.clone(),
                    source: Box::new(e),
                });
            }
            report.loaded.push(name.clone());
        }

        for exclusion in &plan.excluded {
            // Gated modules are simply never activated; unsatisfied dependents fail
            if !exclusion.is_gated() {
                let reason = Self::unsatisfied(exclusion);
                warn!("{}", reason);
                self.mark_failed(&exclusion.module, &reason);
                report.record_failure(&exclusion.module, &reason);
            }
        }
        report.excluded = plan.excluded.clone();

        for (index, level) in plan.levels.iter().enumerate() {
            let mut runnable: Vec<&String> = Vec::with_capacity(level.len());
            for name in level {
                match self.unloaded_dependency(name) {
                    Some(dependency) => {
                        let reason = ModuleError::ModuleUnavailable {
                            module: name.clone(),
                            reason: format!("dependency {} did not load", dependency),
                        };
                        warn!("{}", reason);
                        self.mark_failed(name, &reason);
                        report.record_failure(name, &reason);
                    }
                    None => runnable.push(name),
                }
            }

            info!(
                "Activating level {} ({} of {} modules)",
                index,
                runnable.len(),
                level.len()
            );
            let results = join_all(runnable.iter().map(|name| self.activation(name))).await;

            for (name, result) in runnable.into_iter().zip(results) {
                match result {
                    Ok(()) => report.loaded.push(name.clone()),
                    Err(e) => report.record_failure(name, &e),
                }
            }
            debug!("Level {} settled", index);
        }

        info!(
            "Startup finished: {} loaded, {} failed, {} excluded",
            report.loaded.len(),
            report.failed.len(),
            report.excluded.len()
        );
        Ok(report)
    }

    /// Make sure a module is loaded, e.g. when navigation reaches its routes
    ///
    /// Returns at once when it is already loaded and joins an activation that is
    /// in flight. Gated modules and modules whose dependencies are not loaded
    /// are refused.
    pub async fn ensure_loaded(&self, name: &str) -> Result<(), ModuleError> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| ModuleError::ModuleNotFound(name.to_string()))?;

        if self.status.get(name) == Some(ModuleStatus::Loaded) {
            return Ok(());
        }

        if let GateDecision::Denied {
            missing_flags,
            missing_permissions,
        } = self.gate.evaluate(descriptor)
        {
            return Err(ModuleError::ModuleUnavailable {
                module: name.to_string(),
                reason: format!(
                    "gated off (flags: {:?}, permissions: {:?})",
                    missing_flags, missing_permissions
                ),
            });
        }

        if let Some(dependency) = self.unloaded_dependency(name) {
            return Err(ModuleError::ModuleUnavailable {
                module: name.to_string(),
                reason: format!("dependency {} is not loaded", dependency),
            });
        }

        self.activation(name).await
    }

    /// In-flight activation for `name`, starting one if none exists
    fn activation(&self, name: &str) -> SharedActivation {
        let mut in_flight = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = in_flight.get(name) {
            debug!("Joining in-flight activation of {}", name);
            return existing.clone();
        }

        let this = self.clone();
        let module = name.to_string();
        let activation = async move {
            let result = this.activate(&module).await;
            this.in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&module);
            result
        }
        .boxed()
        .shared();

        in_flight.insert(name.to_string(), activation.clone());
        activation
    }

    async fn activate(&self, name: &str) -> Result<(), ModuleError> {
        if self.status.get(name) == Some(ModuleStatus::Loaded) {
            return Ok(());
        }
        self.status.transition(name, ModuleStatus::Loading)?;

        match self.run_activation(name).await {
            Ok(()) => {
                info!("Module {} loaded", name);
                Ok(())
            }
            Err(e) => {
                error!("Module {} failed: {}", name, e);
                self.mark_failed(name, &e);
                Err(e)
            }
        }
    }

    async fn run_activation(&self, name: &str) -> Result<(), ModuleError> {
        let descriptor = self
            .registry
            .get(name)
            .ok_or_else(|| ModuleError::ModuleNotFound(name.to_string()))?;

        let definition = if descriptor.is_local() {
            debug!("Module {} is bundled locally", name);
            self.local.get(name).cloned().ok_or_else(|| {
                ModuleError::ModuleNotFound(format!("no local definition for {}", name))
            })?
        } else {
            self.loader.load(name, &descriptor.remote_entry).await?
        };
        self.status.transition(name, ModuleStatus::Preloaded)?;

        let routes = definition.routes();
        debug!("Binding {} routes for {}", routes.len(), name);
        self.context.routes().bind(name, routes);
        self.context
            .translations()
            .register(name, definition.translations());

        if let Err(e) = definition.on_module_init(&self.context).await {
            // a module that never initialized must not stay reachable
            self.context.routes().unbind(name);
            self.context.translations().unregister(name);
            return Err(match e {
                ModuleError::InitializationError(_) => e,
                other => ModuleError::InitializationError(format!("{}: {}", name, other)),
            });
        }

        self.status.transition(name, ModuleStatus::Loaded)
    }

    /// First dependency of `name` that is not loaded
    fn unloaded_dependency(&self, name: &str) -> Option<String> {
        self.registry.get(name).and_then(|descriptor| {
            descriptor
                .dependencies
                .iter()
                .find(|dep| self.status.get(dep) != Some(ModuleStatus::Loaded))
                .cloned()
        })
    }

    fn mark_failed(&self, name: &str, reason: &ModuleError) {
        if let Err(e) = self.status.fail(name, reason) {
            debug!("Could not record failure of {}: {}", name, e);
        }
    }

    fn unsatisfied(exclusion: &Exclusion) -> ModuleError {
        match &exclusion.reason {
            ExclusionReason::MissingDependency { dependency } => {
                ModuleError::DependencyMissing(format!(
                    "{} depends on unknown module {}",
                    exclusion.module, dependency
                ))
            }
            ExclusionReason::DependencyExcluded { dependency } => ModuleError::ModuleUnavailable {
                module: exclusion.module.clone(),
                reason: format!("dependency {} is excluded", dependency),
            },
            ExclusionReason::Gated { .. } => ModuleError::ModuleUnavailable {
                module: exclusion.module.clone(),
                reason: "gated off".to_string(),
            },
        }
    }
}
