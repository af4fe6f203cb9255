//! Module system for the orchestrator
//!
//! Discovers modules from a manifest, fetches remote containers, negotiates the
//! shared-dependency scope and activates modules in dependency order.
//!
//! ## Architecture
//!
//! - **Registry**: declaration-ordered descriptors, validated at construction
//! - **Loader**: deduplicated, retrying fetch of remote containers
//! - **Gating**: feature flags and access permissions decide what runs
//! - **Scheduler**: INIT modules in sequence, NORMAL modules in dependency levels
//! - **Status**: per-module state machine, observable read-only

pub mod loader;
pub mod registry;
pub mod scheduler;
pub mod security;
pub mod status;
pub mod traits;
pub mod validation;

pub use loader::{ContainerHost, LoadOptions, RemoteModuleLoader};
pub use registry::{ActivationPlan, ModuleDescriptor, ModuleManifest, ModuleRegistry};
pub use scheduler::{FailedModule, ModuleScheduler, StartupReport};
pub use security::{GateEvaluator, StaticFeatureSource};
pub use status::{StatusTracker, StatusView};
pub use traits::{
    BootstrapContext, ModuleDefinition, ModuleError, ModuleExports, ModuleStatus, RemoteContainer,
};
