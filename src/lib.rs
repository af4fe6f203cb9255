//! Micro-frontend module orchestrator
//!
//! Decides which independently built modules are fetched, initialized, and in
//! what order, at application start and at navigation time.
//!
//! ## Components
//!
//! 1. Module registry (manifest parsing, validation, scope naming)
//! 2. Remote container loader (retry, per-attempt deadline, join-on-load cache)
//! 3. Shared-scope negotiator
//! 4. Dependency-level scheduler with feature-flag and permission gating
//! 5. Status tracker
//!
//! ## Design Principles
//!
//! 1. **Host agnostic**: all runtime mechanics sit behind [`module::ContainerHost`]
//! 2. **At most one load per module**: concurrent callers share one fetch
//! 3. **Failure isolation**: a failed NORMAL module only takes its dependents down
//! 4. **Fail fast on configuration**: cycles and scope collisions are rejected up front

pub mod config;
pub mod module;
pub mod utils;

pub use config::{LoaderConfig, OrchestratorConfig};
pub use module::{
    ModuleDefinition, ModuleError, ModuleRegistry, ModuleScheduler, ModuleStatus,
    RemoteModuleLoader, StartupReport,
};
