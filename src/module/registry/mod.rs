//! Module descriptor registry
//!
//! Static, declaration-ordered catalogue of module metadata, plus manifest
//! parsing and dependency leveling.

pub mod dependencies;
pub mod descriptor;
pub mod manifest;

pub use dependencies::{ActivationPlan, Exclusion, ExclusionReason};
pub use descriptor::{scope_name, ModuleDescriptor};
pub use manifest::{LoadType, ModuleManifest, ModuleManifestEntry};

use std::collections::HashMap;
use tracing::{debug, info};

use crate::module::traits::ModuleError;
use crate::module::validation::{ManifestValidator, ValidationResult};

/// Declaration-ordered registry of module descriptors
///
/// Construction rejects duplicate names, invalid descriptors and colliding
/// scope identifiers, so every registry in existence is internally consistent.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    descriptors: Vec<ModuleDescriptor>,
    index: HashMap<String, usize>,
    scopes: HashMap<String, String>,
}

impl ModuleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a parsed manifest
    pub fn from_manifest(manifest: ModuleManifest) -> Result<Self, ModuleError> {
        Self::from_descriptors(manifest.modules.into_iter().map(ModuleDescriptor::from))
    }

    /// Build a registry from descriptors in declaration order
    pub fn from_descriptors<I>(descriptors: I) -> Result<Self, ModuleError>
    where
        I: IntoIterator<Item = ModuleDescriptor>,
    {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        info!("Module registry built with {} modules", registry.len());
        Ok(registry)
    }

    /// Register one descriptor at the end of the declaration order
    pub fn register(&mut self, descriptor: ModuleDescriptor) -> Result<(), ModuleError> {
        if let ValidationResult::Invalid(errors) = ManifestValidator::new().validate(&descriptor) {
            return Err(ModuleError::InvalidManifest(errors.join("; ")));
        }

        if self.index.contains_key(&descriptor.name) {
            return Err(ModuleError::InvalidManifest(format!(
                "Duplicate module name: {}",
                descriptor.name
            )));
        }

        let scope = descriptor.scope_name();
        if let Some(existing) = self.scopes.get(&scope) {
            return Err(ModuleError::ScopeCollision {
                scope,
                first: existing.clone(),
                second: descriptor.name,
            });
        }

        debug!(
            "Registered module {} ({:?}, priority {})",
            descriptor.name, descriptor.load_type, descriptor.load_priority
        );
        self.scopes.insert(scope, descriptor.name.clone());
        self.index
            .insert(descriptor.name.clone(), self.descriptors.len());
        self.descriptors.push(descriptor);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModuleDescriptor> {
        self.index.get(name).map(|&i| &self.descriptors[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// All descriptors in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ModuleDescriptor> {
        self.descriptors.iter()
    }

    /// Position in declaration order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// INIT modules by ascending priority, ties in declaration order
    pub fn init_modules(&self) -> Vec<&ModuleDescriptor> {
        let mut init: Vec<&ModuleDescriptor> = self
            .descriptors
            .iter()
            .filter(|d| d.load_type == LoadType::Init)
            .collect();
        // stable sort keeps declaration order for equal priorities
        init.sort_by_key(|d| d.load_priority);
        init
    }

    /// NORMAL modules by ascending priority, ties in declaration order
    pub fn normal_modules(&self) -> Vec<&ModuleDescriptor> {
        let mut normal: Vec<&ModuleDescriptor> = self
            .descriptors
            .iter()
            .filter(|d| d.load_type == LoadType::Normal)
            .collect();
        normal.sort_by_key(|d| d.load_priority);
        normal
    }
}
