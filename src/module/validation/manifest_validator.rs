//! Manifest validation framework
//!
//! Validates module descriptors for structure and load-type invariants.

use tracing::{debug, warn};

use crate::module::registry::descriptor::ModuleDescriptor;
use crate::module::registry::manifest::LoadType;

/// Validation result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Descriptor is valid
    Valid,
    /// Descriptor is invalid with specific errors
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Manifest validator
pub struct ManifestValidator {
    /// Maximum module name length
    max_name_len: usize,
}

impl ManifestValidator {
    /// Create a new manifest validator
    pub fn new() -> Self {
        Self { max_name_len: 64 }
    }

    /// Validate a module descriptor
    pub fn validate(&self, descriptor: &ModuleDescriptor) -> ValidationResult {
        let mut errors = Vec::new();

        if descriptor.name.is_empty() {
            errors.push("Module name cannot be empty".to_string());
        } else if !self.is_valid_name(&descriptor.name) {
            errors.push(format!(
                "Invalid module name: {} (must be alphanumeric with dashes/underscores)",
                descriptor.name
            ));
        }

        if let Some(ref version) = descriptor.version {
            if !self.is_valid_version(version) {
                errors.push(format!(
                    "Invalid version format: {} (expected semantic versioning)",
                    version
                ));
            }
        }

        // INIT modules cannot be conditionally skipped or wait on others
        if descriptor.load_type == LoadType::Init {
            if !descriptor.dependencies.is_empty() {
                errors.push(format!(
                    "Init module {} cannot declare dependencies: {:?}",
                    descriptor.name, descriptor.dependencies
                ));
            }
            if descriptor.is_gated() {
                errors.push(format!(
                    "Init module {} cannot be gated by feature flags or access permissions",
                    descriptor.name
                ));
            }
        }

        for dep in &descriptor.dependencies {
            if dep == &descriptor.name {
                errors.push(format!("Module {} depends on itself", descriptor.name));
            } else if !self.is_valid_name(dep) {
                errors.push(format!("Invalid dependency name: {}", dep));
            }
        }

        for key in descriptor
            .feature_flags
            .iter()
            .chain(descriptor.access_permissions.iter())
        {
            if key.trim().is_empty() {
                errors.push(format!(
                    "Module {} declares an empty flag or permission key",
                    descriptor.name
                ));
            }
        }

        if errors.is_empty() {
            debug!("Manifest validation passed for module: {}", descriptor.name);
            ValidationResult::Valid
        } else {
            warn!(
                "Manifest validation failed for module {}: {:?}",
                descriptor.name, errors
            );
            ValidationResult::Invalid(errors)
        }
    }

    /// Validate module name format
    #[inline]
    fn is_valid_name(&self, name: &str) -> bool {
        if name.is_empty() || name.len() > self.max_name_len {
            return false;
        }

        // Must start with alphanumeric
        if !name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return false;
        }

        name.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    /// Validate version format (semantic versioning)
    ///
    /// Accepts: major.minor[.patch][-prerelease][+build]
    #[inline]
    fn is_valid_version(&self, version: &str) -> bool {
        let base = version.split('+').next().unwrap_or_default();
        let version_part = base.split('-').next().unwrap_or_default();

        let nums: Vec<&str> = version_part.split('.').collect();
        if nums.len() < 2 || nums.len() > 3 {
            return false;
        }

        nums.iter()
            .all(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()) && n.parse::<u32>().is_ok())
    }
}

impl Default for ManifestValidator {
    fn default() -> Self {
        Self::new()
    }
}
