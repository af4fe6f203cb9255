//! Module validation framework
//!
//! Provides descriptor validation: name and version format, load-type
//! invariants and dependency declarations.

pub mod manifest_validator;

pub use manifest_validator::{ManifestValidator, ValidationResult};
