//! Module activation gating
//!
//! Feature flags and access permissions decide whether a NORMAL module is
//! activated at all.

pub mod gating;

pub use gating::{FeatureSource, GateDecision, GateEvaluator, StaticFeatureSource};
