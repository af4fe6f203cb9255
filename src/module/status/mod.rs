//! Module status tracking

pub mod tracker;

pub use tracker::{is_valid_transition, StatusChange, StatusTracker, StatusView};
