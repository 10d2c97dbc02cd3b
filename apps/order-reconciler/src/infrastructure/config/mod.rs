//! Configuration Module
//!
//! Environment-driven configuration for the reconciler service.

mod settings;

pub use settings::{ConfigError, DEFAULT_TIME_ZONE, ReconcilerConfig, ServerSettings};
