//! Application Layer - Reconciliation services and port definitions.
//!
//! Services own the session lifecycle (stream, fallback polling, cache);
//! ports describe the push transport and REST query boundary they drive.

/// Port interfaces for the push transport and REST query boundary.
pub mod ports;

/// Cache, stream, fallback and controller services.
pub mod services;
