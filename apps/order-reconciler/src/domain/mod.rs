//! Domain Layer - Order types, windows, views and merge rules.
//!
//! Everything here is pure: no I/O, no clocks (instants are passed in),
//! no shared state.

/// Orders and identifiers.
pub mod order;

/// Processed order keys for idempotent stream application.
pub mod dedup;

/// Time windows and the range filter.
pub mod window;

/// Derived views and the descriptors addressing them.
pub mod views;

/// Merge rules folding one order into each view kind.
pub mod merge;

/// Push stream message classification.
pub mod stream;
