//! REST Query Boundary Adapter

pub mod client;

pub use client::{HttpSnapshotSource, RestSettings};
