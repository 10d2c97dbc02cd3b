//! Application Services
//!
//! Services that own the reconciliation session and coordinate between
//! ports and domain logic.
//!
//! - `CacheStore`: addressable store of derived views
//! - `Connectivity`: push connectivity state shared by stream and poller
//! - `StreamConnection`: one push subscription and its consumer loop
//! - `Refetcher`: repopulates views from the REST query boundary
//! - `FallbackScheduler`: polls while the stream is not live
//! - `ReconciliationController`: one stream + one scheduler per selection

mod cache_store;
mod connectivity;
mod controller;
mod fallback;
mod refetch;
mod stream_connection;

pub use cache_store::{CacheEntry, CacheStore, EntryStatus, MergeResult};
pub use connectivity::{Connectivity, ConnectivityState};
pub use controller::{
    AttachOutcome, ControllerSettings, ReconciliationController, ResolvedSelection, Selection,
};
pub use fallback::{
    DEFAULT_FALLBACK_INTERVAL, FallbackScheduler, FallbackTick, TickAction,
};
pub use refetch::{RefetchSummary, Refetcher};
pub use stream_connection::{EventOutcome, EventRouter, StreamConnection, StreamScope};
