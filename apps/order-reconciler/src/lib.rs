#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::default_trait_access
    )
)]

//! Order Reconciler - Live Order View Reconciliation
//!
//! Keeps three derived views of a marketplace workspace (recent orders,
//! per-day sales, period metrics) consistent with a push stream of new
//! orders. While the stream is not confirmed live, views are refreshed by
//! periodic REST refetches instead.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Orders, windows, views and the pure merge rules
//!   - `dedup`: processed order keys
//!   - `window`: date windows and the range filter
//!   - `merge`: folding one order into each view
//!   - `stream`: inbound message classification
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: push transport, REST snapshot source
//!   - `services`: cache store, stream connection, fallback scheduler,
//!     reconciliation controller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `push`: WebSocket push client
//!   - `rest`: REST snapshot client
//!   - `config`, `telemetry`, `metrics`, `health`
//!
//! # Data Flow
//!
//! ```text
//! push source ──► StreamConnection ──► merge ──┐
//!                                              ├──► CacheStore ──► /views/{kind}
//! REST API ─────► Refetcher (initial, fallback)┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Pure order, window and view logic.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::dedup::ProcessedKeySet;
pub use domain::order::{LineItem, Order, OrderId, WorkspaceId};
pub use domain::views::{
    CachedView, DailyBucket, DailyBucketSeries, MetricsSnapshot, OrdersListView, QueryDescriptor,
    SessionDescriptors, ViewKind,
};
pub use domain::window::{DateWindow, ListWindow, PeriodSelection, RangeFilter};

// Ports
pub use application::ports::{
    PushTransport, SnapshotError, SnapshotSource, TransportError, TransportEvent,
};

// Services
pub use application::services::{
    AttachOutcome, CacheStore, ConnectivityState, ControllerSettings, ReconciliationController,
    Selection,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, ReconcilerConfig, ServerSettings};

// Adapters
pub use infrastructure::push::{PushSettings, ReconnectConfig, WebSocketPushTransport};
pub use infrastructure::rest::{HttpSnapshotSource, RestSettings};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
