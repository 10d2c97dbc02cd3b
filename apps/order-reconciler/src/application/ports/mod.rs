//! Port Interfaces
//!
//! Contracts the reconciliation services drive. Infrastructure adapters
//! implement them; tests substitute scripted fakes.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PushTransport`: subscription to the push-event source
//! - `SnapshotSource`: REST query boundary providing full snapshots

mod push_transport_port;
mod snapshot_source_port;

pub use push_transport_port::{PushTransport, TransportError, TransportEvent};
#[cfg(test)]
pub use snapshot_source_port::MockSnapshotSource;
pub use snapshot_source_port::{
    DailySalesQuery, DailySalesReport, DailySalesRow, MetricsQuery, MetricsReport, OrdersPage,
    OrdersQuery, Paging, SnapshotError, SnapshotSource,
};
