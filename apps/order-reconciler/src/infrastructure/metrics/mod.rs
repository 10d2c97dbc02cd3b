//! Prometheus Metrics Module
//!
//! Exposes reconciliation metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Stream**: inbound events by outcome, liveness signals, transport errors
//! - **Connectivity**: current state of the push subscription
//! - **Fallback**: scheduler ticks, suppressed or fired
//! - **Refetch**: snapshot refetches by view and result, with latency
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::views::ViewKind;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder and return its handle.
///
/// Calling again after a successful install returns the existing handle.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed, e.g. because
/// another global recorder is already present.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "order_reconciler_stream_events_total",
        "Order events received from the push stream, by outcome"
    );
    describe_counter!(
        "order_reconciler_liveness_signals_total",
        "Liveness signals received from the push stream"
    );
    describe_counter!(
        "order_reconciler_transport_errors_total",
        "Push transport errors and closes"
    );

    describe_gauge!(
        "order_reconciler_connectivity_state",
        "Push connectivity (0 = connecting, 1 = live, 2 = disconnected)"
    );

    describe_counter!(
        "order_reconciler_fallback_ticks_total",
        "Fallback scheduler ticks, by action"
    );

    describe_counter!(
        "order_reconciler_refetches_total",
        "Snapshot refetches, by view and result"
    );
    describe_histogram!(
        "order_reconciler_refetch_seconds",
        "Snapshot refetch latency"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Outcome label for one stream event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Merged into at least one view.
    Applied,
    /// Already processed in this session.
    Duplicate,
    /// Addressed to another workspace.
    WorkspaceMismatch,
    /// Outside every active window.
    OutOfWindow,
    /// Could not be decoded.
    Malformed,
}

impl StreamOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::WorkspaceMismatch => "workspace_mismatch",
            Self::OutOfWindow => "out_of_window",
            Self::Malformed => "malformed",
        }
    }
}

/// Action label for one fallback tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackAction {
    /// Stream live, nothing done.
    Suppressed,
    /// Entries invalidated and refetched.
    Fired,
}

impl FallbackAction {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Suppressed => "suppressed",
            Self::Fired => "fired",
        }
    }
}

/// Record a classified stream event.
pub fn record_stream_event(outcome: StreamOutcome) {
    counter!(
        "order_reconciler_stream_events_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a liveness signal.
pub fn record_liveness_signal() {
    counter!("order_reconciler_liveness_signals_total").increment(1);
}

/// Record a transport error or close.
pub fn record_transport_error(kind: &'static str) {
    counter!(
        "order_reconciler_transport_errors_total",
        "kind" => kind
    )
    .increment(1);
}

/// Update the connectivity gauge.
pub fn set_connectivity_state(value: f64) {
    gauge!("order_reconciler_connectivity_state").set(value);
}

/// Record a fallback scheduler tick.
pub fn record_fallback_tick(action: FallbackAction) {
    counter!(
        "order_reconciler_fallback_ticks_total",
        "action" => action.as_str()
    )
    .increment(1);
}

/// Record a snapshot refetch and its latency.
pub fn record_refetch(view: ViewKind, success: bool, duration: Duration) {
    counter!(
        "order_reconciler_refetches_total",
        "view" => view.as_str(),
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    histogram!(
        "order_reconciler_refetch_seconds",
        "view" => view.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
