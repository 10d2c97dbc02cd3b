//! Health Check, Metrics and View Endpoints
//!
//! HTTP endpoint for health checks, connectivity reporting, Prometheus
//! metrics and read access to the cached views.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status with per-view freshness
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (a session is attached)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /views/{kind}` - Cached view (`orders`, `daily-sales`, `metrics`)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{ConnectivityState, EntryStatus, ReconciliationController};
use crate::domain::views::{CachedView, ViewKind};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Active workspace, if attached.
    pub workspace_id: Option<String>,
    /// Push connectivity of the active session.
    pub connectivity: Option<ConnectivityState>,
    /// Last time the stream confirmed liveness.
    pub last_live_at: Option<DateTime<Utc>>,
    /// Last transport error reported.
    pub last_error: Option<String>,
    /// Freshness of each cached view.
    pub views: Vec<ViewHealth>,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Stream live, views served from the push path.
    Healthy,
    /// Attached but relying on fallback polling.
    Degraded,
    /// No session attached.
    Unhealthy,
}

/// Freshness of one view.
#[derive(Debug, Clone, Serialize)]
pub struct ViewHealth {
    /// View kind.
    pub kind: ViewKind,
    /// Entry status; `None` until the first load lands.
    pub entry: Option<EntryStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ViewResponse<'a> {
    kind: ViewKind,
    #[serde(flatten)]
    status: EntryStatus,
    data: &'a CachedView,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    controller: Arc<ReconciliationController>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, controller: Arc<ReconciliationController>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            controller,
        }
    }
}

/// Router with every endpoint, bound to `state`.
pub fn build_router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/views/{kind}", get(view_handler))
        .with_state(state)
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = build_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let attached = !state.controller.is_disposed() && state.controller.current_selection().is_some();
    if attached {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

async fn view_handler(
    State(state): State<Arc<HealthServerState>>,
    Path(kind): Path<String>,
) -> Response {
    let Ok(kind) = kind.parse::<ViewKind>() else {
        return (StatusCode::NOT_FOUND, format!("unknown view: {kind}")).into_response();
    };
    let Some(descriptors) = state.controller.descriptors() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "no active session").into_response();
    };
    let Some(entry) = state.controller.store().entry(descriptors.get(kind)) else {
        return (StatusCode::NOT_FOUND, "view not loaded yet").into_response();
    };

    Json(ViewResponse {
        kind,
        status: EntryStatus::from(&entry),
        data: &entry.view,
    })
    .into_response()
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let controller = &state.controller;
    let selection = controller.current_selection();
    let connectivity = controller.connectivity_handle();
    let descriptors = controller.descriptors();

    let views = ViewKind::ALL
        .iter()
        .map(|&kind| ViewHealth {
            kind,
            entry: descriptors
                .as_ref()
                .and_then(|d| controller.store().status(d.get(kind))),
        })
        .collect();

    let connectivity_state = connectivity.as_ref().map(|c| c.state());
    HealthResponse {
        status: determine_health_status(controller.is_disposed(), connectivity_state),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        workspace_id: selection.map(|s| s.workspace_id.to_string()),
        connectivity: connectivity_state,
        last_live_at: connectivity.as_ref().and_then(|c| c.last_live_at()),
        last_error: connectivity.as_ref().and_then(|c| c.last_error()),
        views,
    }
}

const fn determine_health_status(
    disposed: bool,
    connectivity: Option<ConnectivityState>,
) -> HealthStatus {
    match (disposed, connectivity) {
        (false, Some(ConnectivityState::Live)) => HealthStatus::Healthy,
        (false, Some(_)) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
