//! Push connectivity state, written by the stream connection and read by
//! the fallback scheduler and health endpoints.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::infrastructure::metrics;

/// Connectivity of the push subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    /// Subscription opened or reopening, not yet confirmed.
    Connecting,
    /// A liveness signal has been received.
    Live,
    /// Transport errored or closed.
    Disconnected,
}

impl ConnectivityState {
    const fn gauge_value(self) -> f64 {
        match self {
            Self::Connecting => 0.0,
            Self::Live => 1.0,
            Self::Disconnected => 2.0,
        }
    }
}

/// Shared connectivity of one session.
#[derive(Debug)]
pub struct Connectivity {
    state: RwLock<ConnectivityState>,
    last_live_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    liveness_signals: AtomicU64,
    disconnects: AtomicU64,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}

impl Connectivity {
    /// Create in the `Connecting` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RwLock::new(ConnectivityState::Connecting),
            last_live_at: RwLock::new(None),
            last_error: RwLock::new(None),
            liveness_signals: AtomicU64::new(0),
            disconnects: AtomicU64::new(0),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        *self.state.read()
    }

    /// Whether the stream is confirmed live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.state() == ConnectivityState::Live
    }

    /// Transport (re)opened; waiting for confirmation.
    pub fn mark_connecting(&self) {
        self.set_state(ConnectivityState::Connecting);
    }

    /// A liveness signal arrived.
    pub fn mark_live(&self) {
        self.liveness_signals.fetch_add(1, Ordering::Relaxed);
        *self.last_live_at.write() = Some(Utc::now());
        *self.last_error.write() = None;
        self.set_state(ConnectivityState::Live);
    }

    /// Transport errored or closed.
    pub fn mark_disconnected(&self, reason: Option<String>) {
        if self.state() != ConnectivityState::Disconnected {
            self.disconnects.fetch_add(1, Ordering::Relaxed);
        }
        if reason.is_some() {
            *self.last_error.write() = reason;
        }
        self.set_state(ConnectivityState::Disconnected);
    }

    /// Last time a liveness signal arrived.
    #[must_use]
    pub fn last_live_at(&self) -> Option<DateTime<Utc>> {
        *self.last_live_at.read()
    }

    /// Last transport error since the stream was last live.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Liveness signals received.
    #[must_use]
    pub fn liveness_signals(&self) -> u64 {
        self.liveness_signals.load(Ordering::Relaxed)
    }

    /// Transitions into `Disconnected`.
    #[must_use]
    pub fn disconnects(&self) -> u64 {
        self.disconnects.load(Ordering::Relaxed)
    }

    fn set_state(&self, state: ConnectivityState) {
        *self.state.write() = state;
        metrics::set_connectivity_state(state.gauge_value());
    }
}
