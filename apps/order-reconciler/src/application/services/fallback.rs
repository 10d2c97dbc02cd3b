//! Fallback Scheduler
//!
//! Periodic timer that keeps cache entries eventually consistent while the
//! push stream is not confirmed live. Every tick reads the connectivity
//! state: when live the tick is a no-op, otherwise the session entries are
//! invalidated and refetched. The timer runs either way.
//!
//! The scheduler only reads connectivity; it never writes it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use crate::application::services::connectivity::Connectivity;
use crate::application::services::refetch::{RefetchSummary, Refetcher};
use crate::domain::views::SessionDescriptors;
use crate::infrastructure::metrics::{self, FallbackAction};

/// Default polling interval.
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_secs(30);

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Stream live; nothing done.
    Suppressed,
    /// Entries invalidated and refetched.
    Refetched(RefetchSummary),
}

/// The per-tick decision and action, independent of the timer.
#[derive(Debug, Clone)]
pub struct FallbackTick {
    connectivity: Arc<Connectivity>,
    refetcher: Refetcher,
    descriptors: SessionDescriptors,
}

impl FallbackTick {
    /// Create a tick action.
    #[must_use]
    pub const fn new(
        connectivity: Arc<Connectivity>,
        refetcher: Refetcher,
        descriptors: SessionDescriptors,
    ) -> Self {
        Self {
            connectivity,
            refetcher,
            descriptors,
        }
    }

    /// Run one tick.
    pub async fn run(&self) -> TickAction {
        if self.connectivity.is_live() {
            metrics::record_fallback_tick(FallbackAction::Suppressed);
            debug!("stream live, fallback tick suppressed");
            return TickAction::Suppressed;
        }

        metrics::record_fallback_tick(FallbackAction::Fired);
        self.refetcher.invalidate_all(&self.descriptors);
        let summary = self.refetcher.refetch_all(&self.descriptors).await;
        info!(
            state = ?self.connectivity.state(),
            replaced = summary.replaced,
            failed = summary.failed,
            "fallback refetch"
        );
        TickAction::Refetched(summary)
    }
}

/// Running fallback timer.
#[derive(Debug)]
pub struct FallbackScheduler {
    cancel: CancellationToken,
}

impl FallbackScheduler {
    /// Start the timer. The first tick fires one `period` after start.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(tick: FallbackTick, period: Duration, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let period = period.max(Duration::from_millis(1));
        let task_cancel = cancel.clone();
        let workspace_id = tick.descriptors.orders.workspace_id.clone();

        tokio::spawn(
            async move {
                let mut timer = interval_at(Instant::now() + period, period);
                timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        biased;
                        () = task_cancel.cancelled() => break,
                        _ = timer.tick() => {
                            tokio::select! {
                                biased;
                                () = task_cancel.cancelled() => break,
                                _ = tick.run() => {}
                            }
                        }
                    }
                }
                debug!("fallback scheduler stopped");
            }
            .instrument(info_span!("fallback", %workspace_id)),
        );

        Self { cancel }
    }

    /// Stop the timer. Idempotent; an in-flight refetch is abandoned.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Whether [`stop`](Self::stop) has run or the parent was cancelled.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for FallbackScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
