//! Reconciliation Controller
//!
//! Owns exactly one stream connection and one fallback scheduler for the
//! active (workspace, list window, period) selection. Changing any part of
//! the selection tears the session down and builds a new one; disposing
//! tears it down for good.
//!
//! A session lifecycle:
//!
//! 1. Close the previous stream and stop its scheduler.
//! 2. Reset the processed keys; drop cache entries of other sessions.
//! 3. Open the stream, start the initial load and the fallback timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span};

use crate::application::ports::{PushTransport, SnapshotSource};
use crate::application::services::cache_store::CacheStore;
use crate::application::services::connectivity::{Connectivity, ConnectivityState};
use crate::application::services::fallback::{
    DEFAULT_FALLBACK_INTERVAL, FallbackScheduler, FallbackTick,
};
use crate::application::services::refetch::Refetcher;
use crate::application::services::stream_connection::{StreamConnection, StreamScope};
use crate::domain::dedup::ProcessedKeySet;
use crate::domain::order::WorkspaceId;
use crate::domain::views::SessionDescriptors;
use crate::domain::window::{DateWindow, ListWindow, PeriodSelection, RangeFilter};

/// Requested selection, before "today" is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Workspace to follow.
    pub workspace_id: WorkspaceId,
    /// Recent-activity list window.
    pub list_window: ListWindow,
    /// Reporting period.
    pub period: PeriodSelection,
}

impl Selection {
    /// Default windows (today, last 30 days) for `workspace_id`.
    #[must_use]
    pub fn for_workspace(workspace_id: WorkspaceId) -> Self {
        Self {
            workspace_id,
            list_window: ListWindow::default(),
            period: PeriodSelection::default(),
        }
    }

    /// Resolve relative windows against `today`.
    #[must_use]
    pub fn resolve(&self, today: NaiveDate) -> ResolvedSelection {
        ResolvedSelection {
            workspace_id: self.workspace_id.clone(),
            list_window: self.list_window.resolve(today),
            period: self.period.resolve(today),
        }
    }
}

/// Selection with concrete windows. Sessions are keyed by this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    /// Workspace to follow.
    pub workspace_id: WorkspaceId,
    /// List window; `None` is unbounded.
    pub list_window: Option<DateWindow>,
    /// Reporting period.
    pub period: DateWindow,
}

/// Session-independent controller settings.
#[derive(Debug, Clone, Copy)]
pub struct ControllerSettings {
    /// Page size and capacity of the recent-orders list.
    pub list_limit: usize,
    /// Fallback polling interval.
    pub fallback_interval: Duration,
    /// Cap of the processed key set (0 = unbounded).
    pub processed_keys_cap: usize,
    /// Workspace time zone.
    pub time_zone: Tz,
    /// Whether the orders query includes cancelled orders.
    pub include_cancelled: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            list_limit: 50,
            fallback_interval: DEFAULT_FALLBACK_INTERVAL,
            processed_keys_cap: 0,
            time_zone: chrono_tz::America::Sao_Paulo,
            include_cancelled: false,
        }
    }
}

/// Result of [`ReconciliationController::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachOutcome {
    /// A new session was started.
    Attached,
    /// The selection equals the active one; nothing changed.
    Unchanged,
    /// The controller has been disposed.
    Disposed,
}

struct Session {
    selection: ResolvedSelection,
    descriptors: SessionDescriptors,
    connectivity: Arc<Connectivity>,
    stream: StreamConnection,
    scheduler: FallbackScheduler,
    cancel: CancellationToken,
}

impl Session {
    fn teardown(&self) {
        self.stream.close();
        self.scheduler.stop();
        self.cancel.cancel();
    }
}

#[derive(Default)]
struct ControllerState {
    session: Option<Session>,
    disposed: bool,
}

/// Top-level orchestrator of reconciliation sessions.
pub struct ReconciliationController {
    settings: ControllerSettings,
    transport: Arc<dyn PushTransport>,
    refetcher: Refetcher,
    store: Arc<CacheStore>,
    keys: Arc<Mutex<ProcessedKeySet>>,
    state: Mutex<ControllerState>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ReconciliationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationController")
            .field("settings", &self.settings)
            .field("selection", &self.current_selection())
            .finish_non_exhaustive()
    }
}

impl ReconciliationController {
    /// Create a controller with its own cache store.
    #[must_use]
    pub fn new(
        settings: ControllerSettings,
        transport: Arc<dyn PushTransport>,
        source: Arc<dyn SnapshotSource>,
    ) -> Self {
        Self::with_store(settings, transport, source, Arc::new(CacheStore::new()))
    }

    /// Create a controller writing into `store`.
    #[must_use]
    pub fn with_store(
        settings: ControllerSettings,
        transport: Arc<dyn PushTransport>,
        source: Arc<dyn SnapshotSource>,
        store: Arc<CacheStore>,
    ) -> Self {
        Self {
            settings,
            transport,
            refetcher: Refetcher::new(source, Arc::clone(&store)),
            store,
            keys: Arc::new(Mutex::new(ProcessedKeySet::with_cap(
                settings.processed_keys_cap,
            ))),
            state: Mutex::new(ControllerState::default()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Attach to `selection`, resolving "today" in the workspace time zone.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn attach(&self, selection: &Selection) -> AttachOutcome {
        let today = RangeFilter::new(self.settings.time_zone).today(Utc::now());
        self.attach_resolved(selection.resolve(today))
    }

    /// Attach to an already resolved selection.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn attach_resolved(&self, selection: ResolvedSelection) -> AttachOutcome {
        let mut state = self.state.lock();
        if state.disposed {
            return AttachOutcome::Disposed;
        }
        if state
            .session
            .as_ref()
            .is_some_and(|session| session.selection == selection)
        {
            return AttachOutcome::Unchanged;
        }

        if let Some(previous) = state.session.take() {
            previous.teardown();
            info!(
                workspace_id = %previous.selection.workspace_id,
                "reconciliation session torn down"
            );
        }

        self.keys.lock().reset();
        let session = self.start_session(selection);
        self.store.retain(&session.descriptors.all());
        state.session = Some(session);
        AttachOutcome::Attached
    }

    fn start_session(&self, selection: ResolvedSelection) -> Session {
        let settings = &self.settings;
        let filter = RangeFilter::new(settings.time_zone);
        let descriptors = SessionDescriptors::new(
            &selection.workspace_id,
            selection.list_window,
            selection.period,
            settings.list_limit,
            settings.include_cancelled,
            settings.time_zone,
        );
        let cancel = self.shutdown.child_token();
        let connectivity = Arc::new(Connectivity::new());

        info!(
            workspace_id = %selection.workspace_id,
            period_from = %selection.period.from(),
            period_to = %selection.period.to(),
            list_window = ?selection.list_window,
            "starting reconciliation session"
        );

        let stream = StreamConnection::open(
            StreamScope {
                workspace_id: selection.workspace_id.clone(),
                descriptors: descriptors.clone(),
                list_window: selection.list_window,
                period: selection.period,
                list_capacity: settings.list_limit,
                filter,
            },
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            Arc::clone(&self.keys),
            Arc::clone(&connectivity),
            &cancel,
        );

        let refetcher = self.refetcher.clone();
        let initial = descriptors.clone();
        let load_cancel = cancel.clone();
        tokio::spawn(
            async move {
                tokio::select! {
                    biased;
                    () = load_cancel.cancelled() => debug!("initial load abandoned"),
                    summary = refetcher.refetch_all(&initial) => info!(
                        replaced = summary.replaced,
                        failed = summary.failed,
                        "initial load finished"
                    ),
                }
            }
            .instrument(info_span!("initial_load", workspace_id = %selection.workspace_id)),
        );

        let scheduler = FallbackScheduler::start(
            FallbackTick::new(
                Arc::clone(&connectivity),
                self.refetcher.clone(),
                descriptors.clone(),
            ),
            settings.fallback_interval,
            &cancel,
        );

        Session {
            selection,
            descriptors,
            connectivity,
            stream,
            scheduler,
            cancel,
        }
    }

    /// Tear down the active session and refuse further attaches.
    /// Safe to call more than once.
    pub fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        if let Some(session) = state.session.take() {
            session.teardown();
        }
        self.shutdown.cancel();
        info!("reconciliation controller disposed");
    }

    /// Whether [`dispose`](Self::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Connectivity of the active session.
    #[must_use]
    pub fn connectivity(&self) -> Option<ConnectivityState> {
        self.state
            .lock()
            .session
            .as_ref()
            .map(|session| session.connectivity.state())
    }

    /// Shared connectivity handle of the active session.
    #[must_use]
    pub fn connectivity_handle(&self) -> Option<Arc<Connectivity>> {
        self.state
            .lock()
            .session
            .as_ref()
            .map(|session| Arc::clone(&session.connectivity))
    }

    /// Descriptors of the active session.
    #[must_use]
    pub fn descriptors(&self) -> Option<SessionDescriptors> {
        self.state
            .lock()
            .session
            .as_ref()
            .map(|session| session.descriptors.clone())
    }

    /// Active selection.
    #[must_use]
    pub fn current_selection(&self) -> Option<ResolvedSelection> {
        self.state
            .lock()
            .session
            .as_ref()
            .map(|session| session.selection.clone())
    }

    /// Cache store read by collaborators.
    #[must_use]
    pub const fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Number of processed keys in the active session.
    #[must_use]
    pub fn processed_keys(&self) -> usize {
        self.keys.lock().len()
    }
}

impl Drop for ReconciliationController {
    fn drop(&mut self) {
        self.dispose();
    }
}
