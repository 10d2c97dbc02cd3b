//! Stream Connection
//!
//! Lifecycle of one push subscription scoped to a workspace. The transport
//! runs in its own task and forwards [`TransportEvent`]s over a channel; a
//! single consumer loop classifies them and dispatches merges, one event at
//! a time in arrival order.
//!
//! ```text
//! transport task ──mpsc──► consumer loop ──► EventRouter
//!                                              ├─ workspace check
//!                                              ├─ ProcessedKeySet
//!                                              ├─ RangeFilter (list, period)
//!                                              └─ CacheStore::merge
//! ```
//!
//! Closing takes the apply gate, so once [`StreamConnection::close`]
//! returns no further merge can happen, even if the transport delivers a
//! final frame during shutdown.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, trace, warn};
use uuid::Uuid;

use crate::application::ports::{PushTransport, TransportEvent};
use crate::application::services::cache_store::{CacheStore, MergeResult};
use crate::application::services::connectivity::Connectivity;
use crate::domain::dedup::ProcessedKeySet;
use crate::domain::merge::{MergeContext, merge_view};
use crate::domain::order::WorkspaceId;
use crate::domain::stream::{self, OrderEvent, StreamMessage};
use crate::domain::views::{CachedView, QueryDescriptor, SessionDescriptors};
use crate::domain::window::{DateWindow, RangeFilter};
use crate::infrastructure::metrics::{self, StreamOutcome};

const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// What a stream connection is scoped to.
#[derive(Debug, Clone)]
pub struct StreamScope {
    /// Active workspace.
    pub workspace_id: WorkspaceId,
    /// Descriptors merged into.
    pub descriptors: SessionDescriptors,
    /// List window; `None` accepts every order.
    pub list_window: Option<DateWindow>,
    /// Reporting period.
    pub period: DateWindow,
    /// Capacity of the recent-orders list.
    pub list_capacity: usize,
    /// Time zone bound filter.
    pub filter: RangeFilter,
}

/// Result of handling one classified message or lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Order passed dedup and fell inside at least one window.
    Applied {
        /// Inside the list window.
        list: bool,
        /// Inside the period window.
        period: bool,
    },
    /// Order already processed this session.
    Duplicate,
    /// Order addressed to another workspace.
    WorkspaceMismatch,
    /// Order outside both windows.
    OutOfWindow,
    /// Frame could not be decoded.
    Malformed,
    /// Liveness signal.
    Liveness,
    /// Transport opened.
    Opened,
    /// Transport errored or closed.
    Disconnected,
}

/// Classifies events and routes orders into the cache.
#[derive(Debug, Clone)]
pub struct EventRouter {
    scope: Arc<StreamScope>,
    store: Arc<CacheStore>,
    keys: Arc<Mutex<ProcessedKeySet>>,
    connectivity: Arc<Connectivity>,
}

impl EventRouter {
    /// Create a router.
    #[must_use]
    pub const fn new(
        scope: Arc<StreamScope>,
        store: Arc<CacheStore>,
        keys: Arc<Mutex<ProcessedKeySet>>,
        connectivity: Arc<Connectivity>,
    ) -> Self {
        Self {
            scope,
            store,
            keys,
            connectivity,
        }
    }

    /// Handle one transport event. A frame may carry several messages and
    /// yields one outcome per message.
    pub fn handle(&self, event: TransportEvent) -> Vec<EventOutcome> {
        match event {
            TransportEvent::Opened => {
                self.connectivity.mark_connecting();
                debug!(workspace_id = %self.scope.workspace_id, "push transport opened");
                vec![EventOutcome::Opened]
            }
            TransportEvent::Error(reason) => {
                warn!(
                    workspace_id = %self.scope.workspace_id,
                    error = %reason,
                    "push transport error"
                );
                metrics::record_transport_error("error");
                self.connectivity.mark_disconnected(Some(reason));
                vec![EventOutcome::Disconnected]
            }
            TransportEvent::Closed => {
                info!(workspace_id = %self.scope.workspace_id, "push transport closed");
                metrics::record_transport_error("closed");
                self.connectivity.mark_disconnected(None);
                vec![EventOutcome::Disconnected]
            }
            TransportEvent::Message(text) => match stream::decode(&text) {
                Ok(messages) => messages
                    .into_iter()
                    .map(|decoded| match decoded {
                        Ok(message) => self.handle_message(message),
                        Err(e) => Self::discard_malformed(&e, "discarding malformed stream message"),
                    })
                    .collect(),
                Err(e) => vec![Self::discard_malformed(&e, "discarding malformed stream frame")],
            },
        }
    }

    fn discard_malformed(error: &stream::CodecError, message: &'static str) -> EventOutcome {
        debug!(error = %error, "{message}");
        metrics::record_stream_event(StreamOutcome::Malformed);
        EventOutcome::Malformed
    }

    fn handle_message(&self, message: StreamMessage) -> EventOutcome {
        match message {
            StreamMessage::Liveness(kind) => {
                if !self.connectivity.is_live() {
                    info!(workspace_id = %self.scope.workspace_id, ?kind, "push stream live");
                }
                metrics::record_liveness_signal();
                self.connectivity.mark_live();
                EventOutcome::Liveness
            }
            StreamMessage::Order(event) => {
                let outcome = self.apply_order(event);
                metrics::record_stream_event(match outcome {
                    EventOutcome::Duplicate => StreamOutcome::Duplicate,
                    EventOutcome::WorkspaceMismatch => StreamOutcome::WorkspaceMismatch,
                    EventOutcome::OutOfWindow => StreamOutcome::OutOfWindow,
                    _ => StreamOutcome::Applied,
                });
                outcome
            }
        }
    }

    /// Route one order event through workspace check, dedup, window
    /// filters and merges.
    pub fn apply_order(&self, event: OrderEvent) -> EventOutcome {
        let scope = &self.scope;
        if event.workspace_id != scope.workspace_id {
            debug!(
                expected = %scope.workspace_id,
                received = %event.workspace_id,
                order_id = %event.order.id,
                "discarding order for another workspace"
            );
            return EventOutcome::WorkspaceMismatch;
        }

        if !self.keys.lock().mark_seen(event.order.id.clone()) {
            trace!(order_id = %event.order.id, "duplicate order delivery");
            return EventOutcome::Duplicate;
        }

        let order = &event.order;
        let ctx = MergeContext {
            list_capacity: scope.list_capacity,
            filter: scope.filter,
            applied_at: Utc::now(),
        };

        let in_list = scope
            .filter
            .in_list_window(scope.list_window.as_ref(), order.date_created);
        if in_list {
            self.merge_into(&scope.descriptors.orders, |view| merge_view(view, order, &ctx));
        }

        let in_period = scope.filter.in_period(&scope.period, order.date_created);
        if in_period {
            self.merge_into(&scope.descriptors.daily_sales, |view| {
                merge_view(view, order, &ctx)
            });
            self.merge_into(&scope.descriptors.metrics, |view| merge_view(view, order, &ctx));
        }

        if in_list || in_period {
            debug!(order_id = %order.id, in_list, in_period, "order applied");
            EventOutcome::Applied {
                list: in_list,
                period: in_period,
            }
        } else {
            trace!(order_id = %order.id, "order outside active windows");
            EventOutcome::OutOfWindow
        }
    }

    fn merge_into<F>(&self, descriptor: &QueryDescriptor, merge_fn: F)
    where
        F: FnOnce(&CachedView) -> CachedView,
    {
        if self.store.merge(descriptor, merge_fn) == MergeResult::Absent {
            trace!(%descriptor, "no cached view to merge into");
        }
    }
}

/// One open push subscription.
#[derive(Debug)]
pub struct StreamConnection {
    session_id: Uuid,
    workspace_id: WorkspaceId,
    gate: Arc<Mutex<bool>>,
    cancel: CancellationToken,
    connectivity: Arc<Connectivity>,
}

impl StreamConnection {
    /// Open a subscription and start the consumer loop.
    ///
    /// Must be called inside a Tokio runtime. The connection stops when
    /// closed, dropped, or when `parent` is cancelled.
    pub fn open(
        scope: StreamScope,
        transport: Arc<dyn PushTransport>,
        store: Arc<CacheStore>,
        keys: Arc<Mutex<ProcessedKeySet>>,
        connectivity: Arc<Connectivity>,
        parent: &CancellationToken,
    ) -> Self {
        let session_id = Uuid::new_v4();
        let workspace_id = scope.workspace_id.clone();
        let cancel = parent.child_token();
        let gate = Arc::new(Mutex::new(true));
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        connectivity.mark_connecting();
        info!(%session_id, %workspace_id, "opening push subscription");

        let span = info_span!("stream", %session_id, %workspace_id);

        let transport_cancel = cancel.clone();
        let transport_workspace = workspace_id.clone();
        tokio::spawn(
            async move {
                match transport.run(transport_workspace, tx, transport_cancel).await {
                    Ok(()) => debug!("push transport stopped"),
                    Err(e) => warn!(error = %e, "push transport gave up"),
                }
            }
            .instrument(span.clone()),
        );

        let router = EventRouter::new(Arc::new(scope), store, keys, Arc::clone(&connectivity));
        tokio::spawn(consume(rx, router, Arc::clone(&gate), cancel.clone()).instrument(span));

        Self {
            session_id,
            workspace_id,
            gate,
            cancel,
            connectivity,
        }
    }

    /// Stop classifying events and close the subscription.
    ///
    /// Idempotent. Returns once no merge is in flight.
    pub fn close(&self) {
        {
            let mut open = self.gate.lock();
            if !*open {
                return;
            }
            *open = false;
        }
        self.cancel.cancel();
        self.connectivity.mark_disconnected(None);
        info!(
            session_id = %self.session_id,
            workspace_id = %self.workspace_id,
            "push subscription closed"
        );
    }

    /// Whether [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !*self.gate.lock()
    }

    /// Session identifier used in logs.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Workspace this connection is scoped to.
    #[must_use]
    pub const fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn consume(
    mut events: mpsc::Receiver<TransportEvent>,
    router: EventRouter,
    gate: Arc<Mutex<bool>>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = events.recv() => event,
        };

        // A dropped sender means the transport task ended.
        let ended = event.is_none();
        let event = event.unwrap_or(TransportEvent::Closed);

        {
            let open = gate.lock();
            if !*open {
                break;
            }
            router.handle(event);
        }

        if ended {
            break;
        }
    }
    debug!("stream consumer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{LineItem, Order, OrderId};
    use crate::application::services::connectivity::ConnectivityState;
    use crate::domain::views::{MetricsSnapshot, OrdersListView};
    use chrono::{NaiveDate, TimeZone};
    use chrono_tz::America::Sao_Paulo;
    use rust_decimal::Decimal;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn router() -> (EventRouter, Arc<CacheStore>, Arc<Connectivity>) {
        let ws = WorkspaceId::new("ws-1");
        let period = DateWindow::new(day(1), day(2));
        let list_window = Some(DateWindow::single_day(day(2)));
        let descriptors = SessionDescriptors::new(&ws, list_window, period, 10, false, Sao_Paulo);
        let scope = StreamScope {
            workspace_id: ws,
            descriptors: descriptors.clone(),
            list_window,
            period,
            list_capacity: 10,
            filter: RangeFilter::new(Sao_Paulo),
        };

        let store = Arc::new(CacheStore::new());
        store.replace(descriptors.orders.clone(), CachedView::Orders(OrdersListView::empty(10)));
        store.replace(
            descriptors.metrics.clone(),
            CachedView::Metrics(MetricsSnapshot::default()),
        );

        let connectivity = Arc::new(Connectivity::new());
        let router = EventRouter::new(
            Arc::new(scope),
            Arc::clone(&store),
            Arc::new(Mutex::new(ProcessedKeySet::new())),
            Arc::clone(&connectivity),
        );
        (router, store, connectivity)
    }

    fn event(ws: &str, id: &str, d: u32) -> OrderEvent {
        OrderEvent {
            workspace_id: WorkspaceId::new(ws),
            order: Order::new(
                id,
                Some(Utc.with_ymd_and_hms(2024, 1, d, 15, 0, 0).unwrap()),
                Decimal::new(10, 0),
                vec![LineItem::with_quantity(1)],
            ),
        }
    }

    #[test]
    fn routes_by_window() {
        let (router, _, _) = router();

        assert_eq!(
            router.apply_order(event("ws-1", "a", 2)),
            EventOutcome::Applied { list: true, period: true }
        );
        assert_eq!(
            router.apply_order(event("ws-1", "b", 1)),
            EventOutcome::Applied { list: false, period: true }
        );
        assert_eq!(router.apply_order(event("ws-1", "c", 5)), EventOutcome::OutOfWindow);
    }

    #[test]
    fn discards_foreign_and_duplicate_orders() {
        let (router, store, _) = router();
        let metrics_descriptor = router.scope.descriptors.metrics.clone();

        assert_eq!(
            router.apply_order(event("ws-2", "a", 2)),
            EventOutcome::WorkspaceMismatch
        );
        router.apply_order(event("ws-1", "a", 2));
        assert_eq!(router.apply_order(event("ws-1", "a", 2)), EventOutcome::Duplicate);

        let view = store.get(&metrics_descriptor).unwrap();
        assert_eq!(view.as_metrics().unwrap().total_orders, 1);
    }

    #[test]
    fn lifecycle_events_drive_connectivity() {
        let (router, _, connectivity) = router();

        router.handle(TransportEvent::Message(r#"{"type":"ready"}"#.into()));
        assert_eq!(connectivity.state(), ConnectivityState::Live);

        assert_eq!(
            router.handle(TransportEvent::Message("{oops".into())),
            vec![EventOutcome::Malformed]
        );
        assert_eq!(connectivity.state(), ConnectivityState::Live);

        router.handle(TransportEvent::Error("reset".into()));
        assert_eq!(connectivity.state(), ConnectivityState::Disconnected);

        router.handle(TransportEvent::Opened);
        assert_eq!(connectivity.state(), ConnectivityState::Connecting);
    }

    #[test]
    fn bad_element_does_not_drop_batched_orders() {
        let (router, store, _) = router();
        let metrics_descriptor = router.scope.descriptors.metrics.clone();
        let frame = r#"[
            {"type":"order","workspaceId":"ws-1","order":{"id":"good","dateCreated":"2024-01-02T15:00:00Z","totalAmount":10,"items":[{"quantity":1}]}},
            {"type":"order","workspaceId":"ws-1"}
        ]"#;

        assert_eq!(
            router.handle(TransportEvent::Message(frame.into())),
            vec![
                EventOutcome::Applied { list: true, period: true },
                EventOutcome::Malformed
            ]
        );

        let view = store.get(&metrics_descriptor).unwrap();
        assert_eq!(view.as_metrics().unwrap().total_orders, 1);
        assert!(router.keys.lock().has(&OrderId::new("good")));
    }
}
