//! Scripted fakes for the push transport and the REST query boundary.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use order_reconciler::application::ports::{
    DailySalesQuery, DailySalesReport, MetricsQuery, MetricsReport, OrdersPage, OrdersQuery,
    Paging,
};
use order_reconciler::{
    PushTransport, SnapshotError, SnapshotSource, TransportError, TransportEvent, WorkspaceId,
};

const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// =============================================================================
// Push transport
// =============================================================================

struct Subscription {
    workspace_id: WorkspaceId,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

/// Transport that hands every subscription to the test, which then
/// scripts the frames.
#[derive(Default)]
pub struct ScriptedTransport {
    subscriptions: Mutex<Vec<Subscription>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn workspaces(&self) -> Vec<WorkspaceId> {
        self.subscriptions
            .lock()
            .iter()
            .map(|s| s.workspace_id.clone())
            .collect()
    }

    /// Whether subscription `index` was cancelled by its owner.
    pub fn is_cancelled(&self, index: usize) -> bool {
        self.subscriptions.lock()[index].cancel.is_cancelled()
    }

    /// Wait until `count` subscriptions exist and return the sender of the
    /// latest one.
    pub async fn connected(&self, count: usize) -> mpsc::Sender<TransportEvent> {
        wait_for("push subscription", || self.subscription_count() >= count).await;
        self.sender(count - 1)
    }

    pub fn sender(&self, index: usize) -> mpsc::Sender<TransportEvent> {
        self.subscriptions.lock()[index].events.clone()
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn run(
        &self,
        workspace_id: WorkspaceId,
        events: mpsc::Sender<TransportEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        self.subscriptions.lock().push(Subscription {
            workspace_id,
            events,
            cancel: cancel.clone(),
        });
        cancel.cancelled().await;
        Ok(())
    }
}

// =============================================================================
// Snapshot source
// =============================================================================

/// In-memory REST boundary with switchable responses and call counters.
pub struct FakeSource {
    orders: Mutex<Result<OrdersPage, SnapshotError>>,
    daily_sales: Mutex<Result<DailySalesReport, SnapshotError>>,
    metrics: Mutex<Result<MetricsReport, SnapshotError>>,
    order_calls: AtomicUsize,
    daily_sales_calls: AtomicUsize,
    metrics_calls: AtomicUsize,
    last_orders_query: Mutex<Option<OrdersQuery>>,
}

impl FakeSource {
    /// Source returning empty snapshots.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            orders: Mutex::new(Ok(OrdersPage {
                orders: Vec::new(),
                paging: Paging::default(),
            })),
            daily_sales: Mutex::new(Ok(DailySalesReport {
                daily_sales: Vec::new(),
                total_orders: 0,
                total_sales: 0,
                total_revenue: Decimal::ZERO,
            })),
            metrics: Mutex::new(Ok(MetricsReport {
                total_revenue: Decimal::ZERO,
                total_units_sold: 0,
                total_orders: 0,
                last_sync: None,
            })),
            order_calls: AtomicUsize::new(0),
            daily_sales_calls: AtomicUsize::new(0),
            metrics_calls: AtomicUsize::new(0),
            last_orders_query: Mutex::new(None),
        })
    }

    pub fn set_orders(&self, page: Result<OrdersPage, SnapshotError>) {
        *self.orders.lock() = page;
    }

    pub fn set_metrics(&self, report: Result<MetricsReport, SnapshotError>) {
        *self.metrics.lock() = report;
    }

    pub fn set_daily_sales(&self, report: Result<DailySalesReport, SnapshotError>) {
        *self.daily_sales.lock() = report;
    }

    /// Number of queries across all three endpoints.
    pub fn calls(&self) -> usize {
        self.order_calls.load(Ordering::SeqCst)
            + self.daily_sales_calls.load(Ordering::SeqCst)
            + self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn last_orders_query(&self) -> Option<OrdersQuery> {
        self.last_orders_query.lock().clone()
    }
}

#[async_trait]
impl SnapshotSource for FakeSource {
    async fn fetch_orders(&self, query: &OrdersQuery) -> Result<OrdersPage, SnapshotError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_orders_query.lock() = Some(query.clone());
        self.orders.lock().clone()
    }

    async fn fetch_daily_sales(
        &self,
        _query: &DailySalesQuery,
    ) -> Result<DailySalesReport, SnapshotError> {
        self.daily_sales_calls.fetch_add(1, Ordering::SeqCst);
        self.daily_sales.lock().clone()
    }

    async fn fetch_metrics(&self, _query: &MetricsQuery) -> Result<MetricsReport, SnapshotError> {
        self.metrics_calls.fetch_add(1, Ordering::SeqCst);
        self.metrics.lock().clone()
    }
}

// =============================================================================
// Frames
// =============================================================================

/// Order frame as the push source sends it.
pub fn order_frame(workspace: &str, id: &str, created: &str, amount: &str, units: u64) -> String {
    json!({
        "type": "order",
        "workspaceId": workspace,
        "order": {
            "id": id,
            "dateCreated": created,
            "totalAmount": amount,
            "items": [{"quantity": units}],
            "status": "paid"
        }
    })
    .to_string()
}

pub fn ready_frame() -> String {
    json!({"type": "ready"}).to_string()
}

pub fn ping_frame() -> String {
    json!({"type": "ping"}).to_string()
}

/// Send one text frame.
pub async fn send(events: &mpsc::Sender<TransportEvent>, frame: String) {
    events.send(TransportEvent::Message(frame)).await.unwrap();
}
