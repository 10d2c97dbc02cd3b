//! Snapshot Source Port (Driven Port)
//!
//! Interface for the REST query boundary that serves full snapshots of the
//! source of truth. One query per view kind; a successful response replaces
//! the matching cache entry.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{Order, WorkspaceId};
use crate::domain::views::{DailyBucket, DailyBucketSeries, MetricsSnapshot, OrdersListView};
use crate::domain::window::DateWindow;

// =============================================================================
// Queries
// =============================================================================

/// Orders query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrdersQuery {
    /// Workspace.
    pub workspace_id: WorkspaceId,
    /// Inclusive lower bound.
    pub date_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub date_to: Option<DateTime<Utc>>,
    /// Page size.
    pub limit: usize,
    /// Whether cancelled orders are included.
    pub include_cancelled: bool,
}

/// Daily sales query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailySalesQuery {
    /// Workspace.
    pub workspace_id: WorkspaceId,
    /// Reporting period.
    pub window: DateWindow,
}

/// Metrics query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsQuery {
    /// Workspace.
    pub workspace_id: WorkspaceId,
    /// Period length in days.
    pub window_days: u32,
    /// Reporting period.
    pub window: DateWindow,
}

// =============================================================================
// Responses
// =============================================================================

/// Paging information of an orders page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    /// Orders matching the query.
    #[serde(default)]
    pub total: u64,
    /// Offset of this page.
    #[serde(default)]
    pub offset: u64,
    /// Page size.
    #[serde(default)]
    pub limit: u64,
}

/// One page of orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdersPage {
    /// Orders, most-recent-first.
    pub orders: Vec<Order>,
    /// Paging information.
    #[serde(default)]
    pub paging: Paging,
}

impl OrdersPage {
    /// Convert into a list view of `capacity` orders.
    #[must_use]
    pub fn into_view(self, capacity: usize) -> OrdersListView {
        OrdersListView::from_page(self.orders, capacity, self.paging.total)
    }
}

/// One day of the daily sales report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySalesRow {
    /// Calendar date.
    pub date: NaiveDate,
    /// Units sold.
    #[serde(default)]
    pub sales: u64,
    /// Revenue.
    #[serde(default)]
    pub revenue: Decimal,
    /// Number of orders.
    #[serde(default)]
    pub orders: u64,
}

/// Daily sales report.
///
/// The report's own totals are ignored when building a series; totals are
/// recomputed from the rows so they always match the buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySalesReport {
    /// Per-day rows.
    pub daily_sales: Vec<DailySalesRow>,
    /// Number of orders.
    #[serde(default)]
    pub total_orders: u64,
    /// Units sold.
    #[serde(default)]
    pub total_sales: u64,
    /// Revenue.
    #[serde(default)]
    pub total_revenue: Decimal,
}

impl DailySalesReport {
    /// Convert into a series over `window`.
    #[must_use]
    pub fn into_series(self, window: DateWindow) -> DailyBucketSeries {
        DailyBucketSeries::from_days(
            window,
            self.daily_sales.into_iter().map(|row| {
                (
                    row.date,
                    DailyBucket {
                        units_sold: row.sales,
                        revenue: row.revenue,
                        order_count: row.orders,
                    },
                )
            }),
        )
    }
}

/// Metrics report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    /// Revenue.
    #[serde(default)]
    pub total_revenue: Decimal,
    /// Units sold.
    #[serde(default, alias = "totalUnits")]
    pub total_units_sold: u64,
    /// Number of orders.
    #[serde(default, alias = "totalSales")]
    pub total_orders: u64,
    /// When the source last synchronised.
    #[serde(default)]
    pub last_sync: Option<DateTime<Utc>>,
}

impl From<MetricsReport> for MetricsSnapshot {
    fn from(report: MetricsReport) -> Self {
        Self {
            total_revenue: report.total_revenue,
            total_units_sold: report.total_units_sold,
            total_orders: report.total_orders,
            last_sync: report.last_sync,
        }
    }
}

// =============================================================================
// Port
// =============================================================================

/// Snapshot source errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SnapshotError {
    /// Request could not be sent or timed out.
    #[error("network error: {0}")]
    Network(String),

    /// Source answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

/// REST query boundary.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetch one page of orders.
    async fn fetch_orders(&self, query: &OrdersQuery) -> Result<OrdersPage, SnapshotError>;

    /// Fetch the daily sales report.
    async fn fetch_daily_sales(
        &self,
        query: &DailySalesQuery,
    ) -> Result<DailySalesReport, SnapshotError>;

    /// Fetch the metrics report.
    async fn fetch_metrics(&self, query: &MetricsQuery) -> Result<MetricsReport, SnapshotError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_report_totals_are_recomputed() {
        let report: DailySalesReport = serde_json::from_str(
            r#"{
                "dailySales": [
                    {"date": "2024-01-02", "sales": 3, "revenue": 30.5, "orders": 2},
                    {"date": "2024-01-01", "sales": 1, "revenue": 10, "orders": 1}
                ],
                "totalOrders": 99,
                "totalSales": 99,
                "totalRevenue": 999
            }"#,
        )
        .unwrap();
        let window = DateWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
        );

        let series = report.into_series(window);

        assert_eq!(series.totals().total_orders, 3);
        assert_eq!(series.totals().total_units, 4);
        assert_eq!(series.totals().total_revenue, Decimal::new(405, 1));
    }

    #[test]
    fn metrics_report_accepts_legacy_field_names() {
        let report: MetricsReport = serde_json::from_str(
            r#"{"totalRevenue": 120.0, "totalSales": 4, "lastSync": "2024-01-01T12:00:00.000Z"}"#,
        )
        .unwrap();

        let snapshot = MetricsSnapshot::from(report);
        assert_eq!(snapshot.total_orders, 4);
        assert_eq!(snapshot.total_units_sold, 0);
        assert!(snapshot.last_sync.is_some());
    }

    #[test]
    fn orders_page_defaults_missing_paging() {
        let page: OrdersPage = serde_json::from_str(
            r#"{"orders":[{"id":"1","dateCreated":null,"totalAmount":5,"items":[]}]}"#,
        )
        .unwrap();
        let view = page.into_view(50);
        assert_eq!(view.total(), 1);
    }
}
