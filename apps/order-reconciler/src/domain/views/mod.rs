//! Derived Views
//!
//! The three cached view kinds a session maintains and the query
//! descriptors that address them:
//!
//! - [`OrdersListView`]: bounded, most-recent-first list of orders
//! - [`DailyBucketSeries`]: per-day aggregates over the reporting period
//! - [`MetricsSnapshot`]: one aggregate for the whole period
//!
//! Views are values. They are replaced wholesale or swapped for a merged
//! copy, never patched in place.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{Order, OrderId, WorkspaceId};
use super::window::DateWindow;

// =============================================================================
// View Kinds
// =============================================================================

/// Kind of derived view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewKind {
    /// Recent orders list.
    Orders,
    /// Per-day sales series.
    DailySales,
    /// Period metrics snapshot.
    Metrics,
}

impl ViewKind {
    /// All view kinds.
    pub const ALL: [Self; 3] = [Self::Orders, Self::DailySales, Self::Metrics];

    /// Label used in metrics and URLs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Orders => "orders",
            Self::DailySales => "daily-sales",
            Self::Metrics => "metrics",
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a view kind label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown view kind: {0}")]
pub struct UnknownViewKind(pub String);

impl FromStr for ViewKind {
    type Err = UnknownViewKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orders" => Ok(Self::Orders),
            "daily-sales" => Ok(Self::DailySales),
            "metrics" => Ok(Self::Metrics),
            other => Err(UnknownViewKind(other.to_string())),
        }
    }
}

// =============================================================================
// Query Descriptors
// =============================================================================

/// Window parameters of a query, one variant per view kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum QueryParams {
    /// Orders query.
    #[serde(rename_all = "camelCase")]
    Orders {
        /// Inclusive lower bound, `None` for an unbounded list.
        date_from: Option<DateTime<Utc>>,
        /// Inclusive upper bound, `None` for an unbounded list.
        date_to: Option<DateTime<Utc>>,
        /// Page size and list capacity.
        limit: usize,
        /// Whether cancelled orders are included.
        include_cancelled: bool,
    },
    /// Daily sales query.
    #[serde(rename_all = "camelCase")]
    DailySales {
        /// Reporting period.
        window: DateWindow,
    },
    /// Metrics query.
    #[serde(rename_all = "camelCase")]
    Metrics {
        /// Period length in days.
        window_days: u32,
        /// Reporting period.
        window: DateWindow,
    },
}

/// Address of one cache entry: workspace plus window parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDescriptor {
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Window parameters.
    pub params: QueryParams,
}

impl QueryDescriptor {
    /// Kind of view this descriptor addresses.
    #[must_use]
    pub const fn kind(&self) -> ViewKind {
        match self.params {
            QueryParams::Orders { .. } => ViewKind::Orders,
            QueryParams::DailySales { .. } => ViewKind::DailySales,
            QueryParams::Metrics { .. } => ViewKind::Metrics,
        }
    }
}

impl fmt::Display for QueryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.params {
            QueryParams::Orders {
                date_from,
                date_to,
                limit,
                ..
            } => match (date_from, date_to) {
                (Some(from), Some(to)) => write!(
                    f,
                    "orders:{}:{}..{}:{limit}",
                    self.workspace_id,
                    from.to_rfc3339(),
                    to.to_rfc3339()
                ),
                _ => write!(f, "orders:{}:all:{limit}", self.workspace_id),
            },
            QueryParams::DailySales { window } => write!(
                f,
                "daily-sales:{}:{}..{}",
                self.workspace_id,
                window.from(),
                window.to()
            ),
            QueryParams::Metrics {
                window_days,
                window,
            } => write!(
                f,
                "metrics:{}:{window_days}d:{}..{}",
                self.workspace_id,
                window.from(),
                window.to()
            ),
        }
    }
}

/// The three descriptors owned by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptors {
    /// Recent orders list.
    pub orders: QueryDescriptor,
    /// Per-day sales series.
    pub daily_sales: QueryDescriptor,
    /// Period metrics snapshot.
    pub metrics: QueryDescriptor,
}

impl SessionDescriptors {
    /// Build descriptors for a session.
    ///
    /// A list window is sent as instants spanning local start of its first
    /// day to the end of its last day in `tz`.
    #[must_use]
    pub fn new(
        workspace_id: &WorkspaceId,
        list_window: Option<DateWindow>,
        period: DateWindow,
        list_limit: usize,
        include_cancelled: bool,
        tz: Tz,
    ) -> Self {
        let (date_from, date_to) = list_window
            .map(|window| window.bounds(tz))
            .map_or((None, None), |(from, to)| (Some(from), Some(to)));

        Self {
            orders: QueryDescriptor {
                workspace_id: workspace_id.clone(),
                params: QueryParams::Orders {
                    date_from,
                    date_to,
                    limit: list_limit,
                    include_cancelled,
                },
            },
            daily_sales: QueryDescriptor {
                workspace_id: workspace_id.clone(),
                params: QueryParams::DailySales { window: period },
            },
            metrics: QueryDescriptor {
                workspace_id: workspace_id.clone(),
                params: QueryParams::Metrics {
                    window_days: period.days(),
                    window: period,
                },
            },
        }
    }

    /// All three descriptors.
    #[must_use]
    pub fn all(&self) -> [&QueryDescriptor; 3] {
        [&self.orders, &self.daily_sales, &self.metrics]
    }

    /// Descriptor for `kind`.
    #[must_use]
    pub const fn get(&self, kind: ViewKind) -> &QueryDescriptor {
        match kind {
            ViewKind::Orders => &self.orders,
            ViewKind::DailySales => &self.daily_sales,
            ViewKind::Metrics => &self.metrics,
        }
    }
}

// =============================================================================
// Orders List
// =============================================================================

/// Bounded list of recent orders, most-recent-first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrdersListView {
    orders: Vec<Order>,
    capacity: usize,
    total: u64,
}

impl OrdersListView {
    /// Empty list with the given capacity.
    #[must_use]
    pub const fn empty(capacity: usize) -> Self {
        Self {
            orders: Vec::new(),
            capacity,
            total: 0,
        }
    }

    /// Build from a fetched page, in the order the source returned it.
    ///
    /// Duplicate ids keep their first occurrence, the sequence is cut to
    /// `capacity`, and `total` is never below the materialised length.
    #[must_use]
    pub fn from_page(orders: Vec<Order>, capacity: usize, paging_total: u64) -> Self {
        let mut seen = HashSet::with_capacity(orders.len());
        let mut orders: Vec<Order> = orders
            .into_iter()
            .filter(|order| seen.insert(order.id.clone()))
            .collect();
        orders.truncate(capacity);

        let materialised = u64::try_from(orders.len()).unwrap_or(u64::MAX);
        Self {
            orders,
            capacity,
            total: paging_total.max(materialised),
        }
    }

    /// Orders, most-recent-first.
    #[must_use]
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    /// Maximum number of materialised orders.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total count reported for the window, including unmaterialised orders.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    /// Whether an order with `id` is materialised.
    #[must_use]
    pub fn contains(&self, id: &OrderId) -> bool {
        self.orders.iter().any(|order| &order.id == id)
    }

    /// Prepend `order`, trimming the tail to `capacity`. Caller checks for
    /// duplicates.
    pub(crate) fn push_front(&mut self, order: Order, capacity: usize) {
        self.orders.insert(0, order);
        self.orders.truncate(capacity);
        self.capacity = capacity;
        self.total = self.total.saturating_add(1);
    }
}

// =============================================================================
// Daily Buckets
// =============================================================================

/// Aggregate for one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBucket {
    /// Units sold.
    pub units_sold: u64,
    /// Revenue.
    pub revenue: Decimal,
    /// Number of orders.
    pub order_count: u64,
}

impl DailyBucket {
    fn absorb(&mut self, other: &Self) {
        self.units_sold = self.units_sold.saturating_add(other.units_sold);
        self.revenue += other.revenue;
        self.order_count = self.order_count.saturating_add(other.order_count);
    }
}

/// Period-wide totals of a [`DailyBucketSeries`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesTotals {
    /// Number of orders.
    pub total_orders: u64,
    /// Units sold.
    pub total_units: u64,
    /// Revenue.
    pub total_revenue: Decimal,
}

/// Per-day aggregates over a reporting period.
///
/// Totals are maintained alongside the buckets on every write, so they
/// always equal the sum of the per-day aggregates. Days are kept in a
/// sorted map and read back in ascending order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyBucketSeries {
    window: DateWindow,
    buckets: BTreeMap<NaiveDate, DailyBucket>,
    totals: SeriesTotals,
}

impl DailyBucketSeries {
    /// Empty series for `window`.
    #[must_use]
    pub const fn empty(window: DateWindow) -> Self {
        Self {
            window,
            buckets: BTreeMap::new(),
            totals: SeriesTotals {
                total_orders: 0,
                total_units: 0,
                total_revenue: Decimal::ZERO,
            },
        }
    }

    /// Build from per-day rows. Rows outside `window` are dropped and rows
    /// for the same date are summed.
    #[must_use]
    pub fn from_days(window: DateWindow, days: impl IntoIterator<Item = (NaiveDate, DailyBucket)>) -> Self {
        let mut series = Self::empty(window);
        for (date, bucket) in days {
            series.record(date, &bucket);
        }
        series
    }

    /// Reporting period covered.
    #[must_use]
    pub const fn window(&self) -> DateWindow {
        self.window
    }

    /// Period-wide totals.
    #[must_use]
    pub const fn totals(&self) -> SeriesTotals {
        self.totals
    }

    /// Aggregate for `date`, if any.
    #[must_use]
    pub fn bucket(&self, date: NaiveDate) -> Option<&DailyBucket> {
        self.buckets.get(&date)
    }

    /// Days with data, ascending by date.
    pub fn days(&self) -> impl Iterator<Item = (NaiveDate, &DailyBucket)> {
        self.buckets.iter().map(|(date, bucket)| (*date, bucket))
    }

    /// Number of days with data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no day has data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Whether the totals equal the sum of the buckets.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut sum = DailyBucket::default();
        for bucket in self.buckets.values() {
            sum.absorb(bucket);
        }
        sum.order_count == self.totals.total_orders
            && sum.units_sold == self.totals.total_units
            && sum.revenue == self.totals.total_revenue
    }

    /// Add `delta` to the bucket for `date`, creating it at zero if absent.
    ///
    /// Returns `false` and leaves the series untouched when `date` is
    /// outside the window.
    pub(crate) fn record(&mut self, date: NaiveDate, delta: &DailyBucket) -> bool {
        if !self.window.contains_date(date) {
            return false;
        }

        self.buckets.entry(date).or_default().absorb(delta);
        self.totals.total_orders = self.totals.total_orders.saturating_add(delta.order_count);
        self.totals.total_units = self.totals.total_units.saturating_add(delta.units_sold);
        self.totals.total_revenue += delta.revenue;
        true
    }
}

// =============================================================================
// Metrics Snapshot
// =============================================================================

/// Aggregate over the reporting period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Revenue.
    pub total_revenue: Decimal,
    /// Units sold.
    pub total_units_sold: u64,
    /// Number of orders.
    pub total_orders: u64,
    /// When the view last changed.
    pub last_sync: Option<DateTime<Utc>>,
}

// =============================================================================
// Cached View
// =============================================================================

/// A view as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CachedView {
    /// Recent orders list.
    Orders(OrdersListView),
    /// Per-day sales series.
    DailySales(DailyBucketSeries),
    /// Period metrics snapshot.
    Metrics(MetricsSnapshot),
}

impl CachedView {
    /// Kind of this view.
    #[must_use]
    pub const fn kind(&self) -> ViewKind {
        match self {
            Self::Orders(_) => ViewKind::Orders,
            Self::DailySales(_) => ViewKind::DailySales,
            Self::Metrics(_) => ViewKind::Metrics,
        }
    }

    /// The orders list, if this is one.
    #[must_use]
    pub const fn as_orders(&self) -> Option<&OrdersListView> {
        match self {
            Self::Orders(view) => Some(view),
            _ => None,
        }
    }

    /// The daily series, if this is one.
    #[must_use]
    pub const fn as_daily_sales(&self) -> Option<&DailyBucketSeries> {
        match self {
            Self::DailySales(series) => Some(series),
            _ => None,
        }
    }

    /// The metrics snapshot, if this is one.
    #[must_use]
    pub const fn as_metrics(&self) -> Option<&MetricsSnapshot> {
        match self {
            Self::Metrics(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}
