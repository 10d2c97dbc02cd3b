//! Merge Engine
//!
//! Pure functions folding one incoming order into each view kind. Every
//! function takes the current view by reference and returns the next view;
//! when the order does not apply, the result equals the input.
//!
//! Merges are additive only. Corrections (cancellations, refunds) arrive
//! exclusively through a full refetch.

use chrono::{DateTime, Utc};

use super::order::Order;
use super::views::{CachedView, DailyBucket, DailyBucketSeries, MetricsSnapshot, OrdersListView};
use super::window::RangeFilter;

/// Fold `order` into a recent-orders list.
///
/// An order already in the list leaves it unchanged. Otherwise the order is
/// prepended, the tail beyond `capacity` is dropped and the total grows by
/// one. Orders are never re-sorted: arrival order breaks timestamp ties.
#[must_use]
pub fn merge_orders_list(view: &OrdersListView, order: &Order, capacity: usize) -> OrdersListView {
    if view.contains(&order.id) {
        return view.clone();
    }

    let mut next = view.clone();
    next.push_front(order.clone(), capacity);
    next
}

/// Fold `order` into a daily series.
///
/// The date key is the order's creation date in the filter's time zone.
/// Undated orders and orders whose date falls outside the series window
/// leave the series unchanged.
#[must_use]
pub fn merge_daily_bucket(
    series: &DailyBucketSeries,
    order: &Order,
    filter: &RangeFilter,
) -> DailyBucketSeries {
    let Some(created) = order.date_created else {
        return series.clone();
    };

    let mut next = series.clone();
    let delta = DailyBucket {
        units_sold: order.units(),
        revenue: order.total_amount,
        order_count: 1,
    };
    if next.record(filter.date_key(created), &delta) {
        next
    } else {
        series.clone()
    }
}

/// Fold `order` into a metrics snapshot, stamping `applied_at` as the
/// last sync instant.
#[must_use]
pub fn merge_metrics_snapshot(
    snapshot: &MetricsSnapshot,
    order: &Order,
    applied_at: DateTime<Utc>,
) -> MetricsSnapshot {
    MetricsSnapshot {
        total_revenue: snapshot.total_revenue + order.total_amount,
        total_units_sold: snapshot.total_units_sold.saturating_add(order.units()),
        total_orders: snapshot.total_orders.saturating_add(1),
        last_sync: Some(applied_at),
    }
}

/// Inputs shared by every merge of one event.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext {
    /// Capacity of the recent-orders list.
    pub list_capacity: usize,
    /// Time zone bound filter for date keys.
    pub filter: RangeFilter,
    /// Instant the merge is applied.
    pub applied_at: DateTime<Utc>,
}

/// Dispatch `order` to the merge function matching the view kind.
#[must_use]
pub fn merge_view(view: &CachedView, order: &Order, ctx: &MergeContext) -> CachedView {
    match view {
        CachedView::Orders(list) => {
            CachedView::Orders(merge_orders_list(list, order, ctx.list_capacity))
        }
        CachedView::DailySales(series) => {
            CachedView::DailySales(merge_daily_bucket(series, order, &ctx.filter))
        }
        CachedView::Metrics(snapshot) => {
            CachedView::Metrics(merge_metrics_snapshot(snapshot, order, ctx.applied_at))
        }
    }
}
