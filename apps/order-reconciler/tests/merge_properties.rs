//! Merge Engine Property Tests

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use proptest::prelude::*;
use rust_decimal::Decimal;

use order_reconciler::domain::merge::{
    merge_daily_bucket, merge_metrics_snapshot, merge_orders_list,
};
use order_reconciler::domain::views::QueryParams;
use order_reconciler::{
    CacheStore, CachedView, DailyBucketSeries, DateWindow, LineItem, MetricsSnapshot, Order,
    OrdersListView, QueryDescriptor, RangeFilter, WorkspaceId,
};

fn jan(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
}

/// Orders spread over 2024-01-01 .. 2024-01-10 UTC.
fn order_strategy() -> impl Strategy<Value = Order> {
    (0_u32..30, 0_i64..(10 * 24 * 60), 1_i64..100_000, 1_u64..5).prop_map(
        |(id, minute, cents, units)| {
            let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::minutes(minute);
            Order::new(
                id.to_string(),
                Some(created),
                Decimal::new(cents, 2),
                vec![LineItem::with_quantity(units)],
            )
        },
    )
}

/// One write against a cache entry.
#[derive(Debug, Clone)]
enum CacheWrite {
    /// Install a view freshly built from these orders.
    Replace(Vec<Order>),
    /// Merge one streamed order.
    Merge(Order),
}

fn write_strategy() -> impl Strategy<Value = CacheWrite> {
    prop_oneof![
        1 => prop::collection::vec(order_strategy(), 0..6).prop_map(CacheWrite::Replace),
        4 => order_strategy().prop_map(CacheWrite::Merge),
    ]
}

fn list_from(orders: &[Order], capacity: usize) -> OrdersListView {
    orders.iter().fold(OrdersListView::empty(capacity), |view, order| {
        merge_orders_list(&view, order, capacity)
    })
}

proptest! {
    #[test]
    fn list_stays_within_capacity_without_duplicates(
        orders in prop::collection::vec(order_strategy(), 0..60),
        capacity in 1_usize..10,
    ) {
        let mut view = OrdersListView::empty(capacity);
        let mut distinct = HashSet::new();
        for order in &orders {
            view = merge_orders_list(&view, order, capacity);
            distinct.insert(order.id.clone());
        }

        prop_assert!(view.orders().len() <= capacity);
        let ids: HashSet<_> = view.orders().iter().map(|o| o.id.clone()).collect();
        prop_assert_eq!(ids.len(), view.orders().len());
        prop_assert!(view.total() >= view.orders().len() as u64);
        // Evicted ids that come back count again; only the processed key
        // set upstream prevents that.
        prop_assert!(view.total() >= distinct.len() as u64);
        prop_assert!(view.total() <= orders.len() as u64);
    }

    #[test]
    fn remerging_a_listed_order_is_a_no_op(
        orders in prop::collection::vec(order_strategy(), 1..20),
    ) {
        let capacity = 50;
        let mut view = OrdersListView::empty(capacity);
        for order in &orders {
            view = merge_orders_list(&view, order, capacity);
        }

        let again = merge_orders_list(&view, &orders[orders.len() - 1], capacity);
        prop_assert_eq!(again, view);
    }

    #[test]
    fn series_totals_match_buckets(
        orders in prop::collection::vec(order_strategy(), 0..60),
    ) {
        let filter = RangeFilter::new(Tz::UTC);
        let window = DateWindow::new(jan(3), jan(6));
        let mut series = DailyBucketSeries::empty(window);
        let mut in_window = 0_u64;
        let mut revenue = Decimal::ZERO;

        for order in &orders {
            series = merge_daily_bucket(&series, order, &filter);
            if filter.in_period(&window, order.date_created) {
                in_window += 1;
                revenue += order.total_amount;
            }
        }

        prop_assert!(series.is_consistent());
        prop_assert_eq!(series.totals().total_orders, in_window);
        prop_assert_eq!(series.totals().total_revenue, revenue);
        prop_assert!(series.days().all(|(date, _)| window.contains_date(date)));
    }

    #[test]
    fn orders_outside_window_leave_series_unchanged(
        seed in prop::collection::vec(order_strategy(), 0..20),
        outsider in order_strategy(),
    ) {
        let filter = RangeFilter::new(Tz::UTC);
        let window = DateWindow::new(jan(3), jan(6));
        let mut series = DailyBucketSeries::empty(window);
        for order in &seed {
            series = merge_daily_bucket(&series, order, &filter);
        }

        let created = outsider.date_created.unwrap();
        prop_assume!(!window.contains_date(filter.date_key(created)));
        prop_assert_eq!(merge_daily_bucket(&series, &outsider, &filter), series);
    }

    #[test]
    fn metrics_accumulate_every_merged_order(
        orders in prop::collection::vec(order_strategy(), 0..60),
    ) {
        let applied_at = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        let snapshot = orders.iter().fold(MetricsSnapshot::default(), |snap, order| {
            merge_metrics_snapshot(&snap, order, applied_at)
        });

        prop_assert_eq!(snapshot.total_orders, orders.len() as u64);
        prop_assert_eq!(snapshot.total_units_sold, orders.iter().map(Order::units).sum::<u64>());
        prop_assert_eq!(
            snapshot.total_revenue,
            orders.iter().map(|o| o.total_amount).sum::<Decimal>()
        );
    }

    #[test]
    fn replace_supersedes_earlier_merges(
        writes in prop::collection::vec(write_strategy(), 1..40),
    ) {
        let capacity = 5;
        let descriptor = QueryDescriptor {
            workspace_id: WorkspaceId::new("ws-1"),
            params: QueryParams::Orders {
                date_from: None,
                date_to: None,
                limit: capacity,
                include_cancelled: false,
            },
        };
        let store = CacheStore::new();

        for write in &writes {
            match write {
                CacheWrite::Replace(orders) => {
                    store.replace(descriptor.clone(), CachedView::Orders(list_from(orders, capacity)));
                }
                CacheWrite::Merge(order) => {
                    store.merge(&descriptor, |view| match view {
                        CachedView::Orders(list) => {
                            CachedView::Orders(merge_orders_list(list, order, capacity))
                        }
                        other => other.clone(),
                    });
                }
            }
        }

        // Expected: the last replaced view plus only the merges after it.
        let last_replace = writes.iter().rposition(|w| matches!(w, CacheWrite::Replace(_)));
        match last_replace {
            None => prop_assert!(store.get(&descriptor).is_none()),
            Some(at) => {
                let CacheWrite::Replace(seed) = &writes[at] else { unreachable!() };
                let expected = writes[at + 1..].iter().fold(list_from(seed, capacity), |view, w| {
                    match w {
                        CacheWrite::Merge(order) => merge_orders_list(&view, order, capacity),
                        CacheWrite::Replace(_) => view,
                    }
                });
                let stored = store.get(&descriptor).unwrap();
                prop_assert_eq!(stored.as_orders().unwrap(), &expected);
            }
        }
    }
}
