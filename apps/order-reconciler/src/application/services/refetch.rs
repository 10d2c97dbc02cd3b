//! Snapshot Refetcher
//!
//! Repopulates cache entries from the REST query boundary. A successful
//! response replaces its entry wholesale; a failure keeps the stale entry
//! for the next attempt.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::application::ports::{
    DailySalesQuery, MetricsQuery, OrdersQuery, SnapshotError, SnapshotSource,
};
use crate::application::services::cache_store::CacheStore;
use crate::domain::views::{CachedView, QueryDescriptor, QueryParams, SessionDescriptors};
use crate::infrastructure::metrics;

/// Outcome counts of [`Refetcher::refetch_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefetchSummary {
    /// Entries replaced.
    pub replaced: usize,
    /// Entries that kept their previous state.
    pub failed: usize,
}

/// Issues snapshot queries and installs the results.
#[derive(Clone)]
pub struct Refetcher {
    source: Arc<dyn SnapshotSource>,
    store: Arc<CacheStore>,
}

impl std::fmt::Debug for Refetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refetcher")
            .field("entries", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl Refetcher {
    /// Create a refetcher.
    #[must_use]
    pub fn new(source: Arc<dyn SnapshotSource>, store: Arc<CacheStore>) -> Self {
        Self { source, store }
    }

    /// Store the refetcher writes into.
    #[must_use]
    pub const fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Mark every session entry stale.
    pub fn invalidate_all(&self, descriptors: &SessionDescriptors) {
        for descriptor in descriptors.all() {
            self.store.invalidate(descriptor);
        }
    }

    /// Fetch the view for `descriptor` and replace its entry.
    ///
    /// Returns the new entry version.
    ///
    /// # Errors
    ///
    /// Returns the source error; the existing entry is left as it was.
    pub async fn refetch(&self, descriptor: &QueryDescriptor) -> Result<u64, SnapshotError> {
        let started = Instant::now();
        let result = self.fetch_view(descriptor).await;
        metrics::record_refetch(descriptor.kind(), result.is_ok(), started.elapsed());

        match result {
            Ok(view) => {
                let version = self.store.replace(descriptor.clone(), view);
                debug!(%descriptor, version, "cache entry replaced");
                Ok(version)
            }
            Err(e) => {
                warn!(%descriptor, error = %e, "refetch failed, keeping stale entry");
                Err(e)
            }
        }
    }

    /// Refetch every session entry concurrently.
    pub async fn refetch_all(&self, descriptors: &SessionDescriptors) -> RefetchSummary {
        let results = join_all(descriptors.all().map(|d| self.refetch(d))).await;

        results
            .iter()
            .fold(RefetchSummary::default(), |mut summary, result| {
                if result.is_ok() {
                    summary.replaced += 1;
                } else {
                    summary.failed += 1;
                }
                summary
            })
    }

    async fn fetch_view(&self, descriptor: &QueryDescriptor) -> Result<CachedView, SnapshotError> {
        let workspace_id = descriptor.workspace_id.clone();
        match &descriptor.params {
            QueryParams::Orders {
                date_from,
                date_to,
                limit,
                include_cancelled,
            } => {
                let query = OrdersQuery {
                    workspace_id,
                    date_from: *date_from,
                    date_to: *date_to,
                    limit: *limit,
                    include_cancelled: *include_cancelled,
                };
                let page = self.source.fetch_orders(&query).await?;
                Ok(CachedView::Orders(page.into_view(*limit)))
            }
            QueryParams::DailySales { window } => {
                let query = DailySalesQuery {
                    workspace_id,
                    window: *window,
                };
                let report = self.source.fetch_daily_sales(&query).await?;
                Ok(CachedView::DailySales(report.into_series(*window)))
            }
            QueryParams::Metrics {
                window_days,
                window,
            } => {
                let query = MetricsQuery {
                    workspace_id,
                    window_days: *window_days,
                    window: *window,
                };
                let report = self.source.fetch_metrics(&query).await?;
                Ok(CachedView::Metrics(report.into()))
            }
        }
    }
}
