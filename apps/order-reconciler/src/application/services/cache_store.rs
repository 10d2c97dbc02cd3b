//! Cache Store
//!
//! Addressable store of derived views keyed by [`QueryDescriptor`].
//!
//! All writes (`replace`, `merge`, `invalidate`) take the same write lock,
//! so they are serialized against each other. Merge functions run inside
//! the lock and must not suspend. Readers get `Arc` snapshots and never
//! observe a half-applied view.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::views::{CachedView, QueryDescriptor};

/// One cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Current view.
    pub view: Arc<CachedView>,
    /// Bumped on every change of `view`.
    pub version: u64,
    /// When `view` last changed.
    pub updated_at: DateTime<Utc>,
    /// Set by invalidation, cleared by replace.
    pub stale: bool,
}

/// Freshness metadata of an entry, without the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStatus {
    /// Entry version.
    pub version: u64,
    /// When the view last changed.
    pub updated_at: DateTime<Utc>,
    /// Whether the entry awaits a refetch.
    pub stale: bool,
}

impl From<&CacheEntry> for EntryStatus {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            version: entry.version,
            updated_at: entry.updated_at,
            stale: entry.stale,
        }
    }
}

/// Result of [`CacheStore::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeResult {
    /// The view changed.
    Applied,
    /// The merge function returned an equal view.
    Unchanged,
    /// No entry exists; nothing to patch.
    Absent,
}

/// Store of cached views.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<QueryDescriptor, CacheEntry>>,
}

impl CacheStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current view for `descriptor`.
    #[must_use]
    pub fn get(&self, descriptor: &QueryDescriptor) -> Option<Arc<CachedView>> {
        self.entries
            .read()
            .get(descriptor)
            .map(|entry| Arc::clone(&entry.view))
    }

    /// Current entry, with metadata.
    #[must_use]
    pub fn entry(&self, descriptor: &QueryDescriptor) -> Option<CacheEntry> {
        self.entries.read().get(descriptor).cloned()
    }

    /// Freshness metadata for `descriptor`.
    #[must_use]
    pub fn status(&self, descriptor: &QueryDescriptor) -> Option<EntryStatus> {
        self.entries.read().get(descriptor).map(EntryStatus::from)
    }

    /// Install `view` wholesale, superseding any earlier merge. Returns the
    /// new version.
    pub fn replace(&self, descriptor: QueryDescriptor, view: CachedView) -> u64 {
        let mut entries = self.entries.write();
        let version = entries
            .get(&descriptor)
            .map_or(1, |entry| entry.version.saturating_add(1));

        entries.insert(
            descriptor,
            CacheEntry {
                view: Arc::new(view),
                version,
                updated_at: Utc::now(),
                stale: false,
            },
        );
        version
    }

    /// Apply `merge_fn` to the current view.
    ///
    /// A missing entry is left missing: merges only extend a view that a
    /// refetch has populated. An equal result keeps the version.
    pub fn merge<F>(&self, descriptor: &QueryDescriptor, merge_fn: F) -> MergeResult
    where
        F: FnOnce(&CachedView) -> CachedView,
    {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(descriptor) else {
            return MergeResult::Absent;
        };

        let next = merge_fn(&entry.view);
        if next == *entry.view {
            return MergeResult::Unchanged;
        }

        entry.view = Arc::new(next);
        entry.version = entry.version.saturating_add(1);
        entry.updated_at = Utc::now();
        MergeResult::Applied
    }

    /// Mark an entry stale. The view is kept until a replace lands.
    ///
    /// Returns `false` if there is no entry.
    pub fn invalidate(&self, descriptor: &QueryDescriptor) -> bool {
        self.entries
            .write()
            .get_mut(descriptor)
            .is_some_and(|entry| {
                entry.stale = true;
                true
            })
    }

    /// Drop every entry not addressed by `keep`.
    pub fn retain(&self, keep: &[&QueryDescriptor]) {
        self.entries
            .write()
            .retain(|descriptor, _| keep.contains(&descriptor));
    }

    /// Descriptors with an entry.
    #[must_use]
    pub fn descriptors(&self) -> Vec<QueryDescriptor> {
        self.entries.read().keys().cloned().collect()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
