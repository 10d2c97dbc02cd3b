//! Processed Order Keys
//!
//! Tracks which order identifiers have already been folded into the cached
//! views during the current workspace session, so that a redelivered stream
//! event is applied at most once.
//!
//! The set is unbounded by default; its lifetime is one workspace session
//! and [`ProcessedKeySet::reset`] is called on every session change. An
//! optional cap evicts the oldest identifiers first.

use std::collections::{HashSet, VecDeque};

use super::order::OrderId;

/// Set of order identifiers already applied in this session.
#[derive(Debug, Default)]
pub struct ProcessedKeySet {
    seen: HashSet<OrderId>,
    /// Insertion order, only maintained when a cap is configured.
    eviction_queue: VecDeque<OrderId>,
    cap: Option<usize>,
}

impl ProcessedKeySet {
    /// Create an unbounded set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set that keeps at most `cap` identifiers (0 = unbounded).
    #[must_use]
    pub fn with_cap(cap: usize) -> Self {
        if cap == 0 {
            return Self::new();
        }
        Self {
            seen: HashSet::with_capacity(cap.min(4_096)),
            eviction_queue: VecDeque::with_capacity(cap.min(4_096)),
            cap: Some(cap),
        }
    }

    /// Whether `id` has already been applied.
    #[must_use]
    pub fn has(&self, id: &OrderId) -> bool {
        self.seen.contains(id)
    }

    /// Record `id` as applied.
    ///
    /// Returns `true` if the identifier was not present before.
    pub fn mark_seen(&mut self, id: OrderId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }

        if let Some(cap) = self.cap {
            while self.seen.len() >= cap {
                let Some(oldest) = self.eviction_queue.pop_front() else {
                    break;
                };
                self.seen.remove(&oldest);
            }
            self.eviction_queue.push_back(id.clone());
        }

        self.seen.insert(id)
    }

    /// Forget every identifier.
    pub fn reset(&mut self) {
        self.seen.clear();
        self.eviction_queue.clear();
    }

    /// Number of tracked identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no identifier is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Configured cap, if any.
    #[must_use]
    pub const fn cap(&self) -> Option<usize> {
        self.cap
    }
}
