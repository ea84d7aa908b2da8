//! Query Statistics Module
//!
//! Counters for cache hits, fetches, deduplication, cancellation and eviction.

use serde::Serialize;

// == Query Stats ==
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryStats {
    /// Fetch calls answered from a fresh entry
    pub hits: u64,
    /// Fetch calls that started a new fetch
    pub misses: u64,
    /// Fetch calls that joined a fetch already in flight
    pub dedup_joins: u64,
    /// Fetch results dropped because the fetch was superseded or cancelled
    pub aborted: u64,
    /// Entries evicted by the LRU policy
    pub evictions: u64,
    /// Entries marked stale by invalidation
    pub invalidations: u64,
    pub total_entries: usize,
    pub in_flight: usize,
}

impl QueryStats {
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 before any fetch.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_dedup_join(&mut self) {
        self.dedup_joins += 1;
    }

    pub fn record_abort(&mut self) {
        self.aborted += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_invalidations(&mut self, count: usize) {
        self.invalidations += count as u64;
    }

    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }

    pub fn set_in_flight(&mut self, count: usize) {
        self.in_flight = count;
    }
}
