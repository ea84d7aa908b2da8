//! Cache Store Module
//!
//! Bounded, access-ordered map from canonical key to query state.

use std::collections::HashMap;

use crate::cache::{current_timestamp_ms, CacheEntry, LruTracker, QueryState, QueryStats};

// == Cache Store ==
/// Query state storage with LRU eviction.
///
/// `get`, `get_mut` and `set` touch the access order; `peek` and
/// `peek_mut` do not, so scans such as invalidation leave it unchanged.
#[derive(Debug)]
pub struct CacheStore {
    /// Canonical key to entry
    entries: HashMap<String, CacheEntry>,
    /// LRU access tracker
    lru: LruTracker,
    stats: QueryStats,
    /// Maximum number of entries retained
    capacity: usize,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: QueryStats::new(),
            capacity: capacity.max(1),
        }
    }

    // == Get ==
    /// Returns the state for `key`, marking it most recently used.
    pub fn get(&mut self, key: &str) -> Option<&QueryState> {
        self.get_mut(key).map(|state| &*state)
    }

    /// Mutable access to the state for `key`, marking it most recently used.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut QueryState> {
        let entry = self.entries.get_mut(key)?;
        entry.last_accessed_at = current_timestamp_ms();
        self.lru.touch(key);
        Some(&mut entry.state)
    }

    /// Returns the state for `key` without touching the access order.
    pub fn peek(&self, key: &str) -> Option<&QueryState> {
        self.entries.get(key).map(|entry| &entry.state)
    }

    pub fn peek_mut(&mut self, key: &str) -> Option<&mut QueryState> {
        self.entries.get_mut(key).map(|entry| &mut entry.state)
    }

    // == Set ==
    /// Stores `state` under `key` as the most recently used entry.
    ///
    /// Returns the key evicted to stay within capacity, if any.
    pub fn set(&mut self, key: String, state: QueryState) -> Option<String> {
        self.lru.touch(&key);
        self.entries.insert(key, CacheEntry::new(state));
        let evicted = self.enforce_capacity();
        self.stats.set_total_entries(self.entries.len());
        evicted
    }

    // == Enforce Capacity ==
    /// Evicts the least recently used entry if the store is over capacity.
    pub fn enforce_capacity(&mut self) -> Option<String> {
        if self.entries.len() <= self.capacity {
            return None;
        }

        let evicted = self.lru.evict_oldest()?;
        self.entries.remove(&evicted);
        self.stats.record_eviction();
        self.stats.set_total_entries(self.entries.len());
        Some(evicted)
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) -> Option<QueryState> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.stats.set_total_entries(self.entries.len());
        Some(entry.state)
    }

    /// All canonical keys currently stored, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Keys not read or written for at least `idle_ms`.
    pub fn idle_keys(&self, idle_ms: u64) -> Vec<String> {
        let now = current_timestamp_ms();
        self.entries
            .iter()
            .filter(|(_, entry)| entry.idle_ms(now) >= idle_ms)
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    // == Stats ==
    pub fn stats(&self) -> QueryStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn stats_mut(&mut self) -> &mut QueryStats {
        &mut self.stats
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
