//! Cache Module
//!
//! Bounded query-state storage with LRU eviction.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, QueryState, QueryStatus};
pub use lru::LruTracker;
pub use stats::QueryStats;
pub use store::CacheStore;

// == Public Constants ==
/// Default maximum number of cached queries
pub const DEFAULT_CAPACITY: usize = 100;
