//! Query Cache - a query/cache coordinator for async data fetching
//!
//! Provides request deduplication, stale-while-revalidate caching, LRU
//! eviction, cancellation of superseded fetches, subscriber notification and
//! substring invalidation, plus an HTTP gateway that exposes the coordinator
//! over an upstream REST service.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod hooks;
pub mod key;
pub mod models;
pub mod query;
pub mod tasks;

pub use api::AppState;
pub use cache::{QueryState, QueryStats, QueryStatus};
pub use config::Config;
pub use error::{QueryError, Result};
pub use hooks::{MutationState, MutationStatus, QueryOptions, UseMutation, UseQuery};
pub use key::{KeyPart, QueryKey, SharedKey};
pub use query::{query_fn, AbortSignal, MutationOptions, QueryClient, QueryFn, Subscription};
pub use tasks::spawn_gc_task;
