//! Garbage Collection Task
//!
//! Background task that periodically removes idle, unobserved queries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::query::QueryClient;

/// Spawns a background task that collects queries idle for `gc_time_ms`.
///
/// Queries with subscribers or a running fetch are never collected. The
/// returned handle can be aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let client = QueryClient::new(100);
/// let gc_handle = spawn_gc_task(client.clone(), 60, 300_000);
/// // Later, during shutdown:
/// gc_handle.abort();
/// ```
pub fn spawn_gc_task(client: QueryClient, interval_secs: u64, gc_time_ms: u64) -> JoinHandle<()> {
    spawn_gc_task_every(client, Duration::from_secs(interval_secs), gc_time_ms)
}

/// Like [`spawn_gc_task`] with a sub-second interval.
pub fn spawn_gc_task_every(client: QueryClient, interval: Duration, gc_time_ms: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Starting query GC task with interval of {:?}, gc time {}ms",
            interval, gc_time_ms
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = client.collect_garbage(gc_time_ms);
            if removed > 0 {
                info!("Query GC: removed {} idle queries", removed);
            } else {
                debug!("Query GC: nothing to collect");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::QueryKey;
    use serde_json::json;

    #[tokio::test]
    async fn test_gc_task_removes_idle_queries() {
        let client = QueryClient::new(100);
        let key = QueryKey::from("idle");
        client.set_query_data(&key, json!(1));

        let handle = spawn_gc_task_every(client.clone(), Duration::from_millis(20), 10);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(client.get_query_state(&key).is_none(), "Idle query should have been collected");
        handle.abort();
    }

    #[tokio::test]
    async fn test_gc_task_keeps_subscribed_queries() {
        let client = QueryClient::new(100);
        let key = QueryKey::from("watched");
        client.set_query_data(&key, json!(1));
        let _subscription = client.subscribe(&key, |_| {});

        let handle = spawn_gc_task_every(client.clone(), Duration::from_millis(20), 10);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(client.get_query_state(&key).is_some(), "Subscribed query should be kept");
        handle.abort();
    }

    #[tokio::test]
    async fn test_gc_task_can_be_aborted() {
        let client = QueryClient::new(100);

        let handle = spawn_gc_task(client, 1, 1_000);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "Task should be finished after abort");
    }
}
