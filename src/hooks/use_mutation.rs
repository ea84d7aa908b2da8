//! Mutation Handle
//!
//! Per-instance mutation state on top of the shared executor. Unlike query
//! state, nothing here is shared between handles.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::query::{MutationExecutor, MutationOptions, QueryClient};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct MutationState<T> {
    pub status: MutationStatus,
    pub data: Option<T>,
    pub error: Option<QueryError>,
}

impl<T> Default for MutationState<T> {
    fn default() -> Self {
        Self {
            status: MutationStatus::Idle,
            data: None,
            error: None,
        }
    }
}

// == Use Mutation ==
pub struct UseMutation<V, T> {
    executor: MutationExecutor<V, T>,
    state: Mutex<MutationState<T>>,
}

impl QueryClient {
    /// Creates a mutation handle running `mutation_fn` with `options`.
    pub fn use_mutation<V, T, F, Fut>(&self, mutation_fn: F, options: MutationOptions<V, T>) -> UseMutation<V, T>
    where
        V: Send + 'static,
        T: Send + 'static,
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        UseMutation {
            executor: MutationExecutor::new(self.clone(), mutation_fn, options),
            state: Mutex::new(MutationState::default()),
        }
    }
}

impl<V, T> UseMutation<V, T>
where
    V: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    fn lock(&self) -> MutexGuard<'_, MutationState<T>> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the mutation and records its outcome on this handle.
    ///
    /// Data from an earlier success is kept while the new call is pending.
    pub async fn mutate(&self, variables: V) -> Result<T> {
        {
            let mut state = self.lock();
            state.status = MutationStatus::Pending;
            state.error = None;
        }

        let result = self.executor.execute(variables).await;

        let mut state = self.lock();
        match &result {
            Ok(data) => {
                state.status = MutationStatus::Success;
                state.data = Some(data.clone());
            }
            Err(err) => {
                state.status = MutationStatus::Error;
                state.error = Some(err.clone());
            }
        }
        result
    }

    pub fn state(&self) -> MutationState<T> {
        self.lock().clone()
    }

    pub fn status(&self) -> MutationStatus {
        self.lock().status
    }

    pub fn is_loading(&self) -> bool {
        self.status() == MutationStatus::Pending
    }

    pub fn is_success(&self) -> bool {
        self.status() == MutationStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status() == MutationStatus::Error
    }

    pub fn data(&self) -> Option<T> {
        self.lock().data.clone()
    }

    pub fn error(&self) -> Option<QueryError> {
        self.lock().error.clone()
    }

    /// Returns the handle to idle, clearing data and error.
    pub fn reset(&self) {
        *self.lock() = MutationState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::QueryKey;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_status_transitions() {
        let client = QueryClient::new(10);
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);

        let mutation = Arc::new(client.use_mutation(
            move |n: i64| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(n * 2)
                }
            },
            MutationOptions::new(),
        ));
        assert_eq!(mutation.status(), MutationStatus::Idle);

        let running = Arc::clone(&mutation);
        let task = tokio::spawn(async move { running.mutate(21).await });
        while !mutation.is_loading() {
            tokio::task::yield_now().await;
        }

        release.notify_one();
        assert_eq!(task.await.unwrap(), Ok(42));
        assert!(mutation.is_success());
        assert_eq!(mutation.data(), Some(42));
    }

    #[tokio::test]
    async fn test_error_then_reset() {
        let client = QueryClient::new(10);
        let key = QueryKey::from("todos");
        client.set_query_data(&key, json!([]));

        let mutation = client.use_mutation(
            |_: ()| async { Err::<(), _>(QueryError::Mutation("conflict".to_string())) },
            MutationOptions::new().invalidate("todos"),
        );

        assert!(mutation.mutate(()).await.is_err());
        assert!(mutation.is_error());
        assert_eq!(mutation.error(), Some(QueryError::Mutation("conflict".to_string())));
        assert!(client.get_query_state(&key).unwrap().updated_at > 0);

        mutation.reset();
        assert_eq!(mutation.status(), MutationStatus::Idle);
        assert!(mutation.error().is_none());
    }

    #[tokio::test]
    async fn test_handles_do_not_share_state() {
        let client = QueryClient::new(10);
        let first = client.use_mutation(|n: i64| async move { Ok(n) }, MutationOptions::new());
        let second = client.use_mutation(|n: i64| async move { Ok(n) }, MutationOptions::new());

        first.mutate(1).await.unwrap();

        assert!(first.is_success());
        assert_eq!(second.status(), MutationStatus::Idle);
    }
}
