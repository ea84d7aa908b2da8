//! Mutation Executor
//!
//! Runs a write operation with lifecycle callbacks and invalidates the
//! configured query keys once it succeeds.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::error::{QueryError, Result};
use crate::key::QueryKey;

use super::client::QueryClient;

/// Type-erased mutation function.
pub type MutationFn<V, T> = Arc<dyn Fn(V) -> BoxFuture<'static, Result<T>> + Send + Sync>;

type OnMutate<V> = Arc<dyn Fn(&V) + Send + Sync>;
type OnSuccess<V, T> = Arc<dyn Fn(&T, &V) + Send + Sync>;
type OnError<V> = Arc<dyn Fn(&QueryError, &V) + Send + Sync>;

// == Mutation Options ==
/// Callbacks and invalidation targets for a mutation.
pub struct MutationOptions<V, T> {
    on_mutate: Option<OnMutate<V>>,
    on_success: Option<OnSuccess<V, T>>,
    on_error: Option<OnError<V>>,
    invalidate_keys: Vec<QueryKey>,
}

impl<V, T> MutationOptions<V, T> {
    pub fn new() -> Self {
        Self {
            on_mutate: None,
            on_success: None,
            on_error: None,
            invalidate_keys: Vec::new(),
        }
    }

    /// Runs before the mutation function, with the variables.
    pub fn on_mutate(mut self, f: impl Fn(&V) + Send + Sync + 'static) -> Self {
        self.on_mutate = Some(Arc::new(f));
        self
    }

    /// Runs after a successful mutation, once invalidation is done.
    pub fn on_success(mut self, f: impl Fn(&T, &V) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&QueryError, &V) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    /// Adds a key to invalidate after each successful mutation.
    pub fn invalidate(mut self, key: impl Into<QueryKey>) -> Self {
        self.invalidate_keys.push(key.into());
        self
    }

    pub fn invalidate_keys(&self) -> &[QueryKey] {
        &self.invalidate_keys
    }
}

impl<V, T> Default for MutationOptions<V, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, T> Clone for MutationOptions<V, T> {
    fn clone(&self) -> Self {
        Self {
            on_mutate: self.on_mutate.clone(),
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            invalidate_keys: self.invalidate_keys.clone(),
        }
    }
}

// == Mutation Executor ==
pub struct MutationExecutor<V, T> {
    client: QueryClient,
    mutation_fn: MutationFn<V, T>,
    options: MutationOptions<V, T>,
}

impl<V, T> MutationExecutor<V, T>
where
    V: Send + 'static,
    T: Send + 'static,
{
    pub fn new<F, Fut>(client: QueryClient, mutation_fn: F, options: MutationOptions<V, T>) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            client,
            mutation_fn: Arc::new(move |variables| mutation_fn(variables).boxed()),
            options,
        }
    }

    /// Runs the mutation once.
    ///
    /// On success every configured key is invalidated before `on_success`
    /// runs. On failure nothing is invalidated and the error is returned
    /// after `on_error`.
    pub async fn execute(&self, variables: V) -> Result<T>
    where
        V: Clone,
    {
        if let Some(on_mutate) = &self.options.on_mutate {
            on_mutate(&variables);
        }

        match (self.mutation_fn)(variables.clone()).await {
            Ok(data) => {
                let invalidated: usize = self
                    .options
                    .invalidate_keys
                    .iter()
                    .map(|key| self.client.invalidate(key))
                    .sum();
                debug!(invalidated, "Mutation succeeded");

                if let Some(on_success) = &self.options.on_success {
                    on_success(&data, &variables);
                }
                Ok(data)
            }
            Err(err) => {
                warn!(error = %err, "Mutation failed");
                if let Some(on_error) = &self.options.on_error {
                    on_error(&err, &variables);
                }
                Err(err)
            }
        }
    }

    pub fn client(&self) -> &QueryClient {
        &self.client
    }
}
