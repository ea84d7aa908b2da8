//! Query Client
//!
//! The fetch coordinator. Owns the cache store, the subscription registry and
//! the in-flight registry behind one mutex that is never held across an
//! `.await` nor while listeners run.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{current_timestamp_ms, CacheStore, QueryState, QueryStats, QueryStatus};
use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::key::{canonicalize, match_target, matches_target, QueryKey};

use super::abort::{AbortController, AbortSignal};
use super::focus::FocusManager;
use super::inflight::{InFlight, InFlightRegistry, SharedOutcome};
use super::subscription::{notify, Listener, Subscription, SubscriptionRegistry};

/// Type-erased fetch function that can be called repeatedly.
pub type QueryFn = Arc<dyn Fn(AbortSignal) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Wraps an async closure as a [`QueryFn`].
pub fn query_fn<F, Fut>(f: F) -> QueryFn
where
    F: Fn(AbortSignal) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |signal| f(signal).boxed())
}

/// Listeners to call once the lock is released.
type Delivery = (String, Vec<Listener>, QueryState);

// == Client State ==
pub(crate) struct ClientState {
    pub(crate) store: CacheStore,
    pub(crate) listeners: SubscriptionRegistry,
    pub(crate) in_flight: InFlightRegistry,
    /// Listeners taken out under the lock, dropped once it is released.
    released: Vec<Listener>,
}

impl ClientState {
    /// Writes an entry; the listener set of an evicted key goes with it.
    fn set_entry(&mut self, key: String, state: QueryState) {
        if let Some(evicted) = self.store.set(key, state) {
            debug!(key = %evicted, "Evicted least recently used query");
            let listeners = self.listeners.remove_key(&evicted);
            self.released.extend(listeners);
        }
    }

    /// Replaces the data for `canonical` with a fresh success.
    fn write_data(&mut self, canonical: String, data: Value) -> Delivery {
        let previous = self.store.get(&canonical).cloned().unwrap_or_default();
        let next = QueryState {
            data: Some(data),
            status: QueryStatus::Success,
            error: None,
            updated_at: current_timestamp_ms(),
            error_updated_at: previous.error_updated_at,
            fetch_count: previous.fetch_count,
        };
        self.set_entry(canonical.clone(), next.clone());
        self.delivery(&canonical, next)
    }

    fn matching_keys(&self, target: &str) -> Vec<String> {
        self.store
            .keys()
            .into_iter()
            .filter(|key| matches_target(key, target))
            .collect()
    }

    fn delivery(&self, key: &str, state: QueryState) -> Delivery {
        (key.to_string(), self.listeners.snapshot(key), state)
    }
}

// == State Guard ==
/// Lock on the client state.
///
/// Listeners released while it is held are dropped only after the mutex
/// unlocks, since a listener may own a [`Subscription`] whose drop locks
/// the client again.
pub(crate) struct StateGuard<'a> {
    guard: MutexGuard<'a, ClientState>,
    released: Vec<Listener>,
}

impl Deref for StateGuard<'_> {
    type Target = ClientState;

    fn deref(&self) -> &ClientState {
        &self.guard
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut ClientState {
        &mut self.guard
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        // Fields drop in declaration order: unlock first, then the listeners
        self.released = std::mem::take(&mut self.guard.released);
    }
}

pub(crate) struct ClientInner {
    state: Mutex<ClientState>,
    focus: FocusManager,
    default_stale_time_ms: u64,
    next_id: AtomicU64,
}

impl ClientInner {
    /// Locks the client state. A poisoned lock is recovered: every write
    /// under it is a single assignment, so the state is still consistent.
    pub(crate) fn lock(&self) -> StateGuard<'_> {
        let guard = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        StateGuard {
            guard,
            released: Vec::new(),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // == Commit ==
    /// Lands the result of fetch `id` in the cache and notifies subscribers.
    fn commit(&self, key: &str, id: u64, signal: &AbortSignal, result: Result<Value>) -> Result<Value> {
        let mut delivery = None;

        let outcome = {
            let mut state = self.lock();
            state.in_flight.settle(key, id);

            if signal.is_aborted() || matches!(result, Err(QueryError::Aborted)) {
                state.store.stats_mut().record_abort();
                debug!(key = %key, "Dropped result of aborted fetch");
                return Err(QueryError::Aborted);
            }

            let now = current_timestamp_ms();
            let previous = state.store.get(key).cloned();

            match result {
                Ok(data) => {
                    let unchanged = previous
                        .as_ref()
                        .is_some_and(|p| p.error.is_none() && p.data.as_ref() == Some(&data));

                    if unchanged {
                        if let Some(entry) = state.store.get_mut(key) {
                            entry.status = QueryStatus::Success;
                            entry.updated_at = now;
                            entry.fetch_count += 1;
                        }
                        debug!(key = %key, "Refetched data unchanged, skipping notification");
                    } else {
                        let next = QueryState {
                            data: Some(data.clone()),
                            status: QueryStatus::Success,
                            error: None,
                            updated_at: now,
                            error_updated_at: previous.as_ref().map_or(0, |p| p.error_updated_at),
                            fetch_count: previous.as_ref().map_or(0, |p| p.fetch_count) + 1,
                        };
                        state.set_entry(key.to_string(), next.clone());
                        delivery = Some(state.delivery(key, next));
                    }
                    Ok(data)
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Query fetch failed");
                    // Keep the last good data alongside the error
                    let mut next = previous.unwrap_or_default();
                    next.status = QueryStatus::Error;
                    next.error = Some(err.clone());
                    next.error_updated_at = now;
                    next.fetch_count += 1;
                    state.set_entry(key.to_string(), next.clone());
                    delivery = Some(state.delivery(key, next));
                    Err(err)
                }
            }
        };

        if let Some((key, listeners, state)) = delivery {
            notify(&key, &listeners, &state);
        }
        outcome
    }
}

/// What a fetch call decided to do while holding the lock.
enum FetchPlan {
    Hit(Value),
    Join(SharedOutcome),
    Start(SharedOutcome, Option<Delivery>),
}

// == Query Client ==
/// Cache coordinator shared by every query and mutation handle.
///
/// Cloning is cheap; clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

impl QueryClient {
    // == Constructors ==
    /// Creates a client holding at most `capacity` queries.
    pub fn new(capacity: usize) -> Self {
        Self::with_stale_time(capacity, 0)
    }

    /// Creates a client whose query handles default to `default_stale_time_ms`.
    pub fn with_stale_time(capacity: usize, default_stale_time_ms: u64) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                state: Mutex::new(ClientState {
                    store: CacheStore::new(capacity),
                    listeners: SubscriptionRegistry::new(),
                    in_flight: InFlightRegistry::new(),
                    released: Vec::new(),
                }),
                focus: FocusManager::new(),
                default_stale_time_ms,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_stale_time(config.capacity, config.default_stale_time_ms)
    }

    pub fn default_stale_time_ms(&self) -> u64 {
        self.inner.default_stale_time_ms
    }

    pub fn focus_manager(&self) -> &FocusManager {
        &self.inner.focus
    }

    // == Fetch ==
    /// Returns data for `key`, fetching it with `fetch_fn` unless a fresh
    /// success is cached.
    ///
    /// - A success younger than `stale_time_ms` is returned without fetching
    ///   unless `force` is set.
    /// - Unforced callers join a fetch already running for the same key.
    /// - A forced call aborts the running fetch and starts its own.
    /// - Subscribers see a loading state first when the key has no entry or
    ///   the call is forced.
    ///
    /// Only non-abort failures are returned as errors. A caller whose fetch
    /// is superseded receives the superseding fetch's result instead.
    pub async fn fetch<F, Fut>(
        &self,
        key: &QueryKey,
        fetch_fn: F,
        stale_time_ms: u64,
        force: bool,
    ) -> Result<Value>
    where
        F: FnOnce(AbortSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let canonical = canonicalize(key);

        let plan = self.plan_fetch(&canonical, fetch_fn, stale_time_ms, force);
        match plan {
            FetchPlan::Hit(data) => Ok(data),
            FetchPlan::Join(outcome) => self.await_outcome(&canonical, outcome).await,
            FetchPlan::Start(outcome, loading) => {
                if let Some((key, listeners, state)) = loading {
                    notify(&key, &listeners, &state);
                }
                self.await_outcome(&canonical, outcome).await
            }
        }
    }

    fn plan_fetch<F, Fut>(&self, canonical: &str, fetch_fn: F, stale_time_ms: u64, force: bool) -> FetchPlan
    where
        F: FnOnce(AbortSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut state = self.inner.lock();
        let now = current_timestamp_ms();

        if !force {
            let cached = state
                .store
                .get(canonical)
                .filter(|entry| entry.is_fresh(stale_time_ms, now))
                .map(|entry| entry.data.clone().unwrap_or(Value::Null));
            if let Some(data) = cached {
                state.store.stats_mut().record_hit();
                debug!(key = %canonical, "Query cache hit");
                return FetchPlan::Hit(data);
            }

            if let Some(outcome) = state.in_flight.get(canonical).map(|f| f.outcome.clone()) {
                state.store.stats_mut().record_dedup_join();
                debug!(key = %canonical, "Joined in-flight fetch");
                return FetchPlan::Join(outcome);
            }
        } else if state.in_flight.cancel(canonical) {
            debug!(key = %canonical, "Aborted superseded fetch");
        }

        state.store.stats_mut().record_miss();

        let existing = state.store.get(canonical).cloned();
        let loading = if existing.is_none() || force {
            let mut loading = existing.unwrap_or_default();
            loading.status = QueryStatus::Loading;
            state.set_entry(canonical.to_string(), loading.clone());
            Some(state.delivery(canonical, loading))
        } else {
            None
        };

        let id = self.inner.next_id();
        let controller = AbortController::new();
        let signal = controller.signal();
        let inner = Arc::clone(&self.inner);
        let task_key = canonical.to_string();

        let handle = tokio::spawn(async move {
            let fn_signal = signal.clone();
            let result = AssertUnwindSafe(async move { fetch_fn(fn_signal).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(QueryError::Fetch("fetch function panicked".to_string())));
            inner.commit(&task_key, id, &signal, result)
        });

        let outcome: SharedOutcome = async move {
            handle
                .await
                .unwrap_or_else(|err| Err(QueryError::Internal(err.to_string())))
        }
        .boxed()
        .shared();

        state
            .in_flight
            .insert(canonical.to_string(), InFlight::new(id, controller, outcome.clone()));
        debug!(key = %canonical, force, "Started fetch");

        FetchPlan::Start(outcome, loading)
    }

    /// Awaits a fetch outcome, following superseding fetches on abort.
    async fn await_outcome(&self, key: &str, mut outcome: SharedOutcome) -> Result<Value> {
        loop {
            match outcome.await {
                Err(QueryError::Aborted) => {
                    let next = {
                        let state = self.inner.lock();
                        match state.in_flight.get(key) {
                            Some(fetch) => Ok(fetch.outcome.clone()),
                            None => Err(state
                                .store
                                .peek(key)
                                .and_then(|entry| entry.data.clone())
                                .unwrap_or(Value::Null)),
                        }
                    };
                    match next {
                        Ok(newer) => outcome = newer,
                        Err(cached) => return Ok(cached),
                    }
                }
                other => return other,
            }
        }
    }

    /// [`fetch`](Self::fetch) for a typed value, stored as JSON.
    pub async fn fetch_typed<T, F, Fut>(
        &self,
        key: &QueryKey,
        fetch_fn: F,
        stale_time_ms: u64,
        force: bool,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(AbortSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let value = self
            .fetch(
                key,
                move |signal| async move {
                    let data = fetch_fn(signal).await?;
                    serde_json::to_value(data).map_err(QueryError::from)
                },
                stale_time_ms,
                force,
            )
            .await?;
        serde_json::from_value(value).map_err(QueryError::from)
    }

    /// Warms the cache for `key`. Failures are logged, not returned.
    pub async fn prefetch<F, Fut>(&self, key: &QueryKey, fetch_fn: F, stale_time_ms: u64)
    where
        F: FnOnce(AbortSignal) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        if let Err(err) = self.fetch(key, fetch_fn, stale_time_ms, false).await {
            warn!(key = %key, error = %err, "Prefetch failed");
        }
    }

    // == Invalidate ==
    /// Marks every entry matching `key` as stale and notifies its subscribers.
    ///
    /// Matching is a substring test on canonical keys (see
    /// [`match_target`]):
    ///
    /// - a plain string matches by its raw text, so `"case"` also marks
    ///   `"cases-2024"`;
    /// - a list drops its closing `]`, so `["cases"]` marks every key whose
    ///   list starts with `"cases"`, such as `["cases", 1]`;
    /// - any other key matches by its full canonical form.
    ///
    /// Data is kept; subscribers decide whether to refetch. Returns the
    /// number of entries marked.
    pub fn invalidate(&self, key: &QueryKey) -> usize {
        let target = match_target(key);

        let (count, deliveries) = {
            let mut state = self.inner.lock();
            let matches = state.matching_keys(&target);
            let mut deliveries = Vec::new();

            for canonical in &matches {
                let Some(entry) = state.store.peek_mut(canonical) else {
                    continue;
                };
                entry.updated_at = 0;
                let snapshot = entry.clone();

                if state.listeners.has_listeners(canonical) {
                    deliveries.push(state.delivery(canonical, snapshot));
                }
            }

            state.store.stats_mut().record_invalidations(matches.len());
            (matches.len(), deliveries)
        };

        debug!(pattern = %target, count, "Invalidated queries");
        for (key, listeners, state) in deliveries {
            notify(&key, &listeners, &state);
        }
        count
    }

    // == Direct Writes ==
    /// Replaces the data for `key` with a fresh success and notifies subscribers.
    pub fn set_query_data(&self, key: &QueryKey, data: Value) -> QueryState {
        self.write_data(canonicalize(key), data)
    }

    /// Computes new data from the current data and writes it like
    /// [`set_query_data`](Self::set_query_data).
    ///
    /// The read, the updater and the write happen under the client lock, so
    /// concurrent updates of one key never lose a write. The updater must not
    /// call back into this client.
    pub fn update_query_data<F>(&self, key: &QueryKey, updater: F) -> QueryState
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let canonical = canonicalize(key);
        let (key, listeners, next) = {
            let mut state = self.inner.lock();
            let data = updater(state.store.peek(&canonical).and_then(|entry| entry.data.as_ref()));
            state.write_data(canonical, data)
        };

        notify(&key, &listeners, &next);
        next
    }

    /// Seeds `key` with `data` only if it has no entry yet.
    pub fn seed_query_data(&self, key: &QueryKey, data: Value) -> bool {
        let canonical = canonicalize(key);
        let delivery = {
            let mut state = self.inner.lock();
            if state.store.contains(&canonical) {
                return false;
            }
            let seeded = QueryState::success(data, current_timestamp_ms());
            state.set_entry(canonical.clone(), seeded.clone());
            state.delivery(&canonical, seeded)
        };

        let (key, listeners, state) = delivery;
        notify(&key, &listeners, &state);
        true
    }

    fn write_data(&self, canonical: String, data: Value) -> QueryState {
        let (key, listeners, next) = self.inner.lock().write_data(canonical, data);

        notify(&key, &listeners, &next);
        next
    }

    // == Reads ==
    /// Returns the current state of `key`, marking it recently used.
    pub fn get_query_state(&self, key: &QueryKey) -> Option<QueryState> {
        let canonical = canonicalize(key);
        self.inner.lock().store.get(&canonical).cloned()
    }

    /// Returns the state of a canonical key without touching the access order.
    pub(crate) fn peek_state(&self, canonical: &str) -> Option<QueryState> {
        self.inner.lock().store.peek(canonical).cloned()
    }

    // == Subscribe ==
    /// Registers `listener` for changes to `key`.
    ///
    /// The listener runs synchronously on the task that caused the change,
    /// outside the client lock. Dropping the returned guard unsubscribes.
    pub fn subscribe<L>(&self, key: &QueryKey, listener: L) -> Subscription
    where
        L: Fn(&QueryState) + Send + Sync + 'static,
    {
        self.subscribe_canonical(canonicalize(key), Arc::new(listener))
    }

    pub(crate) fn subscribe_canonical(&self, canonical: String, listener: Listener) -> Subscription {
        let id = self.inner.next_id();
        self.inner
            .lock()
            .listeners
            .add(&canonical, id, Arc::clone(&listener));
        Subscription::new(Arc::downgrade(&self.inner), canonical, id, listener)
    }

    pub fn listener_count(&self, key: &QueryKey) -> usize {
        let canonical = canonicalize(key);
        self.inner.lock().listeners.listener_count(&canonical)
    }

    // == Removal and Cancellation ==
    /// Drops every entry matching `key` and aborts their running fetches.
    ///
    /// Listener sets are kept. Returns the number of entries removed.
    pub fn remove_queries(&self, key: &QueryKey) -> usize {
        let target = match_target(key);
        let mut state = self.inner.lock();

        let matches = state.matching_keys(&target);
        for canonical in &matches {
            state.in_flight.cancel(canonical);
            state.store.remove(canonical);
        }
        debug!(pattern = %target, count = matches.len(), "Removed queries");
        matches.len()
    }

    /// Aborts running fetches for keys matching `key`, keeping their data.
    ///
    /// Entries left in a loading state return to their settled status.
    /// Returns the number of fetches cancelled.
    pub fn cancel_queries(&self, key: &QueryKey) -> usize {
        let target = match_target(key);

        let (count, deliveries) = {
            let mut state = self.inner.lock();
            let running: Vec<String> = state
                .in_flight
                .keys()
                .into_iter()
                .filter(|canonical| matches_target(canonical, &target))
                .collect();

            let mut deliveries = Vec::new();
            for canonical in &running {
                state.in_flight.cancel(canonical);
                let Some(entry) = state.store.peek_mut(canonical) else {
                    continue;
                };
                if entry.status == QueryStatus::Loading {
                    entry.status = entry.settled_status();
                    let snapshot = entry.clone();
                    deliveries.push(state.delivery(canonical, snapshot));
                }
            }
            (running.len(), deliveries)
        };

        for (key, listeners, state) in deliveries {
            notify(&key, &listeners, &state);
        }
        count
    }

    // == Garbage Collection ==
    /// Removes entries idle for at least `gc_time_ms` that have no
    /// subscribers and no running fetch. Returns the number removed.
    pub fn collect_garbage(&self, gc_time_ms: u64) -> usize {
        let mut guard = self.inner.lock();
        let state = &mut *guard;

        let mut removed = 0;
        for canonical in state.store.idle_keys(gc_time_ms) {
            if state.listeners.has_listeners(&canonical) || state.in_flight.contains(&canonical) {
                continue;
            }
            state.store.remove(&canonical);
            removed += 1;
        }
        removed
    }

    // == Stats ==
    pub fn stats(&self) -> QueryStats {
        let state = self.inner.lock();
        let mut stats = state.store.stats();
        stats.set_in_flight(state.in_flight.len());
        stats
    }

    /// Number of fetches currently running.
    pub fn is_fetching(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().store.is_empty()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(crate::cache::DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("QueryClient")
            .field("entries", &state.store.len())
            .field("in_flight", &state.in_flight.len())
            .field("subscribed_keys", &state.listeners.len())
            .finish()
    }
}
