//! Query Handle
//!
//! Binds a query key to the lifetime of a handle: creating it subscribes and
//! starts a driver task, dropping it unsubscribes and stops the driver.

use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::{current_timestamp_ms, QueryState, QueryStatus};
use crate::error::{QueryError, Result};
use crate::key::{canonicalize, QueryKey};
use crate::query::{QueryClient, QueryFn, Subscription};

type SuccessCallback = Arc<dyn Fn(&Value) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&QueryError) + Send + Sync>;

// == Query Options ==
/// Per-handle query settings.
#[derive(Clone)]
pub struct QueryOptions {
    stale_time_ms: Option<u64>,
    enabled: bool,
    refetch_on_window_focus: bool,
    initial_data: Option<Value>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self {
            stale_time_ms: None,
            enabled: true,
            refetch_on_window_focus: true,
            initial_data: None,
            on_success: None,
            on_error: None,
        }
    }

    /// Freshness window. Defaults to the client's default stale time.
    pub fn stale_time_ms(mut self, stale_time_ms: u64) -> Self {
        self.stale_time_ms = Some(stale_time_ms);
        self
    }

    /// A disabled handle never fetches on its own; `refetch` still works.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn refetch_on_window_focus(mut self, refetch: bool) -> Self {
        self.refetch_on_window_focus = refetch;
        self
    }

    /// Data to seed the cache with when the key has no entry yet.
    pub fn initial_data(mut self, data: Value) -> Self {
        self.initial_data = Some(data);
        self
    }

    pub fn on_success(mut self, f: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&QueryError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOptions")
            .field("stale_time_ms", &self.stale_time_ms)
            .field("enabled", &self.enabled)
            .field("refetch_on_window_focus", &self.refetch_on_window_focus)
            .field("initial_data", &self.initial_data)
            .finish()
    }
}

// == Query Runner ==
/// Everything needed to issue a fetch for one handle.
#[derive(Clone)]
struct QueryRunner {
    client: QueryClient,
    key: QueryKey,
    fetch_fn: QueryFn,
    stale_time_ms: u64,
    subscription: Weak<Subscription>,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl QueryRunner {
    async fn run(&self, force: bool) -> Result<Value> {
        // Eviction drops the key's listener set; the fetch re-creates the entry
        if let Some(subscription) = self.subscription.upgrade() {
            if subscription.renew() {
                debug!(key = %subscription.key(), "Resubscribed after eviction");
            }
        }

        let fetch_fn = Arc::clone(&self.fetch_fn);
        let result = self
            .client
            .fetch(&self.key, move |signal| fetch_fn(signal), self.stale_time_ms, force)
            .await;

        match &result {
            Ok(data) => {
                if let Some(on_success) = &self.on_success {
                    on_success(data);
                }
            }
            Err(err) => {
                if let Some(on_error) = &self.on_error {
                    on_error(err);
                }
            }
        }
        result
    }
}

enum Step {
    Notified(QueryState),
    Focus,
    FocusClosed,
    Closed,
}

async fn next_focus(focus: &mut Option<broadcast::Receiver<()>>) -> Step {
    let Some(rx) = focus.as_mut() else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(()) | Err(RecvError::Lagged(_)) => Step::Focus,
        Err(RecvError::Closed) => Step::FocusClosed,
    }
}

// == Driver ==
async fn drive(
    runner: QueryRunner,
    canonical: String,
    mut notifications: mpsc::UnboundedReceiver<QueryState>,
    mut focus: Option<broadcast::Receiver<()>>,
) {
    let _ = runner.run(false).await;

    loop {
        let step = tokio::select! {
            notified = notifications.recv() => match notified {
                Some(state) => Step::Notified(state),
                None => Step::Closed,
            },
            step = next_focus(&mut focus) => step,
        };

        match step {
            Step::Notified(state) if state.is_invalidated() => {
                // Several stale notifications may be queued for one refetch
                let still_stale = runner
                    .client
                    .peek_state(&canonical)
                    .is_some_and(|live| live.is_invalidated());
                if still_stale {
                    debug!(key = %canonical, "Refetching invalidated query");
                    let _ = runner.run(true).await;
                }
            }
            Step::Notified(_) => {}
            Step::Focus => {
                let age = runner
                    .client
                    .peek_state(&canonical)
                    .map_or(u64::MAX, |state| state.age_ms(current_timestamp_ms()));
                if age > runner.stale_time_ms {
                    debug!(key = %canonical, age, "Refetching on focus");
                    let _ = runner.run(true).await;
                }
            }
            Step::FocusClosed => focus = None,
            Step::Closed => break,
        }
    }
}

// == Use Query ==
/// Live view of one query, kept fresh by a background driver.
///
/// Dropping the handle unsubscribes and stops the driver.
pub struct UseQuery {
    runner: QueryRunner,
    canonical: String,
    changes: watch::Receiver<u64>,
    driver: Option<JoinHandle<()>>,
    _subscription: Arc<Subscription>,
}

impl QueryClient {
    /// Creates a handle observing `key`.
    ///
    /// When enabled, the handle fetches once on creation, refetches whenever
    /// the key is invalidated, and refetches on focus events once the data is
    /// older than the stale time. Must be called within a Tokio runtime.
    pub fn use_query(&self, key: impl Into<QueryKey>, fetch_fn: QueryFn, options: QueryOptions) -> UseQuery {
        let key = key.into();
        let canonical = canonicalize(&key);

        if let Some(data) = options.initial_data.clone() {
            self.seed_query_data(&key, data);
        }

        let (version_tx, changes) = watch::channel(0u64);
        let (notify_tx, notifications) = if options.enabled {
            let (tx, rx) = mpsc::unbounded_channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let subscription = Arc::new(self.subscribe_canonical(
            canonical.clone(),
            Arc::new(move |state: &QueryState| {
                if let Some(tx) = &notify_tx {
                    let _ = tx.send(state.clone());
                }
                version_tx.send_modify(|version| *version += 1);
            }),
        ));

        let runner = QueryRunner {
            client: self.clone(),
            key,
            fetch_fn,
            stale_time_ms: options
                .stale_time_ms
                .unwrap_or_else(|| self.default_stale_time_ms()),
            subscription: Arc::downgrade(&subscription),
            on_success: options.on_success,
            on_error: options.on_error,
        };

        let driver = notifications.map(|notifications| {
            let focus = options
                .refetch_on_window_focus
                .then(|| self.focus_manager().subscribe());
            tokio::spawn(drive(runner.clone(), canonical.clone(), notifications, focus))
        });

        UseQuery {
            runner,
            canonical,
            changes,
            driver,
            _subscription: subscription,
        }
    }
}

impl UseQuery {
    pub fn key(&self) -> &QueryKey {
        &self.runner.key
    }

    /// Current state of the entry; `Idle` if the key has no entry.
    pub fn state(&self) -> QueryState {
        self.runner.client.peek_state(&self.canonical).unwrap_or_default()
    }

    pub fn data(&self) -> Option<Value> {
        self.state().data
    }

    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.state().data_as()
    }

    pub fn status(&self) -> QueryStatus {
        self.state().status
    }

    pub fn error(&self) -> Option<QueryError> {
        self.state().error
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading()
    }

    pub fn is_error(&self) -> bool {
        self.state().is_error()
    }

    pub fn is_success(&self) -> bool {
        self.state().is_success()
    }

    /// True when the data is older than this handle's stale time or was
    /// invalidated.
    pub fn is_stale(&self) -> bool {
        self.state()
            .is_stale(self.runner.stale_time_ms, current_timestamp_ms())
    }

    /// Forces a new fetch, superseding any fetch already running.
    pub async fn refetch(&self) -> Result<Value> {
        self.runner.run(true).await
    }

    /// Waits for the next notification on this key.
    ///
    /// After the entry is evicted, notifications resume once the handle
    /// fetches again. Returns false only if the subscription is gone.
    pub async fn changed(&mut self) -> bool {
        self.changes.changed().await.is_ok()
    }
}

impl Drop for UseQuery {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl std::fmt::Debug for UseQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UseQuery")
            .field("key", &self.canonical)
            .field("stale_time_ms", &self.runner.stale_time_ms)
            .finish()
    }
}
