//! Subscription Registry
//!
//! Per-key listener sets. Notification always runs over a snapshot of the
//! set, so listeners that subscribe or unsubscribe while being notified do
//! not affect the delivery in progress.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tracing::warn;

use crate::cache::QueryState;

use super::client::ClientInner;

/// Callback invoked with the new state of a subscribed key.
pub type Listener = Arc<dyn Fn(&QueryState) + Send + Sync>;

// == Subscription Registry ==
#[derive(Default)]
pub struct SubscriptionRegistry {
    sets: HashMap<String, Vec<(u64, Listener)>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener under `key`, creating the set on first use.
    pub fn add(&mut self, key: &str, id: u64, listener: Listener) {
        self.sets
            .entry(key.to_string())
            .or_default()
            .push((id, listener));
    }

    /// Removes one listener and hands it back; the set is dropped once it
    /// is empty.
    pub fn remove(&mut self, key: &str, id: u64) -> Option<Listener> {
        let set = self.sets.get_mut(key)?;
        let index = set.iter().position(|(listener_id, _)| *listener_id == id)?;
        let (_, listener) = set.remove(index);

        if set.is_empty() {
            self.sets.remove(key);
        }
        Some(listener)
    }

    /// Takes the whole listener set for `key`.
    pub fn remove_key(&mut self, key: &str) -> Vec<Listener> {
        self.sets
            .remove(key)
            .map(|set| set.into_iter().map(|(_, l)| l).collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &str, id: u64) -> bool {
        self.sets
            .get(key)
            .is_some_and(|set| set.iter().any(|(listener_id, _)| *listener_id == id))
    }

    /// Copy of the listeners currently registered for `key`.
    pub fn snapshot(&self, key: &str) -> Vec<Listener> {
        self.sets
            .get(key)
            .map(|set| set.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default()
    }

    pub fn has_listeners(&self, key: &str) -> bool {
        self.sets.contains_key(key)
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.sets.get(key).map_or(0, Vec::len)
    }

    /// Number of keys with at least one listener.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Delivers `state` to every listener in `listeners`.
///
/// A panicking listener is logged and skipped; the rest still run.
pub fn notify(key: &str, listeners: &[Listener], state: &QueryState) {
    for listener in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
            warn!(key = %key, "Query listener panicked during notification");
        }
    }
}

// == Subscription ==
/// Guard for one registered listener. Dropping it unsubscribes.
///
/// The guard keeps its own reference to the listener, so a listener set
/// dropped by eviction can be restored with [`renew`](Self::renew).
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    client: Weak<ClientInner>,
    key: String,
    id: u64,
    listener: Listener,
}

impl Subscription {
    pub(crate) fn new(client: Weak<ClientInner>, key: String, id: u64, listener: Listener) -> Self {
        Self {
            client,
            key,
            id,
            listener,
        }
    }

    /// Registers the listener again if its key was evicted since.
    ///
    /// Returns true when the listener had to be re-added.
    pub fn renew(&self) -> bool {
        let Some(client) = self.client.upgrade() else {
            return false;
        };
        let mut state = client.lock();
        if state.listeners.contains(&self.key, self.id) {
            return false;
        }
        state
            .listeners
            .add(&self.key, self.id, Arc::clone(&self.listener));
        true
    }

    /// Canonical key this subscription observes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Unsubscribes now. Equivalent to dropping the guard.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(client) = self.client.upgrade() {
            // Released after the lock, its captures may unsubscribe too
            let removed = client.lock().listeners.remove(&self.key, self.id);
            drop(removed);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
