//! In-flight Registry
//!
//! At most one running fetch per canonical key. Each entry owns the abort
//! controller of its fetch and a shared handle to the fetch outcome that
//! deduplicated callers await.

use std::collections::HashMap;

use futures_util::future::{BoxFuture, Shared};
use serde_json::Value;

use crate::error::Result;

use super::abort::AbortController;

/// Outcome of one fetch, awaitable by any number of callers.
pub type SharedOutcome = Shared<BoxFuture<'static, Result<Value>>>;

// == In-flight Fetch ==
pub struct InFlight {
    /// Distinguishes this fetch from a later one under the same key
    pub id: u64,
    controller: AbortController,
    pub outcome: SharedOutcome,
}

impl InFlight {
    pub fn new(id: u64, controller: AbortController, outcome: SharedOutcome) -> Self {
        Self {
            id,
            controller,
            outcome,
        }
    }

    pub fn abort(&self) {
        self.controller.abort();
    }
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight")
            .field("id", &self.id)
            .field("aborted", &self.controller.is_aborted())
            .finish()
    }
}

// == In-flight Registry ==
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    fetches: HashMap<String, InFlight>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&InFlight> {
        self.fetches.get(key)
    }

    pub fn insert(&mut self, key: String, fetch: InFlight) {
        self.fetches.insert(key, fetch);
    }

    /// Removes the entry for `key` only if it still belongs to fetch `id`.
    pub fn settle(&mut self, key: &str, id: u64) -> bool {
        if self.fetches.get(key).is_some_and(|fetch| fetch.id == id) {
            self.fetches.remove(key);
            true
        } else {
            false
        }
    }

    /// Aborts and removes the fetch for `key`.
    pub fn cancel(&mut self, key: &str) -> bool {
        match self.fetches.remove(key) {
            Some(fetch) => {
                fetch.abort();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fetches.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.fetches.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.fetches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fetches.is_empty()
    }
}
