//! Cache Entry Module
//!
//! Defines the per-key query state and its freshness rules.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{QueryError, Result};

// == Query Status ==
/// Lifecycle status of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// Never fetched
    #[default]
    Idle,
    /// A fetch is running
    Loading,
    /// Last fetch succeeded
    Success,
    /// Last fetch failed; `data` may still hold an earlier success
    Error,
}

// == Query State ==
/// Snapshot of one cached query.
///
/// `updated_at == 0` means stale or never fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryState {
    /// Last successfully fetched value
    pub data: Option<Value>,
    pub status: QueryStatus,
    /// Last error, kept until the next success
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<QueryError>,
    /// Unix milliseconds of the last successful write
    pub updated_at: u64,
    /// Unix milliseconds of the last failed fetch
    pub error_updated_at: u64,
    /// Number of fetches that have settled for this key
    pub fetch_count: u32,
}

impl QueryState {
    /// Creates a fresh success state.
    pub fn success(data: Value, now: u64) -> Self {
        Self {
            data: Some(data),
            status: QueryStatus::Success,
            error: None,
            updated_at: now,
            error_updated_at: 0,
            fetch_count: 0,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    /// Returns true if the entry was marked stale by invalidation.
    pub fn is_invalidated(&self) -> bool {
        self.status == QueryStatus::Success && self.updated_at == 0
    }

    // == Freshness ==
    /// Checks whether a success can be served without refetching.
    ///
    /// Fresh means `now - updated_at < stale_time_ms`; an entry with
    /// `updated_at == 0` is never fresh.
    pub fn is_fresh(&self, stale_time_ms: u64, now: u64) -> bool {
        self.status == QueryStatus::Success
            && self.updated_at != 0
            && now.saturating_sub(self.updated_at) < stale_time_ms
    }

    /// Opposite of [`is_fresh`](Self::is_fresh).
    pub fn is_stale(&self, stale_time_ms: u64, now: u64) -> bool {
        !self.is_fresh(stale_time_ms, now)
    }

    /// Milliseconds since the last successful write, `u64::MAX` if none.
    pub fn age_ms(&self, now: u64) -> u64 {
        if self.updated_at == 0 {
            u64::MAX
        } else {
            now.saturating_sub(self.updated_at)
        }
    }

    /// Status to fall back to once a running fetch is cancelled.
    pub fn settled_status(&self) -> QueryStatus {
        if self.error.is_some() {
            QueryStatus::Error
        } else if self.data.is_some() {
            QueryStatus::Success
        } else {
            QueryStatus::Idle
        }
    }

    /// Decodes the cached data into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.data
            .clone()
            .map(serde_json::from_value)
            .transpose()
            .map_err(QueryError::from)
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<QueryError>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_some(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

// == Cache Entry ==
/// Stored form of a query: its state plus access bookkeeping.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub state: QueryState,
    /// Unix milliseconds of the last read or write
    pub last_accessed_at: u64,
}

impl CacheEntry {
    pub fn new(state: QueryState) -> Self {
        Self {
            state,
            last_accessed_at: current_timestamp_ms(),
        }
    }

    /// Milliseconds since the entry was last read or written.
    pub fn idle_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_accessed_at)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_state_is_idle() {
        let state = QueryState::default();
        assert_eq!(state.status, QueryStatus::Idle);
        assert!(state.data.is_none());
        assert_eq!(state.updated_at, 0);
    }

    #[test]
    fn test_fresh_within_stale_time() {
        let now = current_timestamp_ms();
        let state = QueryState::success(json!(1), now);

        assert!(state.is_fresh(5_000, now + 100));
        assert!(!state.is_fresh(5_000, now + 5_000));
        assert!(!state.is_fresh(0, now));
    }

    #[test]
    fn test_invalidated_is_never_fresh() {
        let mut state = QueryState::success(json!(1), current_timestamp_ms());
        state.updated_at = 0;

        assert!(state.is_invalidated());
        assert!(!state.is_fresh(u64::MAX, current_timestamp_ms()));
        assert_eq!(state.age_ms(current_timestamp_ms()), u64::MAX);
    }

    #[test]
    fn test_settled_status() {
        let mut state = QueryState::default();
        assert_eq!(state.settled_status(), QueryStatus::Idle);

        state.data = Some(json!("x"));
        assert_eq!(state.settled_status(), QueryStatus::Success);

        state.error = Some(QueryError::fetch("down"));
        assert_eq!(state.settled_status(), QueryStatus::Error);
    }

    #[test]
    fn test_data_as() {
        let state = QueryState::success(json!([1, 2, 3]), 1);
        let decoded: Option<Vec<u32>> = state.data_as().unwrap();
        assert_eq!(decoded, Some(vec![1, 2, 3]));

        let wrong: Result<Option<String>> = state.data_as();
        assert!(matches!(wrong, Err(QueryError::Decode(_))));
    }

    #[test]
    fn test_state_serializes_error_as_string() {
        let state = QueryState {
            status: QueryStatus::Error,
            error: Some(QueryError::fetch("timeout")),
            ..Default::default()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "Fetch failed: timeout");
    }
}
