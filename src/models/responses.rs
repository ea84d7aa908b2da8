//! Response DTOs for the gateway API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::{QueryState, QueryStats};

/// Response body for POST /fetch
#[derive(Debug, Clone, Serialize)]
pub struct FetchResponse {
    /// Canonical key the data is cached under
    pub key: String,
    pub data: Value,
}

impl FetchResponse {
    pub fn new(key: impl Into<String>, data: Value) -> Self {
        Self {
            key: key.into(),
            data,
        }
    }
}

/// Response body for GET /query and PUT /query
#[derive(Debug, Clone, Serialize)]
pub struct QueryStateResponse {
    pub key: String,
    pub state: QueryState,
}

impl QueryStateResponse {
    pub fn new(key: impl Into<String>, state: QueryState) -> Self {
        Self {
            key: key.into(),
            state,
        }
    }
}

/// Response body for POST /invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Substring matched against canonical keys
    pub target: String,
    /// Number of entries marked stale
    pub matched: usize,
}

impl InvalidateResponse {
    pub fn new(target: impl Into<String>, matched: usize) -> Self {
        Self {
            target: target.into(),
            matched,
        }
    }
}

/// Response body for DELETE /query
#[derive(Debug, Clone, Serialize)]
pub struct RemoveResponse {
    pub target: String,
    pub removed: usize,
}

impl RemoveResponse {
    pub fn new(target: impl Into<String>, removed: usize) -> Self {
        Self {
            target: target.into(),
            removed,
        }
    }
}

/// Response body for POST /focus
#[derive(Debug, Clone, Serialize)]
pub struct FocusResponse {
    pub message: String,
}

impl FocusResponse {
    pub fn emitted() -> Self {
        Self {
            message: "Focus event emitted".to_string(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: QueryStats,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    pub fn new(stats: QueryStats) -> Self {
        let hit_rate = stats.hit_rate();
        Self { stats, hit_rate }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
