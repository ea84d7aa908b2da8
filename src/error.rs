//! Error types for the query cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Query Error Enum ==
/// Unified error type for the query cache.
///
/// Errors are `Clone` because a single fetch outcome is shared by every
/// caller that was deduplicated onto it, and the last error is kept on the
/// cache entry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The caller-supplied fetch function failed
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// The fetch was superseded and its signal aborted
    #[error("Fetch aborted")]
    Aborted,

    /// The caller-supplied mutation function failed
    #[error("Mutation failed: {0}")]
    Mutation(String),

    /// Cached data could not be decoded into the requested type
    #[error("Decode error: {0}")]
    Decode(String),

    /// The query key could not be parsed
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// No entry exists for the key
    #[error("Query not found: {0}")]
    NotFound(String),

    /// The upstream service returned an error
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Wraps any displayable error as a fetch failure.
    pub fn fetch(err: impl std::fmt::Display) -> Self {
        QueryError::Fetch(err.to_string())
    }

    /// Returns true if this error only records a superseded fetch.
    pub fn is_aborted(&self) -> bool {
        matches!(self, QueryError::Aborted)
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Decode(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::InvalidKey(_) | QueryError::Decode(_) => StatusCode::BAD_REQUEST,
            QueryError::Fetch(_) | QueryError::Upstream(_) => StatusCode::BAD_GATEWAY,
            QueryError::Aborted => StatusCode::CONFLICT,
            QueryError::Mutation(_) | QueryError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the query cache.
pub type Result<T> = std::result::Result<T, QueryError>;
