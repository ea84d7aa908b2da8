//! API Handlers
//!
//! HTTP request handlers for each gateway endpoint.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::key::{canonicalize, match_target};
use crate::models::{
    FetchRequest, FetchResponse, FocusResponse, HealthResponse, InvalidateRequest,
    InvalidateResponse, KeyParams, QueryStateResponse, RemoveResponse, SetDataRequest,
    StatsResponse,
};
use crate::query::QueryClient;

use super::upstream::UpstreamClient;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: QueryClient,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn new(client: QueryClient, upstream: UpstreamClient) -> Self {
        Self { client, upstream }
    }

    /// Creates a new AppState from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            QueryClient::from_config(config),
            UpstreamClient::from_config(config)?,
        ))
    }
}

/// Handler for POST /fetch
///
/// Serves fresh cached data or fetches `path` from the upstream, sharing one
/// upstream request between concurrent callers for the same key.
pub async fn fetch_handler(
    State(state): State<AppState>,
    Json(req): Json<FetchRequest>,
) -> Result<Json<FetchResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(QueryError::InvalidKey(error_msg));
    }
    let key = req.query_key()?;
    let stale_time_ms = req
        .stale_time_ms
        .unwrap_or_else(|| state.client.default_stale_time_ms());

    let upstream = state.upstream.clone();
    let path = req.path;
    let data = state
        .client
        .fetch(
            &key,
            move |signal| async move { upstream.get_json(&path, signal).await },
            stale_time_ms,
            req.force,
        )
        .await?;

    Ok(Json(FetchResponse::new(canonicalize(&key), data)))
}

/// Handler for GET /query
pub async fn get_query_handler(
    State(state): State<AppState>,
    Query(params): Query<KeyParams>,
) -> Result<Json<QueryStateResponse>> {
    let key = params.query_key()?;
    let canonical = canonicalize(&key);

    let query = state
        .client
        .get_query_state(&key)
        .ok_or_else(|| QueryError::NotFound(canonical.clone()))?;

    Ok(Json(QueryStateResponse::new(canonical, query)))
}

/// Handler for PUT /query
pub async fn set_query_handler(
    State(state): State<AppState>,
    Json(req): Json<SetDataRequest>,
) -> Result<Json<QueryStateResponse>> {
    let key = req.query_key()?;
    let query = state.client.set_query_data(&key, req.data);

    Ok(Json(QueryStateResponse::new(canonicalize(&key), query)))
}

/// Handler for POST /invalidate
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    let key = req.query_key()?;
    let matched = state.client.invalidate(&key);

    Ok(Json(InvalidateResponse::new(match_target(&key), matched)))
}

/// Handler for DELETE /query
pub async fn remove_query_handler(
    State(state): State<AppState>,
    Query(params): Query<KeyParams>,
) -> Result<Json<RemoveResponse>> {
    let key = params.query_key()?;
    let removed = state.client.remove_queries(&key);

    Ok(Json(RemoveResponse::new(match_target(&key), removed)))
}

/// Handler for POST /focus
pub async fn focus_handler(State(state): State<AppState>) -> Json<FocusResponse> {
    state.client.focus_manager().focus();
    Json(FocusResponse::emitted())
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::new(state.client.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn test_state() -> AppState {
        let upstream = UpstreamClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        AppState::new(QueryClient::new(100), upstream)
    }

    #[tokio::test]
    async fn test_set_and_get_handler() {
        let state = test_state();

        let req = SetDataRequest {
            key: json!(["cases", 1]),
            data: json!({"title": "first"}),
        };
        let result = set_query_handler(State(state.clone()), Json(req)).await;
        assert!(result.is_ok());

        let params = KeyParams {
            key: r#"["cases",1]"#.to_string(),
        };
        let response = get_query_handler(State(state), Query(params)).await.unwrap();
        assert_eq!(response.state.data, Some(json!({"title": "first"})));
    }

    #[tokio::test]
    async fn test_get_missing_query() {
        let state = test_state();
        let params = KeyParams {
            key: "missing".to_string(),
        };

        let result = get_query_handler(State(state), Query(params)).await;
        assert!(matches!(result, Err(QueryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalidate_handler_counts_matches() {
        let state = test_state();
        state.client.set_query_data(&"cases-1".into(), json!(1));
        state.client.set_query_data(&"cases-2".into(), json!(2));
        state.client.set_query_data(&"users".into(), json!(3));

        let req = InvalidateRequest { key: json!("cases") };
        let response = invalidate_handler(State(state), Json(req)).await.unwrap();

        assert_eq!(response.matched, 2);
        assert_eq!(response.target, "cases");
    }

    #[tokio::test]
    async fn test_fetch_serves_fresh_cache_without_upstream() {
        let state = test_state();
        state.client.set_query_data(&"cached".into(), json!("local"));

        let req = FetchRequest {
            key: json!("cached"),
            path: "/never-called".to_string(),
            stale_time_ms: Some(60_000),
            force: false,
        };
        let response = fetch_handler(State(state), Json(req)).await.unwrap();
        assert_eq!(response.data, json!("local"));
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
