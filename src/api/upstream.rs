//! Upstream Client
//!
//! HTTP client used as the fetch function behind POST /fetch.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::query::AbortSignal;

#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.upstream_url.clone(),
            Duration::from_millis(config.upstream_timeout_ms),
        )
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GETs `path` and decodes the body as JSON.
    ///
    /// Resolves to [`QueryError::Aborted`] as soon as `signal` fires, dropping
    /// the request.
    pub async fn get_json(&self, path: &str, signal: AbortSignal) -> Result<Value> {
        let url = self.url(path);

        let request = async {
            debug!(url = %url, "Fetching from upstream");
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| QueryError::Upstream(e.to_string()))?;

            if !response.status().is_success() {
                return Err(QueryError::Upstream(format!(
                    "{} returned {}",
                    url,
                    response.status()
                )));
            }

            response
                .json::<Value>()
                .await
                .map_err(|e| QueryError::Decode(e.to_string()))
        };

        tokio::select! {
            result = request => result,
            _ = signal.aborted() => Err(QueryError::Aborted),
        }
    }
}
