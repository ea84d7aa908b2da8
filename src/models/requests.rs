//! Request DTOs for the gateway API
//!
//! Defines the structure of incoming HTTP request bodies and query strings.
//! Keys travel as JSON values; a query-string key that is not valid JSON is
//! taken as a plain string key.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{QueryError, Result};
use crate::key::QueryKey;

/// Converts a JSON key into a query key, rejecting `null`.
fn key_from_value(key: Value) -> Result<QueryKey> {
    match key {
        Value::Null => Err(QueryError::InvalidKey("key cannot be null".to_string())),
        Value::String(s) if s.is_empty() => {
            Err(QueryError::InvalidKey("key cannot be empty".to_string()))
        }
        other => Ok(QueryKey::from(other)),
    }
}

/// Request body for POST /fetch
#[derive(Debug, Clone, Deserialize)]
pub struct FetchRequest {
    /// Query key as JSON
    pub key: Value,
    /// Upstream path, resolved against the configured base URL
    pub path: String,
    /// Freshness window; the client default when absent
    #[serde(default)]
    pub stale_time_ms: Option<u64>,
    /// Supersede any running fetch and ignore cached data
    #[serde(default)]
    pub force: bool,
}

impl FetchRequest {
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if !self.path.starts_with('/') {
            return Some("Path must start with '/'".to_string());
        }
        None
    }

    pub fn query_key(&self) -> Result<QueryKey> {
        key_from_value(self.key.clone())
    }
}

/// Request body for PUT /query
#[derive(Debug, Clone, Deserialize)]
pub struct SetDataRequest {
    pub key: Value,
    pub data: Value,
}

impl SetDataRequest {
    pub fn query_key(&self) -> Result<QueryKey> {
        key_from_value(self.key.clone())
    }
}

/// Request body for POST /invalidate
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    /// Key or key prefix to invalidate
    pub key: Value,
}

impl InvalidateRequest {
    pub fn query_key(&self) -> Result<QueryKey> {
        key_from_value(self.key.clone())
    }
}

/// Query string for GET /query and DELETE /query
#[derive(Debug, Clone, Deserialize)]
pub struct KeyParams {
    pub key: String,
}

impl KeyParams {
    pub fn query_key(&self) -> Result<QueryKey> {
        if self.key.is_empty() {
            return Err(QueryError::InvalidKey("key cannot be empty".to_string()));
        }
        match serde_json::from_str::<Value>(&self.key) {
            Ok(value) => key_from_value(value),
            Err(_) => Ok(QueryKey::from(self.key.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fetch_request_deserialize() {
        let json = r#"{"key": ["cases", 1], "path": "/cases/1"}"#;
        let req: FetchRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, json!(["cases", 1]));
        assert!(req.stale_time_ms.is_none());
        assert!(!req.force);
        assert!(req.validate().is_none());
        assert_eq!(req.query_key().unwrap().canonical(), r#"["cases",1]"#);
    }

    #[test]
    fn test_fetch_request_invalid_path() {
        let req = FetchRequest {
            key: json!("cases"),
            path: "cases".to_string(),
            stale_time_ms: None,
            force: false,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_null_key_rejected() {
        let req = InvalidateRequest { key: Value::Null };
        assert!(matches!(req.query_key(), Err(QueryError::InvalidKey(_))));
    }

    #[test]
    fn test_key_params_json_or_plain() {
        let structured = KeyParams {
            key: r#"["cases","list"]"#.to_string(),
        };
        assert_eq!(structured.query_key().unwrap().canonical(), r#"["cases","list"]"#);

        let plain = KeyParams {
            key: "cases".to_string(),
        };
        assert_eq!(plain.query_key().unwrap().as_plain_str(), Some("cases"));

        let empty = KeyParams { key: String::new() };
        assert!(empty.query_key().is_err());
    }
}
