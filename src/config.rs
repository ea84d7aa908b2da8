//! Configuration Module
//!
//! Handles loading gateway and cache configuration from environment variables.

use std::env;
use std::str::FromStr;

/// Query cache and gateway configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of queries the cache can hold
    pub capacity: usize,
    /// Stale time applied when a caller does not give one
    pub default_stale_time_ms: u64,
    /// Idle time after which an unobserved query is collected
    pub gc_time_ms: u64,
    /// Garbage collection interval in seconds
    pub gc_interval: u64,
    /// HTTP server port
    pub server_port: u16,
    /// Base URL that fetch paths are resolved against
    pub upstream_url: String,
    /// Per-request timeout for upstream calls
    pub upstream_timeout_ms: u64,
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `QUERY_CACHE_CAPACITY` - Maximum cached queries (default: 100)
    /// - `DEFAULT_STALE_TIME_MS` - Default stale time (default: 0)
    /// - `GC_TIME_MS` - Idle time before collection (default: 300000)
    /// - `GC_INTERVAL` - Collection frequency in seconds (default: 60)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_URL` - Upstream base URL (default: http://127.0.0.1:8080)
    /// - `UPSTREAM_TIMEOUT_MS` - Upstream request timeout (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: env_or("QUERY_CACHE_CAPACITY", defaults.capacity),
            default_stale_time_ms: env_or("DEFAULT_STALE_TIME_MS", defaults.default_stale_time_ms),
            gc_time_ms: env_or("GC_TIME_MS", defaults.gc_time_ms),
            gc_interval: env_or("GC_INTERVAL", defaults.gc_interval),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            upstream_timeout_ms: env_or("UPSTREAM_TIMEOUT_MS", defaults.upstream_timeout_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 100,
            default_stale_time_ms: 0,
            gc_time_ms: 300_000,
            gc_interval: 60,
            server_port: 3000,
            upstream_url: "http://127.0.0.1:8080".to_string(),
            upstream_timeout_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.default_stale_time_ms, 0);
        assert_eq!(config.gc_time_ms, 300_000);
        assert_eq!(config.gc_interval, 60);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.upstream_url, "http://127.0.0.1:8080");
        assert_eq!(config.upstream_timeout_ms, 10_000);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("QUERY_CACHE_CAPACITY");
        env::remove_var("DEFAULT_STALE_TIME_MS");
        env::remove_var("GC_TIME_MS");
        env::remove_var("GC_INTERVAL");
        env::remove_var("SERVER_PORT");
        env::remove_var("UPSTREAM_URL");
        env::remove_var("UPSTREAM_TIMEOUT_MS");

        let config = Config::from_env();
        assert_eq!(config.capacity, 100);
        assert_eq!(config.gc_interval, 60);
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.upstream_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_env_or_ignores_unparsable() {
        env::set_var("QUERY_CACHE_TEST_BAD_NUMBER", "lots");
        assert_eq!(env_or("QUERY_CACHE_TEST_BAD_NUMBER", 7u64), 7);
        env::remove_var("QUERY_CACHE_TEST_BAD_NUMBER");
    }
}
