//! Configuration types for counter-client.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ClientError;

/// Configuration for talking to a counter server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server (e.g., "http://127.0.0.1:8790").
    pub base_url: String,
    /// JSON file backing the offline queue. `None` keeps the queue in memory.
    pub queue_path: Option<PathBuf>,
    /// Timeout for request/response calls. The live stream has none.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Create a new configuration with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            queue_path: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_queue_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.queue_path = Some(path.into());
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `COUNTER_SERVER_URL` | `http://127.0.0.1:8790` |
    /// | `COUNTER_QUEUE_PATH` | unset (in-memory queue) |
    /// | `COUNTER_REQUEST_TIMEOUT_SECS` | `10` |
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = env::var("COUNTER_SERVER_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8790".to_string());
        let mut config = Self::new(base_url);

        config.queue_path = env::var("COUNTER_QUEUE_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        if let Ok(raw) = env::var("COUNTER_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config("COUNTER_REQUEST_TIMEOUT_SECS must be an integer".to_string())
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// `GET`/`POST` collection endpoint.
    pub fn counters_url(&self) -> String {
        format!("{}/api/counters", self.base_url)
    }

    pub fn counter_url(&self, id: &str) -> String {
        format!("{}/api/counters/{}", self.base_url, urlencoding::encode(id))
    }

    /// Per-counter action endpoint (`increment`, `decrement`, `delta`, `reset`, `image`).
    pub fn action_url(&self, id: &str, action: &str) -> String {
        format!("{}/{}", self.counter_url(id), action)
    }

    /// Live update stream endpoint.
    pub fn stream_url(&self) -> String {
        format!("{}/api/stream", self.base_url)
    }

    pub fn colors_url(&self) -> String {
        format!("{}/api/colors", self.base_url)
    }

    pub fn color_url(&self, username: &str) -> String {
        format!("{}/api/colors/{}", self.base_url, urlencoding::encode(username))
    }

    /// Health check endpoint.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8790")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let config = ClientConfig::new("http://localhost:8790/");
        assert_eq!(config.counters_url(), "http://localhost:8790/api/counters");
        assert_eq!(config.counter_url("c1"), "http://localhost:8790/api/counters/c1");
        assert_eq!(
            config.action_url("c1", "increment"),
            "http://localhost:8790/api/counters/c1/increment"
        );
        assert_eq!(config.stream_url(), "http://localhost:8790/api/stream");
        assert_eq!(
            config.color_url("ann marie"),
            "http://localhost:8790/api/colors/ann%20marie"
        );
    }

    #[test]
    fn test_default() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, "http://127.0.0.1:8790");
        assert!(config.queue_path.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }
}
