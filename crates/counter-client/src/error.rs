//! Error types for counter-client.

use counter_core::ValidationError;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur when talking to the counter server.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input rejected locally; never sent or queued.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Error response from the server.
    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Mutation on a counter this client does not know.
    #[error("Unknown counter: {0}")]
    UnknownCounter(String),

    /// Offline queue could not be read or written.
    #[error("Queue storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether retrying later may succeed.
    ///
    /// Network failures and 5xx answers are transient and get queued;
    /// anything the server rejected on its merits is not.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => !(e.is_decode() || e.is_builder() || e.is_status()),
            ClientError::Api { status, .. } => {
                *status >= 500
                    || *status == StatusCode::REQUEST_TIMEOUT.as_u16()
                    || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Api { status: 404, .. })
    }

    /// A unique value (e.g. a color) is already held by someone else.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Api { status: 409, .. })
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> ClientError {
        ClientError::Api {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(api(500).is_transient());
        assert!(api(503).is_transient());
        assert!(api(429).is_transient());
        assert!(!api(400).is_transient());
        assert!(!api(404).is_transient());
        assert!(!api(409).is_transient());
        assert!(!ClientError::Validation(ValidationError::ZeroDelta).is_transient());
        assert!(!ClientError::UnknownCounter("c1".into()).is_transient());
    }

    #[test]
    fn test_status_helpers() {
        assert!(api(404).is_not_found());
        assert!(!api(409).is_not_found());
        assert!(api(409).is_conflict());
    }
}
