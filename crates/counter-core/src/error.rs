//! Error types for counter-core.

use thiserror::Error;

use crate::validation::ValidationError;

/// Errors raised while encoding or decoding shared types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Well-formed JSON that does not describe a valid event.
    #[error("Malformed event: {0}")]
    MalformedEvent(String),
}

/// Errors returned by a [`CounterStore`](crate::CounterStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Input rejected before reaching the backend.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend failed.
    #[error("store backend error: {0}")]
    Backend(String),
}
