//! The persistence collaborator behind the mutation endpoints.

use async_trait::async_trait;

use crate::counter::{Counter, CounterPatch, NewCounter};
use crate::error::StoreError;

/// Keyed counter store.
///
/// The server broadcasts whatever the store returns; it does not decide
/// persistence semantics itself. Lookups and mutations of an unknown id
/// return `Ok(None)`.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// All counters, oldest first.
    async fn list(&self) -> Result<Vec<Counter>, StoreError>;

    /// One counter by id.
    async fn get_by_id(&self, id: &str) -> Result<Option<Counter>, StoreError>;

    /// Atomically add `delta` to the value and to today's history entry.
    async fn apply_delta(&self, id: &str, delta: i64) -> Result<Option<Counter>, StoreError>;

    /// Insert a counter, or update name and goal when the id already exists.
    ///
    /// The returned flag is `true` when a new row was created.
    async fn upsert(&self, fields: NewCounter) -> Result<(Counter, bool), StoreError>;

    /// Apply an edit.
    async fn update(&self, id: &str, patch: &CounterPatch) -> Result<Option<Counter>, StoreError>;

    /// Remove a counter, returning its last state.
    async fn delete(&self, id: &str) -> Result<Option<Counter>, StoreError>;

    /// Set or clear the image reference.
    async fn set_image_url(
        &self,
        id: &str,
        image_url: Option<String>,
    ) -> Result<Option<Counter>, StoreError>;
}
