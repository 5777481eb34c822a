//! Application state shared across handlers.

use std::sync::Arc;

use broadcaster::BroadcastHub;
use counter_core::{CounterStore, SyncEvent};
use database::Database;
use tracing::{debug, warn};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Database connection, used directly for images and colors.
    pub db: Database,
    /// The counter store the mutation endpoints and live stream go through.
    pub store: Arc<dyn CounterStore>,
    /// The one broadcast hub for this process.
    pub hub: BroadcastHub,
    /// Largest accepted image upload, in bytes.
    pub max_image_bytes: usize,
}

impl AppState {
    /// Create new application state backed by `db`.
    pub fn new(db: Database, hub: BroadcastHub) -> Self {
        let store: Arc<dyn CounterStore> = Arc::new(db.clone());
        Self {
            db,
            store,
            hub,
            max_image_bytes: 5 * 1024 * 1024,
        }
    }

    pub fn with_max_image_bytes(mut self, max: usize) -> Self {
        self.max_image_bytes = max;
        self
    }

    /// Publish a committed mutation to every live connection.
    ///
    /// Delivery problems stay inside the hub; the mutation that triggered the
    /// event has already succeeded and is reported as such.
    pub async fn broadcast(&self, event: SyncEvent) {
        let event_type = event.event_type;
        match self.hub.publish(&event).await {
            Ok(report) => debug!(
                event = %event_type,
                delivered = report.delivered,
                failed = report.failed,
                "Event published"
            ),
            Err(err) => warn!(event = %event_type, error = %err, "Failed to publish event"),
        }
    }
}
