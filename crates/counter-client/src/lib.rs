//! Client library for the shared-counter server.
//!
//! This crate keeps a local view of every counter in step with the server and
//! with every other client:
//!
//! - [`StreamSubscriber`] - Receives live updates over Server-Sent Events
//! - [`SyncEngine`] - Applies changes optimistically and sends or queues them
//! - [`OfflineQueue`] - Persists unsent changes and replays them in order
//! - [`ConnectivityMonitor`] - Tracks online/offline and guards replay
//! - [`CounterApi`] - Typed calls for the request/response endpoints
//! - [`ColorRegistry`] - Per-user highlight colors
//!
//! # Example
//!
//! ```no_run
//! use counter_client::{Callbacks, ClientConfig, SyncClient};
//!
//! # async fn example() -> Result<(), counter_client::ClientError> {
//! let client = SyncClient::connect(ClientConfig::from_env()?).await?;
//!
//! client.listen(Callbacks::new().on_incremented(|counter| {
//!     println!("{} is now {}", counter.name, counter.value);
//! }));
//!
//! let created = client.engine().create("Push-ups", Some(50)).await?;
//! if let Some(counter) = created.counter {
//!     client.engine().increment(&counter.id).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod client;
pub mod colors;
pub mod config;
pub mod error;
pub mod monitor;
pub mod queue;
pub mod storage;
pub mod subscriber;
pub mod sync;

#[cfg(test)]
mod testing;

pub use api::{CounterApi, RemoteCounters};
pub use cache::CounterCache;
pub use client::SyncClient;
pub use colors::ColorRegistry;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use monitor::{Connectivity, ConnectivityMonitor};
pub use queue::{OfflineQueue, Operation, PendingChange, ReplayReport};
pub use storage::{FileStorage, MemoryStorage, QueueStorage};
pub use subscriber::{Callbacks, StreamSubscriber};
pub use sync::{Mutation, SyncEngine};
