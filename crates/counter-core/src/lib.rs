//! Core types for the shared-counter service.
//!
//! This crate provides the data model shared by the server and the client:
//!
//! - [`Counter`] - The named integer value every client views and mutates
//! - [`SyncEvent`] / [`EventType`] - The unit of broadcast on the live stream
//! - [`CounterStore`] - The trait the server's persistence layer implements
//! - [`validation`] - Input checks applied on both sides before a mutation
//!
//! # Example
//!
//! ```rust
//! use counter_core::{Counter, SyncEvent, EventType};
//!
//! let counter = Counter::new("c1", "Push-ups", 1_700_000_000_000);
//! let event = SyncEvent::incremented(counter);
//! let json = event.to_json().unwrap();
//!
//! let parsed = SyncEvent::from_json(&json).unwrap();
//! assert_eq!(parsed.event_type, EventType::CounterIncremented);
//! ```

pub mod api;
mod counter;
mod error;
mod event;
mod store;
pub mod validation;

pub use api::{ColorRequest, CounterListResponse, CounterResponse, DeltaRequest, ErrorBody, UserColor};
pub use counter::{day_key, now_millis, Counter, CounterPatch, NewCounter};
pub use error::{CoreError, StoreError};
pub use event::{EventType, SyncEvent};
pub use store::CounterStore;
pub use validation::ValidationError;

// Re-export async_trait for store implementations
pub use async_trait::async_trait;
