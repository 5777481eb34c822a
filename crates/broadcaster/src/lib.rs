//! Broadcast hub for counter sync events.
//!
//! This crate provides the single in-process registry of live connections.
//! Every successful counter mutation is published once and written to each
//! registered connection.
//!
//! - A failing connection never blocks or interrupts delivery to the others;
//!   it is logged and unregistered, which closes its stream.
//! - Each connection receives events in publish order.
//! - Nothing is persisted. A connection only sees events published while it
//!   is registered.
//!
//! # Example
//!
//! ```no_run
//! use broadcaster::BroadcastHub;
//! use counter_core::{Counter, SyncEvent};
//!
//! # async fn example() -> Result<(), broadcaster::HubError> {
//! let hub = BroadcastHub::default();
//! let mut subscription = hub.subscribe_channel().await;
//!
//! let event = SyncEvent::incremented(Counter::new("c1", "Laps", 0));
//! let report = hub.publish(&event).await?;
//! assert_eq!(report.delivered, 1);
//!
//! let payload = subscription.receiver.recv().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use counter_core::{CoreError, SyncEvent};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// A serialized event, shared by every connection it is written to.
pub type Payload = Arc<str>;

/// Errors that can occur during broadcast operations.
#[derive(Debug, Error)]
pub enum HubError {
    /// The event could not be serialized.
    #[error("Encode error: {0}")]
    Encode(#[from] CoreError),
}

/// Why a write to one connection failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// The connection's reader is gone.
    #[error("connection closed")]
    Closed,

    /// The connection is not keeping up with the event rate.
    #[error("connection buffer full")]
    Full,

    /// Any other transport failure.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// One live connection as seen by the hub.
pub trait EventSink: Send + Sync {
    /// Write one payload without blocking.
    fn deliver(&self, payload: Payload) -> Result<(), DeliveryError>;
}

/// A connection backed by a bounded channel whose receiver feeds a stream.
pub struct ChannelSink {
    sender: mpsc::Sender<Payload>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Payload>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelSink {
    fn deliver(&self, payload: Payload) -> Result<(), DeliveryError> {
        self.sender.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Identifier of a registered connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A channel-backed registration returned by [`BroadcastHub::subscribe_channel`].
pub struct Subscription {
    pub id: ConnectionId,
    pub receiver: mpsc::Receiver<Payload>,
}

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections the event was written to.
    pub delivered: usize,
    /// Connections whose write failed; they have been unregistered.
    pub failed: usize,
}

/// Statistics for monitoring hub health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubStats {
    pub events_published: u64,
    pub deliveries_failed: u64,
    pub active_connections: usize,
}

struct HubInner {
    connections: RwLock<HashMap<ConnectionId, Arc<dyn EventSink>>>,
    /// Serializes publishes so every connection sees the same order.
    publish_lock: Mutex<()>,
    next_id: AtomicU64,
    buffer: usize,
    events_published: AtomicU64,
    deliveries_failed: AtomicU64,
}

/// Registry of live connections with fan-out.
///
/// Cloning is cheap and every clone refers to the same registry. The
/// connection map is private: callers only register, unregister, and publish.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Default number of events buffered per channel-backed connection.
    pub const DEFAULT_BUFFER: usize = 64;

    /// Create a hub whose channel-backed connections buffer `buffer` events.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                connections: RwLock::new(HashMap::new()),
                publish_lock: Mutex::new(()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
                events_published: AtomicU64::new(0),
                deliveries_failed: AtomicU64::new(0),
            }),
        }
    }

    /// Register a connection.
    ///
    /// Registering the same sink twice yields two independent registrations,
    /// each of which receives every event.
    pub async fn subscribe(&self, sink: Arc<dyn EventSink>) -> ConnectionId {
        let id = ConnectionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut connections = self.inner.connections.write().await;
            connections.insert(id, sink);
            connections.len()
        };
        debug!(connection = %id, active = count, "Connection subscribed");
        id
    }

    /// Register a new channel-backed connection and return its receiving end.
    ///
    /// The hub holds the only sender, so unregistering the connection ends
    /// the receiver once buffered events are drained.
    pub async fn subscribe_channel(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.inner.buffer);
        let id = self.subscribe(Arc::new(ChannelSink::new(sender))).await;
        Subscription { id, receiver }
    }

    /// Unregister a connection. Returns `false` if it was not registered.
    pub async fn unsubscribe(&self, id: ConnectionId) -> bool {
        let removed = self.inner.connections.write().await.remove(&id).is_some();
        if removed {
            debug!(connection = %id, "Connection unsubscribed");
        }
        removed
    }

    /// Serialize `event` once and write it to every registered connection.
    pub async fn publish(&self, event: &SyncEvent) -> Result<PublishReport, HubError> {
        let payload: Payload = Arc::from(event.to_json()?);
        let report = self.publish_raw(payload).await;
        debug!(
            event_type = %event.event_type,
            delivered = report.delivered,
            failed = report.failed,
            "Event published"
        );
        Ok(report)
    }

    /// Write a pre-serialized payload to every registered connection.
    pub async fn publish_raw(&self, payload: Payload) -> PublishReport {
        let _order = self.inner.publish_lock.lock().await;

        // Iterate a snapshot so connections can come and go mid-broadcast.
        let targets: Vec<(ConnectionId, Arc<dyn EventSink>)> = self
            .inner
            .connections
            .read()
            .await
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        let mut report = PublishReport::default();
        let mut broken = Vec::new();

        for (id, sink) in targets {
            match sink.deliver(Arc::clone(&payload)) {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(connection = %id, error = %err, "Delivery failed, closing connection");
                    report.failed += 1;
                    broken.push(id);
                }
            }
        }

        if !broken.is_empty() {
            let mut connections = self.inner.connections.write().await;
            for id in &broken {
                connections.remove(id);
            }
            info!(closed = broken.len(), active = connections.len(), "Dropped failed connections");
        }

        self.inner.events_published.fetch_add(1, Ordering::Relaxed);
        self.inner
            .deliveries_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);

        report
    }

    /// Number of registered connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }

    /// Whether a connection is registered.
    pub async fn is_subscribed(&self, id: ConnectionId) -> bool {
        self.inner.connections.read().await.contains_key(&id)
    }

    /// Snapshot of hub statistics.
    pub async fn stats(&self) -> HubStats {
        HubStats {
            events_published: self.inner.events_published.load(Ordering::Relaxed),
            deliveries_failed: self.inner.deliveries_failed.load(Ordering::Relaxed),
            active_connections: self.connection_count().await,
        }
    }

    /// Buffer size used for channel-backed connections.
    pub fn buffer(&self) -> usize {
        self.inner.buffer
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BUFFER)
    }
}

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use counter_core::{Counter, EventType};
    use std::sync::Mutex as StdMutex;

    fn event(id: &str, value: i64) -> SyncEvent {
        let mut counter = Counter::new(id, "Test", 1);
        counter.value = value;
        SyncEvent::incremented(counter)
    }

    fn decode(payload: &Payload) -> SyncEvent {
        SyncEvent::from_json(payload).unwrap()
    }

    /// Records every payload it is given.
    #[derive(Default)]
    struct RecordingSink {
        seen: StdMutex<Vec<Payload>>,
    }

    impl EventSink for RecordingSink {
        fn deliver(&self, payload: Payload) -> Result<(), DeliveryError> {
            self.seen.lock().unwrap().push(payload);
            Ok(())
        }
    }

    /// Fails every write.
    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn deliver(&self, _payload: Payload) -> Result<(), DeliveryError> {
            Err(DeliveryError::Failed("socket reset".to_string()))
        }
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe() {
        let hub = BroadcastHub::new(8);
        let sub = hub.subscribe_channel().await;
        assert_eq!(hub.connection_count().await, 1);
        assert!(hub.is_subscribed(sub.id).await);

        assert!(hub.unsubscribe(sub.id).await);
        assert_eq!(hub.connection_count().await, 0);

        // Already removed: no-op
        assert!(!hub.unsubscribe(sub.id).await);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_connection_in_order() {
        let hub = BroadcastHub::new(16);
        let mut subs = Vec::new();
        for _ in 0..5 {
            subs.push(hub.subscribe_channel().await);
        }

        for value in 1..=3 {
            let report = hub.publish(&event("c1", value)).await.unwrap();
            assert_eq!(report.delivered, 5);
            assert_eq!(report.failed, 0);
        }

        for sub in &mut subs {
            for expected in 1..=3 {
                let payload = sub.receiver.recv().await.unwrap();
                assert_eq!(decode(&payload).counter.unwrap().value, expected);
            }
            // Exactly three deliveries
            assert!(sub.receiver.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_failing_connection_is_isolated() {
        let hub = BroadcastHub::new(16);
        let good_a = Arc::new(RecordingSink::default());
        let good_b = Arc::new(RecordingSink::default());

        hub.subscribe(good_a.clone()).await;
        let broken = hub.subscribe(Arc::new(BrokenSink)).await;
        hub.subscribe(good_b.clone()).await;

        let report = hub.publish(&event("c1", 1)).await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);

        assert_eq!(good_a.seen.lock().unwrap().len(), 1);
        assert_eq!(good_b.seen.lock().unwrap().len(), 1);

        // The broken connection was treated as closed
        assert!(!hub.is_subscribed(broken).await);
        assert_eq!(hub.connection_count().await, 2);

        let stats = hub.stats().await;
        assert_eq!(stats.events_published, 1);
        assert_eq!(stats.deliveries_failed, 1);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_dropped() {
        let hub = BroadcastHub::new(4);
        let gone = hub.subscribe_channel().await;
        let mut alive = hub.subscribe_channel().await;
        drop(gone.receiver);

        let report = hub.publish(&event("c1", 1)).await.unwrap();
        assert_eq!(report, PublishReport { delivered: 1, failed: 1 });
        assert!(alive.receiver.recv().await.is_some());
        assert!(!hub.is_subscribed(gone.id).await);
    }

    #[tokio::test]
    async fn test_slow_connection_is_closed_when_full() {
        let hub = BroadcastHub::new(1);
        let mut slow = hub.subscribe_channel().await;

        hub.publish(&event("c1", 1)).await.unwrap();
        let report = hub.publish(&event("c1", 2)).await.unwrap();
        assert_eq!(report.failed, 1);

        // Buffered event still arrives, then the stream ends
        assert!(slow.receiver.recv().await.is_some());
        assert!(slow.receiver.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_not_deduplicated() {
        let hub = BroadcastHub::default();
        let sink = Arc::new(RecordingSink::default());

        let first = hub.subscribe(sink.clone()).await;
        let second = hub.subscribe(sink.clone()).await;
        assert_ne!(first, second);

        hub.publish(&event("c1", 1)).await.unwrap();
        assert_eq!(sink.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_publish_without_connections() {
        let hub = BroadcastHub::default();
        let report = hub.publish(&event("c1", 1)).await.unwrap();
        assert_eq!(report, PublishReport::default());
    }

    #[tokio::test]
    async fn test_unsubscribe_during_concurrent_publish() {
        let hub = BroadcastHub::new(1024);
        let mut subs = Vec::new();
        for _ in 0..20 {
            subs.push(hub.subscribe_channel().await);
        }
        let ids: Vec<ConnectionId> = subs.iter().map(|s| s.id).collect();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for value in 0..200 {
                    hub.publish(&event("c1", value)).await.unwrap();
                }
            })
        };
        let remover = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for id in ids.into_iter().step_by(2) {
                    hub.unsubscribe(id).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        publisher.await.unwrap();
        remover.await.unwrap();
        assert_eq!(hub.connection_count().await, 10);

        // Survivors saw every event, in order
        for sub in subs.iter_mut().skip(1).step_by(2) {
            let mut expected = 0;
            while let Ok(payload) = sub.receiver.try_recv() {
                let event = decode(&payload);
                assert_eq!(event.event_type, EventType::CounterIncremented);
                assert_eq!(event.counter.unwrap().value, expected);
                expected += 1;
            }
            assert_eq!(expected, 200);
        }
    }
}
