//! Live stream subscriber.
//!
//! Holds at most one open stream per subscriber and turns incoming events
//! into callback invocations. There is no automatic reconnect: a transport
//! error closes the stream and the next [`StreamSubscriber::connect`] (usually
//! on the next online transition) opens a fresh one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use counter_core::{Counter, EventType, SyncEvent};
use futures::StreamExt;
use reqwest_eventsource::{retry, Event, EventSource, RequestBuilderExt};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::monitor::ConnectivityMonitor;

pub type SnapshotCallback = Arc<dyn Fn(Vec<Counter>) + Send + Sync>;
pub type CounterCallback = Arc<dyn Fn(Counter) + Send + Sync>;
pub type DisconnectCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// The set of handlers invoked for incoming events. Unset handlers are
/// skipped silently.
#[derive(Clone, Default)]
pub struct Callbacks {
    initial: Option<SnapshotCallback>,
    created: Option<CounterCallback>,
    updated: Option<CounterCallback>,
    deleted: Option<CounterCallback>,
    incremented: Option<CounterCallback>,
    decremented: Option<CounterCallback>,
    disconnected: Option<DisconnectCallback>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_initial(mut self, f: impl Fn(Vec<Counter>) + Send + Sync + 'static) -> Self {
        self.initial = Some(Arc::new(f));
        self
    }

    pub fn on_created(mut self, f: impl Fn(Counter) + Send + Sync + 'static) -> Self {
        self.created = Some(Arc::new(f));
        self
    }

    pub fn on_updated(mut self, f: impl Fn(Counter) + Send + Sync + 'static) -> Self {
        self.updated = Some(Arc::new(f));
        self
    }

    pub fn on_deleted(mut self, f: impl Fn(Counter) + Send + Sync + 'static) -> Self {
        self.deleted = Some(Arc::new(f));
        self
    }

    pub fn on_incremented(mut self, f: impl Fn(Counter) + Send + Sync + 'static) -> Self {
        self.incremented = Some(Arc::new(f));
        self
    }

    pub fn on_decremented(mut self, f: impl Fn(Counter) + Send + Sync + 'static) -> Self {
        self.decremented = Some(Arc::new(f));
        self
    }

    /// Called with the error message when the transport fails.
    pub fn on_disconnect(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.disconnected = Some(Arc::new(f));
        self
    }

    /// Handler for the single-counter event types.
    fn for_counter(&self, event_type: EventType) -> Option<&CounterCallback> {
        match event_type {
            EventType::Initial => None,
            EventType::CounterCreated => self.created.as_ref(),
            EventType::CounterUpdated => self.updated.as_ref(),
            EventType::CounterDeleted => self.deleted.as_ref(),
            EventType::CounterIncremented => self.incremented.as_ref(),
            EventType::CounterDecremented => self.decremented.as_ref(),
        }
    }

    /// Route an event to its handler. Returns `false` if nothing handled it.
    pub fn dispatch(&self, event: SyncEvent) -> bool {
        if event.event_type == EventType::Initial {
            return match (&self.initial, event.counters) {
                (Some(callback), Some(counters)) => {
                    callback(counters);
                    true
                }
                _ => false,
            };
        }

        match (self.for_counter(event.event_type), event.counter) {
            (Some(callback), Some(counter)) => {
                callback(counter);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn disconnected(&self, reason: &str) {
        if let Some(callback) = &self.disconnected {
            callback(reason);
        }
    }
}

struct Connection {
    generation: u64,
    active: Arc<AtomicBool>,
    shutdown: Option<oneshot::Sender<()>>,
}

type Slot = Arc<Mutex<Option<Connection>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<Connection>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client side of the live update stream.
pub struct StreamSubscriber {
    config: ClientConfig,
    http: reqwest::Client,
    monitor: Arc<ConnectivityMonitor>,
    /// Read on every dispatch, so handlers can be swapped without reconnecting.
    callbacks: Arc<RwLock<Callbacks>>,
    slot: Slot,
    generation: AtomicU64,
}

impl StreamSubscriber {
    pub fn new(config: ClientConfig, monitor: Arc<ConnectivityMonitor>) -> Result<Self> {
        // Long-lived stream: no request timeout
        let http = reqwest::Client::builder()
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self {
            config,
            http,
            monitor,
            callbacks: Arc::new(RwLock::new(Callbacks::default())),
            slot: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
        })
    }

    /// Replace the handlers. An open stream keeps running and uses the new
    /// set from its next event on.
    pub fn set_callbacks(&self, callbacks: Callbacks) {
        *self
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner) = callbacks;
    }

    /// Whether a stream is currently open.
    pub fn is_connected(&self) -> bool {
        lock(&self.slot).is_some()
    }

    /// Open the stream if none is open and the monitor reports online.
    ///
    /// Returns `true` if a new stream was started. Must be called from within
    /// a tokio runtime.
    pub fn connect(&self) -> bool {
        if !self.monitor.is_online() {
            debug!("Offline, not opening live stream");
            return false;
        }

        let mut slot = lock(&self.slot);
        if slot.is_some() {
            debug!("Live stream already open");
            return false;
        }

        let url = self.config.stream_url();
        let mut source = match self.http.get(&url).eventsource() {
            Ok(source) => source,
            Err(e) => {
                error!(error = %e, "Failed to create live stream request");
                return false;
            }
        };
        source.set_retry_policy(Box::new(retry::Never));

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let active = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        info!(url = %url, "Opening live stream");
        tokio::spawn(run_connection(
            source,
            self.callbacks.clone(),
            self.slot.clone(),
            generation,
            active.clone(),
            shutdown_rx,
        ));

        *slot = Some(Connection {
            generation,
            active,
            shutdown: Some(shutdown_tx),
        });
        true
    }

    /// Close the open stream, if any. No callback fires after this returns.
    pub fn disconnect(&self) -> bool {
        let connection = lock(&self.slot).take();
        match connection {
            Some(mut connection) => {
                connection.active.store(false, Ordering::SeqCst);
                if let Some(shutdown) = connection.shutdown.take() {
                    let _ = shutdown.send(());
                }
                info!("Live stream closed");
                true
            }
            None => false,
        }
    }
}

impl Drop for StreamSubscriber {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_connection(
    mut source: EventSource,
    callbacks: Arc<RwLock<Callbacks>>,
    slot: Slot,
    generation: u64,
    active: Arc<AtomicBool>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let current = || {
        callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    };

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            next = source.next() => match next {
                Some(Ok(Event::Open)) => debug!("Live stream connected"),
                Some(Ok(Event::Message(message))) => {
                    if !active.load(Ordering::SeqCst) {
                        break;
                    }
                    match SyncEvent::from_json(&message.data) {
                        Ok(event) => {
                            let event_type = event.event_type;
                            if !current().dispatch(event) {
                                debug!(event = %event_type, "No callback for event");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Dropping unparseable stream message");
                            debug!("Raw data: {}", message.data);
                        }
                    }
                }
                Some(Err(e)) => {
                    error!(error = %e, "Live stream transport error");
                    if active.load(Ordering::SeqCst) {
                        current().disconnected(&e.to_string());
                    }
                    break;
                }
                None => {
                    info!("Live stream ended");
                    break;
                }
            }
        }
    }

    source.close();

    // Discard the handle unless a newer connection already replaced it
    let mut slot = lock(&slot);
    if slot.as_ref().map(|c| c.generation) == Some(generation) {
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI64;

    use crate::monitor::Connectivity;

    #[test]
    fn test_dispatch_routes_by_type() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = |tag: &'static str| {
            let seen = seen.clone();
            move |c: Counter| seen.lock().unwrap().push(format!("{} {}", tag, c.id))
        };

        let callbacks = Callbacks::new()
            .on_created(log("created"))
            .on_incremented(log("incremented"))
            .on_deleted(log("deleted"));

        assert!(callbacks.dispatch(SyncEvent::created(Counter::new("a", "A", 1))));
        assert!(callbacks.dispatch(SyncEvent::incremented(Counter::new("a", "A", 2))));
        assert!(callbacks.dispatch(SyncEvent::deleted(Counter::new("a", "A", 3))));
        // No handler registered
        assert!(!callbacks.dispatch(SyncEvent::decremented(Counter::new("a", "A", 4))));
        assert!(!callbacks.dispatch(SyncEvent::initial(Vec::new())));

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["created a", "incremented a", "deleted a"]
        );
    }

    #[test]
    fn test_dispatch_initial_passes_snapshot() {
        let count = Arc::new(AtomicI64::new(-1));
        let sink = count.clone();
        let callbacks = Callbacks::new().on_initial(move |counters| {
            sink.store(counters.len() as i64, Ordering::SeqCst);
        });

        let snapshot = vec![Counter::new("a", "A", 1), Counter::new("b", "B", 1)];
        assert!(callbacks.dispatch(SyncEvent::initial(snapshot)));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_connection_while_offline() {
        let monitor = Arc::new(ConnectivityMonitor::new(Connectivity::Offline));
        let subscriber = StreamSubscriber::new(ClientConfig::default(), monitor).unwrap();

        assert!(!subscriber.connect());
        assert!(!subscriber.is_connected());
        assert!(!subscriber.disconnect());
    }

    #[tokio::test]
    async fn test_single_connection() {
        // Accepts the connection and never answers, so the stream stays pending
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let monitor = Arc::new(ConnectivityMonitor::default());
        let config = ClientConfig::new(format!("http://{}", addr));
        let subscriber = StreamSubscriber::new(config, monitor.clone()).unwrap();

        assert!(subscriber.connect());
        assert!(subscriber.is_connected());
        assert!(!subscriber.connect());

        // Going offline does not tear down the open stream
        monitor.set_offline();
        assert!(subscriber.is_connected());

        assert!(subscriber.disconnect());
        assert!(!subscriber.is_connected());
        assert!(!subscriber.disconnect());
    }
}
