//! Sync engine: optimistic local state, offline queueing and replay.
//!
//! Every mutation is validated, applied to the local cache, then sent. If the
//! client is offline, or the request fails in a way that may succeed later,
//! the change goes to the [`OfflineQueue`] instead and the caller still sees
//! the optimistic result. When the [`ConnectivityMonitor`] reports the way
//! back online the queue is replayed, and a complete replay is followed by a
//! full reload from the server.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use counter_core::validation::{validate_delta, validate_new_counter, validate_patch};
use counter_core::{now_millis, Counter, CounterPatch, EventType, NewCounter, SyncEvent};
use tracing::{debug, info, warn};

use crate::api::RemoteCounters;
use crate::cache::CounterCache;
use crate::error::{ClientError, Result};
use crate::monitor::ConnectivityMonitor;
use crate::queue::{OfflineQueue, Operation, ReplayReport};
use crate::subscriber::{Callbacks, StreamSubscriber};

/// Result of a mutation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// The counter as it now stands locally. `None` after a delete.
    pub counter: Option<Counter>,
    /// The change is waiting in the offline queue.
    pub queued: bool,
}

type SharedCache = Arc<RwLock<CounterCache>>;

fn read(cache: &SharedCache) -> RwLockReadGuard<'_, CounterCache> {
    cache.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(cache: &SharedCache) -> RwLockWriteGuard<'_, CounterCache> {
    cache.write().unwrap_or_else(PoisonError::into_inner)
}

/// Load a server snapshot, then lay the still-queued changes over it so the
/// optimistic view survives a reconnect.
fn apply_snapshot(cache: &SharedCache, queue: &OfflineQueue, counters: Vec<Counter>) -> Vec<Counter> {
    let pending = queue.pending();
    let now = now_millis();

    let mut cache = write(cache);
    cache.replace_all(counters);
    for change in &pending {
        cache.apply_optimistic(&change.counter_id, &change.operation, now);
    }
    cache.list()
}

pub struct SyncEngine {
    remote: Arc<dyn RemoteCounters>,
    queue: Arc<OfflineQueue>,
    monitor: Arc<ConnectivityMonitor>,
    cache: SharedCache,
    subscriber: Option<Arc<StreamSubscriber>>,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn RemoteCounters>,
        queue: Arc<OfflineQueue>,
        monitor: Arc<ConnectivityMonitor>,
    ) -> Self {
        Self {
            remote,
            queue,
            monitor,
            cache: Arc::new(RwLock::new(CounterCache::new())),
            subscriber: None,
        }
    }

    /// Reconnect this subscriber whenever the client comes back online.
    pub fn with_subscriber(mut self, subscriber: Arc<StreamSubscriber>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    /// Local view of every counter, ordered by id.
    pub fn counters(&self) -> Vec<Counter> {
        read(&self.cache).list()
    }

    pub fn counter(&self, id: &str) -> Option<Counter> {
        read(&self.cache).get(id).cloned()
    }

    /// Changes not yet confirmed by the server.
    pub fn pending_count(&self) -> usize {
        self.queue.count_pending()
    }

    /// Create a counter. The id is generated here so a queued create replays
    /// onto the same record.
    pub async fn create(&self, name: &str, daily_goal: Option<i64>) -> Result<Mutation> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut input = NewCounter::named(name.trim()).with_id(id.clone());
        input.daily_goal = daily_goal;
        validate_new_counter(&input)?;

        self.submit(&id, Operation::Create(input)).await
    }

    pub async fn increment(&self, id: &str) -> Result<Mutation> {
        self.apply_delta(id, 1).await
    }

    pub async fn decrement(&self, id: &str) -> Result<Mutation> {
        self.apply_delta(id, -1).await
    }

    pub async fn apply_delta(&self, id: &str, delta: i64) -> Result<Mutation> {
        validate_delta(delta)?;
        self.ensure_known(id)?;
        // Refuse a delta the local value cannot absorb rather than queue it
        if let Some(mut counter) = self.counter(id) {
            counter.apply_delta(delta, now_millis())?;
        }
        self.submit(id, Operation::Delta { delta }).await
    }

    /// Edit name, value and/or daily goal.
    pub async fn update(&self, id: &str, patch: CounterPatch) -> Result<Mutation> {
        validate_patch(&patch)?;
        self.ensure_known(id)?;
        if patch.is_empty() {
            return Ok(Mutation {
                counter: self.counter(id),
                queued: false,
            });
        }
        self.submit(id, Operation::Update(patch)).await
    }

    pub async fn reset(&self, id: &str) -> Result<Mutation> {
        self.update(id, CounterPatch::reset()).await
    }

    pub async fn delete(&self, id: &str) -> Result<Mutation> {
        self.ensure_known(id)?;
        self.submit(id, Operation::Delete).await
    }

    fn ensure_known(&self, id: &str) -> Result<()> {
        if read(&self.cache).contains(id) {
            Ok(())
        } else {
            Err(ClientError::UnknownCounter(id.to_string()))
        }
    }

    async fn submit(&self, counter_id: &str, operation: Operation) -> Result<Mutation> {
        let name = operation.name();
        let optimistic = write(&self.cache).apply_optimistic(counter_id, &operation, now_millis());

        // Queued changes go first, so anything new lines up behind them
        if !self.monitor.is_online() || !self.queue.is_empty() {
            self.queue.enqueue(counter_id, operation).await;
            if self.monitor.is_online() {
                self.replay().await;
            }
            return Ok(Mutation {
                counter: self.counter(counter_id).or(optimistic),
                queued: !self.queue.is_empty(),
            });
        }

        match operation.send(counter_id, self.remote.as_ref()).await {
            Ok(confirmed) => {
                self.monitor.report_success();
                let counter = if matches!(operation, Operation::Delete) {
                    write(&self.cache).remove(counter_id);
                    None
                } else {
                    let mut cache = write(&self.cache);
                    cache.reconcile(confirmed.clone());
                    Some(cache.get(counter_id).cloned().unwrap_or(confirmed))
                };
                Ok(Mutation {
                    counter,
                    queued: false,
                })
            }
            Err(e) if e.is_transient() => {
                warn!(
                    counter_id = %counter_id,
                    operation = name,
                    error = %e,
                    "Request failed, change queued"
                );
                self.queue.enqueue(counter_id, operation).await;
                self.monitor.report_failure();
                Ok(Mutation {
                    counter: optimistic,
                    queued: true,
                })
            }
            Err(e) => {
                if e.is_not_found() {
                    write(&self.cache).remove(counter_id);
                }
                Err(e)
            }
        }
    }

    /// Reload every counter from the server.
    pub async fn resync(&self) -> Result<usize> {
        let counters = self.remote.list().await?;
        let count = counters.len();
        apply_snapshot(&self.cache, &self.queue, counters);
        debug!(count, "Resynced counters");
        Ok(count)
    }

    /// Handle a signal that the server is reachable again.
    ///
    /// On a real offline-to-online transition with changes waiting, replays
    /// the queue, then reopens the live stream so its snapshot already holds
    /// the replayed changes. Repeated signals while online or while a replay
    /// is running do not replay.
    pub async fn handle_online(&self) -> Option<ReplayReport> {
        let transitioned = self.monitor.set_online();
        let report = if !transitioned {
            debug!("Already online");
            None
        } else if self.queue.is_empty() {
            None
        } else {
            self.replay().await
        };

        if let Some(subscriber) = &self.subscriber {
            subscriber.connect();
        }
        report
    }

    /// Feed the result of a reachability probe.
    pub async fn check_connectivity(&self, reachable: bool) -> Option<ReplayReport> {
        if reachable {
            self.handle_online().await
        } else {
            self.monitor.report_failure();
            None
        }
    }

    /// Replay the offline queue now. `None` if a replay is already running.
    pub async fn replay(&self) -> Option<ReplayReport> {
        let Some(_slot) = self.monitor.begin_replay() else {
            debug!("Replay already in flight");
            return None;
        };

        info!(pending = self.queue.count_pending(), "Replaying offline queue");
        let mut report = self.queue.replay(self.remote.as_ref()).await;

        if report.is_complete() {
            match self.resync().await {
                Ok(_) => report.resynced = true,
                Err(e) => warn!(error = %e, "Resync after replay failed"),
            }
            info!(
                replayed = report.replayed,
                dropped = report.dropped.len(),
                "Replay finished"
            );
        } else {
            self.monitor.report_failure();
            warn!(
                replayed = report.replayed,
                remaining = report.remaining,
                "Replay incomplete"
            );
        }

        Some(report)
    }

    /// Stream handlers that keep the local cache current and then forward
    /// to `listeners`.
    ///
    /// Install with [`StreamSubscriber::set_callbacks`]; call again with new
    /// listeners at any time without reconnecting.
    pub fn stream_callbacks(&self, listeners: Callbacks) -> Callbacks {
        let forward = |event_type: EventType| {
            let cache = self.cache.clone();
            let listeners = listeners.clone();
            move |counter: Counter| {
                let taken = write(&cache).reconcile(counter.clone());
                if taken {
                    listeners.dispatch(SyncEvent {
                        event_type,
                        counter: Some(counter),
                        counters: None,
                        timestamp: now_millis(),
                    });
                } else {
                    debug!(counter_id = %counter.id, "Ignoring stale counter event");
                }
            }
        };

        let on_initial = {
            let cache = self.cache.clone();
            let queue = self.queue.clone();
            let listeners = listeners.clone();
            move |counters: Vec<Counter>| {
                let view = apply_snapshot(&cache, &queue, counters);
                listeners.dispatch(SyncEvent::initial(view));
            }
        };

        let on_deleted = {
            let cache = self.cache.clone();
            let listeners = listeners.clone();
            move |counter: Counter| {
                write(&cache).remove(&counter.id);
                listeners.dispatch(SyncEvent::deleted(counter));
            }
        };

        let on_disconnect = {
            let monitor = self.monitor.clone();
            let listeners = listeners.clone();
            move |reason: &str| {
                monitor.report_failure();
                listeners.disconnected(reason);
            }
        };

        Callbacks::new()
            .on_initial(on_initial)
            .on_created(forward(EventType::CounterCreated))
            .on_updated(forward(EventType::CounterUpdated))
            .on_incremented(forward(EventType::CounterIncremented))
            .on_decremented(forward(EventType::CounterDecremented))
            .on_deleted(on_deleted)
            .on_disconnect(on_disconnect)
    }
}
