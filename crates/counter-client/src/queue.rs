//! Offline action queue.
//!
//! Mutations that could not reach the server are recorded here and replayed
//! in order once the client is back online. Increments and decrements on the
//! same counter collapse into one net delta; creates, edits and deletes stay
//! discrete, ordered entries.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use counter_core::{now_millis, Counter, CounterPatch, NewCounter};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::api::RemoteCounters;
use crate::error::{ClientError, Result};
use crate::storage::{MemoryStorage, QueueStorage};

/// What a queued change does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Net of coalesced increments (+) and decrements (-). Never zero.
    Delta { delta: i64 },
    Create(NewCounter),
    Update(CounterPatch),
    Delete,
}

impl Operation {
    /// Operation name for logs and UI.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Delta { delta } if *delta > 0 => "increment",
            Operation::Delta { .. } => "decrement",
            Operation::Create(_) => "create",
            Operation::Update(_) => "update",
            Operation::Delete => "delete",
        }
    }

    pub fn is_delta(&self) -> bool {
        matches!(self, Operation::Delta { .. })
    }

    /// Send this operation for `counter_id`.
    pub async fn send<R>(&self, counter_id: &str, remote: &R) -> Result<Counter>
    where
        R: RemoteCounters + ?Sized,
    {
        match self {
            Operation::Delta { delta } => remote.apply_delta(counter_id, *delta).await,
            Operation::Create(input) => remote.create(input).await,
            Operation::Update(patch) => remote.update(counter_id, patch).await,
            Operation::Delete => remote.delete(counter_id).await,
        }
    }
}

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// Entry id, unique within the queue.
    pub id: String,
    pub counter_id: String,
    pub operation: Operation,
    /// Enqueue time in epoch millis.
    pub created_at: i64,
}

impl PendingChange {
    pub fn new(counter_id: impl Into<String>, operation: Operation) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            counter_id: counter_id.into(),
            operation,
            created_at: now_millis(),
        }
    }
}

/// Outcome of one replay pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Entries the server confirmed.
    pub replayed: usize,
    /// Entries the server rejected for good (e.g. the counter was deleted
    /// elsewhere), along with the later entries for the same counter that
    /// depended on them. They are gone from the queue.
    pub dropped: Vec<PendingChange>,
    /// Entries still queued after the pass.
    pub remaining: usize,
    /// The transient failure that stopped the pass, if any.
    pub stopped_on: Option<String>,
    /// Whether the local view was reloaded from the server afterwards.
    pub resynced: bool,
}

impl ReplayReport {
    /// The whole queue went through.
    pub fn is_complete(&self) -> bool {
        self.stopped_on.is_none() && self.remaining == 0
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: Vec<PendingChange>,
    /// Entry currently being sent; never merged into.
    in_flight: Option<String>,
}

impl QueueState {
    fn push(&mut self, counter_id: &str, operation: Operation) {
        if let Operation::Delta { delta } = operation {
            if delta == 0 {
                return;
            }

            // Only the newest entry for this counter may absorb the delta,
            // otherwise it would jump ahead of a later create/update/delete.
            let merge_at = self
                .entries
                .iter()
                .rposition(|c| c.counter_id == counter_id)
                .filter(|&pos| {
                    self.entries[pos].operation.is_delta()
                        && self.in_flight.as_deref() != Some(self.entries[pos].id.as_str())
                });

            // A sum outside the `i64` range starts a new entry instead
            if let Some(pos) = merge_at {
                if let Operation::Delta { delta: existing } = &mut self.entries[pos].operation {
                    if let Some(sum) = existing.checked_add(delta) {
                        *existing = sum;
                        if sum == 0 {
                            self.entries.remove(pos);
                        }
                        return;
                    }
                }
            }
        }

        self.entries.push(PendingChange::new(counter_id, operation));
    }

    fn remove(&mut self, id: &str) {
        self.entries.retain(|c| c.id != id);
    }

    /// Take every entry for `counter_id` out of the queue, oldest first.
    fn take_counter(&mut self, counter_id: &str) -> Vec<PendingChange> {
        let (taken, kept): (Vec<PendingChange>, Vec<PendingChange>) =
            std::mem::take(&mut self.entries)
                .into_iter()
                .partition(|c| c.counter_id == counter_id);
        self.entries = kept;
        taken
    }
}

enum Step {
    Confirmed,
    Dropped(ClientError, Vec<PendingChange>),
    Stop(ClientError),
}

/// The client's queue of unconfirmed mutations.
///
/// Owned by one process; two processes sharing a queue file would replay
/// each other's entries.
pub struct OfflineQueue {
    state: Mutex<QueueState>,
    storage: Arc<dyn QueueStorage>,
    /// Orders saves so the newest snapshot always lands last.
    persist_lock: tokio::sync::Mutex<()>,
    replay_lock: tokio::sync::Mutex<()>,
}

impl OfflineQueue {
    /// Open a queue over `storage`, restoring whatever it holds.
    ///
    /// Unreadable storage is logged and the queue starts empty.
    pub async fn open(storage: Arc<dyn QueueStorage>) -> Self {
        let entries = match storage.load().await {
            Ok(entries) => {
                if !entries.is_empty() {
                    info!(pending = entries.len(), "Restored offline queue");
                }
                entries
            }
            Err(e) => {
                error!(error = %e, "Failed to load offline queue, starting empty");
                Vec::new()
            }
        };

        Self {
            state: Mutex::new(QueueState {
                entries,
                in_flight: None,
            }),
            storage,
            persist_lock: tokio::sync::Mutex::new(()),
            replay_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// An empty queue that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            storage: Arc::new(MemoryStorage::new()),
            persist_lock: tokio::sync::Mutex::new(()),
            replay_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a change. Returns the number of pending entries afterwards.
    ///
    /// The change is kept in memory even if it cannot be written to storage.
    pub async fn enqueue(&self, counter_id: &str, operation: Operation) -> usize {
        let name = operation.name();
        let pending = {
            let mut state = self.lock();
            state.push(counter_id, operation);
            state.entries.len()
        };
        debug!(counter_id = %counter_id, operation = name, pending, "Change queued");

        self.persist().await;
        pending
    }

    pub fn count_pending(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Copy of the queued entries, oldest first.
    pub fn pending(&self) -> Vec<PendingChange> {
        self.lock().entries.clone()
    }

    /// Drop every entry and wipe storage.
    pub async fn clear(&self) {
        self.lock().entries.clear();

        let _guard = self.persist_lock.lock().await;
        if let Err(e) = self.storage.clear().await {
            error!(error = %e, "Failed to clear offline queue storage");
        }
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.pending();
        if let Err(e) = self.storage.save(&snapshot).await {
            error!(
                error = %e,
                pending = snapshot.len(),
                "Failed to persist offline queue, changes kept in memory"
            );
        }
    }

    /// Send queued entries one at a time, oldest first.
    ///
    /// Each entry is removed once the server confirms it. A transient failure
    /// stops the pass and leaves that entry and everything after it queued.
    ///
    /// An entry the server rejects outright (404, 400, 409) can never succeed.
    /// It is dropped together with every later entry for the same counter, so
    /// nothing for that counter is sent out of order; all of them are listed
    /// in the report and the pass goes on with the other counters.
    pub async fn replay<R>(&self, remote: &R) -> ReplayReport
    where
        R: RemoteCounters + ?Sized,
    {
        let _running = self.replay_lock.lock().await;
        let mut report = ReplayReport::default();

        loop {
            let next = {
                let mut state = self.lock();
                match state.entries.first().cloned() {
                    Some(change) => {
                        state.in_flight = Some(change.id.clone());
                        change
                    }
                    None => break,
                }
            };

            let result = next.operation.send(&next.counter_id, remote).await;

            let step = {
                let mut state = self.lock();
                state.in_flight = None;
                match result {
                    Ok(_) => {
                        state.remove(&next.id);
                        Step::Confirmed
                    }
                    Err(e) if e.is_transient() => Step::Stop(e),
                    Err(e) => {
                        let dropped = state.take_counter(&next.counter_id);
                        Step::Dropped(e, dropped)
                    }
                }
            };

            match step {
                Step::Confirmed => {
                    debug!(
                        counter_id = %next.counter_id,
                        operation = next.operation.name(),
                        "Replayed queued change"
                    );
                    report.replayed += 1;
                    self.persist().await;
                }
                Step::Dropped(e, dropped) => {
                    warn!(
                        counter_id = %next.counter_id,
                        operation = next.operation.name(),
                        error = %e,
                        dropped = dropped.len(),
                        "Dropping queued changes rejected by server"
                    );
                    report.dropped.extend(dropped);
                    self.persist().await;
                }
                Step::Stop(e) => {
                    warn!(
                        counter_id = %next.counter_id,
                        operation = next.operation.name(),
                        error = %e,
                        "Replay stopped, remaining changes stay queued"
                    );
                    report.stopped_on = Some(e.to_string());
                    break;
                }
            }
        }

        report.remaining = self.count_pending();
        report
    }
}
