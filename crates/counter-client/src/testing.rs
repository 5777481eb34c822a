//! Test doubles shared by the unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use counter_core::{now_millis, Counter, CounterPatch, NewCounter};

use crate::api::RemoteCounters;
use crate::error::{ClientError, Result};
use crate::queue::{OfflineQueue, Operation, PendingChange};
use crate::storage::QueueStorage;

/// In-process stand-in for the server that records every call.
#[derive(Default)]
pub(crate) struct MockRemote {
    counters: Mutex<BTreeMap<String, Counter>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    reject_creates: AtomicBool,
    /// Held by a test to park calls mid-flight.
    pub gate: tokio::sync::Mutex<()>,
    hook: Mutex<Option<(Arc<OfflineQueue>, String, i64)>>,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, counter: Counter) {
        self.counters
            .lock()
            .unwrap()
            .insert(counter.id.clone(), counter);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn value_of(&self, id: &str) -> Option<i64> {
        self.counters.lock().unwrap().get(id).map(|c| c.value)
    }

    /// Make every call fail with a 503.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Answer every create with a 400.
    pub fn set_reject_creates(&self, reject: bool) {
        self.reject_creates.store(reject, Ordering::SeqCst);
    }

    /// Enqueue a delta while the next call is in flight.
    pub fn enqueue_during_next_call(&self, queue: Arc<OfflineQueue>, id: &str, delta: i64) {
        *self.hook.lock().unwrap() = Some((queue, id.to_string(), delta));
    }

    async fn begin(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call);

        let _gate = self.gate.lock().await;

        let hook = self.hook.lock().unwrap().take();
        if let Some((queue, id, delta)) = hook {
            queue.enqueue(&id, Operation::Delta { delta }).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn with_counter<F>(&self, id: &str, f: F) -> Result<Counter>
    where
        F: FnOnce(&mut Counter) -> Result<()>,
    {
        let mut counters = self.counters.lock().unwrap();
        let counter = counters.get_mut(id).ok_or_else(|| ClientError::Api {
            status: 404,
            message: format!("Counter not found: {}", id),
        })?;
        f(counter)?;
        Ok(counter.clone())
    }
}

#[async_trait]
impl RemoteCounters for MockRemote {
    async fn list(&self) -> Result<Vec<Counter>> {
        self.begin("list".to_string()).await?;
        Ok(self.counters.lock().unwrap().values().cloned().collect())
    }

    async fn create(&self, input: &NewCounter) -> Result<Counter> {
        let id = input.id.clone().unwrap_or_else(|| "generated".to_string());
        self.begin(format!("create {}", id)).await?;
        if self.reject_creates.load(Ordering::SeqCst) {
            return Err(ClientError::Api {
                status: 400,
                message: "rejected".to_string(),
            });
        }

        let mut counters = self.counters.lock().unwrap();
        let counter = counters
            .entry(id.clone())
            .and_modify(|c| c.name = input.name.clone())
            .or_insert_with(|| input.to_counter(id, now_millis()));
        Ok(counter.clone())
    }

    async fn update(&self, id: &str, patch: &CounterPatch) -> Result<Counter> {
        self.begin(format!("update {}", id)).await?;
        self.with_counter(id, |c| {
            c.apply_patch(patch, now_millis());
            Ok(())
        })
    }

    async fn delete(&self, id: &str) -> Result<Counter> {
        self.begin(format!("delete {}", id)).await?;
        self.counters
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| ClientError::Api {
                status: 404,
                message: format!("Counter not found: {}", id),
            })
    }

    async fn apply_delta(&self, id: &str, delta: i64) -> Result<Counter> {
        self.begin(format!("delta {} {}", id, delta)).await?;
        self.with_counter(id, |c| {
            c.apply_delta(delta, now_millis())
                .map_err(|e| ClientError::Api {
                    status: 400,
                    message: e.to_string(),
                })
        })
    }
}

/// Storage that always fails.
pub(crate) struct FailingStorage;

#[async_trait]
impl QueueStorage for FailingStorage {
    async fn load(&self) -> Result<Vec<PendingChange>> {
        Err(std::io::Error::other("quota exceeded").into())
    }

    async fn save(&self, _changes: &[PendingChange]) -> Result<()> {
        Err(std::io::Error::other("quota exceeded").into())
    }

    async fn clear(&self) -> Result<()> {
        Err(std::io::Error::other("quota exceeded").into())
    }
}
