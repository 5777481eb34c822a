//! Local view of the counters, including changes the server has not
//! confirmed yet.

use std::collections::BTreeMap;

use counter_core::Counter;

use crate::queue::Operation;

#[derive(Debug, Clone, Default)]
pub struct CounterCache {
    counters: BTreeMap<String, Counter>,
}

impl CounterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Counter> {
        self.counters.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.counters.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Every counter, ordered by id.
    pub fn list(&self) -> Vec<Counter> {
        self.counters.values().cloned().collect()
    }

    /// Replace the whole view with a server snapshot.
    pub fn replace_all(&mut self, counters: Vec<Counter>) {
        self.counters = counters.into_iter().map(|c| (c.id.clone(), c)).collect();
    }

    /// Take a server copy unless the one held is newer (last write wins on
    /// `last_updated`; a tie goes to the incoming copy). Returns whether it
    /// was taken.
    pub fn reconcile(&mut self, incoming: Counter) -> bool {
        if let Some(current) = self.counters.get(&incoming.id) {
            if current.last_updated > incoming.last_updated {
                return false;
            }
        }
        self.counters.insert(incoming.id.clone(), incoming);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Counter> {
        self.counters.remove(id)
    }

    /// Apply a change before the server confirms it.
    ///
    /// `last_updated` is left alone, so the server's copy of the same change
    /// always wins when it arrives. A created counter starts at `0` for the
    /// same reason. Returns the resulting counter, `None` for a delete, an
    /// unknown id or a delta the value cannot absorb.
    pub fn apply_optimistic(
        &mut self,
        counter_id: &str,
        operation: &Operation,
        now: i64,
    ) -> Option<Counter> {
        match operation {
            Operation::Create(input) => {
                let counter = self
                    .counters
                    .entry(counter_id.to_string())
                    .or_insert_with(|| input.to_counter(counter_id, 0));
                Some(counter.clone())
            }
            Operation::Delta { delta } => {
                let counter = self.counters.get_mut(counter_id)?;
                let stamp = counter.last_updated;
                counter.apply_delta(*delta, now).ok()?;
                counter.last_updated = stamp;
                Some(counter.clone())
            }
            Operation::Update(patch) => {
                let counter = self.counters.get_mut(counter_id)?;
                let stamp = counter.last_updated;
                counter.apply_patch(patch, now);
                counter.last_updated = stamp;
                Some(counter.clone())
            }
            Operation::Delete => {
                self.counters.remove(counter_id);
                None
            }
        }
    }
}
