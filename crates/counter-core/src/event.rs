//! Sync events pushed over the live update stream.

use serde::{Deserialize, Serialize};

use crate::counter::{now_millis, Counter};
use crate::error::CoreError;

/// Kind of change a [`SyncEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Full snapshot, sent once when a connection opens
    Initial,
    CounterCreated,
    CounterUpdated,
    CounterDeleted,
    CounterIncremented,
    CounterDecremented,
}

impl EventType {
    /// Wire name of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Initial => "initial",
            EventType::CounterCreated => "counter_created",
            EventType::CounterUpdated => "counter_updated",
            EventType::CounterDeleted => "counter_deleted",
            EventType::CounterIncremented => "counter_incremented",
            EventType::CounterDecremented => "counter_decremented",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single broadcast message.
///
/// `counter` is present for every type except [`EventType::Initial`], which
/// carries `counters` instead. Events are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter: Option<Counter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counters: Option<Vec<Counter>>,
    /// Emission time in epoch millis.
    pub timestamp: i64,
}

impl SyncEvent {
    fn single(event_type: EventType, counter: Counter) -> Self {
        Self {
            event_type,
            counter: Some(counter),
            counters: None,
            timestamp: now_millis(),
        }
    }

    /// Snapshot of every counter, sent first on a new connection.
    pub fn initial(counters: Vec<Counter>) -> Self {
        Self {
            event_type: EventType::Initial,
            counter: None,
            counters: Some(counters),
            timestamp: now_millis(),
        }
    }

    pub fn created(counter: Counter) -> Self {
        Self::single(EventType::CounterCreated, counter)
    }

    pub fn updated(counter: Counter) -> Self {
        Self::single(EventType::CounterUpdated, counter)
    }

    pub fn deleted(counter: Counter) -> Self {
        Self::single(EventType::CounterDeleted, counter)
    }

    pub fn incremented(counter: Counter) -> Self {
        Self::single(EventType::CounterIncremented, counter)
    }

    pub fn decremented(counter: Counter) -> Self {
        Self::single(EventType::CounterDecremented, counter)
    }

    /// Event for an arbitrary delta: incremented when positive, decremented otherwise.
    pub fn for_delta(counter: Counter, delta: i64) -> Self {
        if delta > 0 {
            Self::incremented(counter)
        } else {
            Self::decremented(counter)
        }
    }

    /// Serialize to the JSON carried in a stream message.
    pub fn to_json(&self) -> Result<String, CoreError> {
        serde_json::to_string(self).map_err(CoreError::from)
    }

    /// Parse a stream message payload.
    pub fn from_json(data: &str) -> Result<Self, CoreError> {
        let event: SyncEvent = serde_json::from_str(data)?;
        event.check_shape()?;
        Ok(event)
    }

    fn check_shape(&self) -> Result<(), CoreError> {
        match (self.event_type, &self.counter, &self.counters) {
            (EventType::Initial, _, Some(_)) => Ok(()),
            (EventType::Initial, _, None) => Err(CoreError::MalformedEvent(
                "initial event without counters".to_string(),
            )),
            (_, Some(_), _) => Ok(()),
            (other, None, _) => Err(CoreError::MalformedEvent(format!(
                "{} event without counter",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(id: &str, value: i64) -> Counter {
        let mut c = Counter::new(id, id.to_uppercase(), 1_000);
        c.value = value;
        c
    }

    #[test]
    fn test_initial_wire_shape() {
        let event = SyncEvent::initial(vec![counter("a", 5), counter("b", 3)]);
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "initial");
        assert_eq!(json["counters"].as_array().unwrap().len(), 2);
        assert!(json.get("counter").is_none());
        assert!(json["timestamp"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_single_counter_wire_shape() {
        let event = SyncEvent::incremented(counter("c1", 1));
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "counter_incremented");
        assert_eq!(json["counter"]["id"], "c1");
        assert_eq!(json["counter"]["value"], 1);
        assert!(json.get("counters").is_none());
    }

    #[test]
    fn test_for_delta_picks_type() {
        assert_eq!(
            SyncEvent::for_delta(counter("c", 3), 3).event_type,
            EventType::CounterIncremented
        );
        assert_eq!(
            SyncEvent::for_delta(counter("c", -2), -2).event_type,
            EventType::CounterDecremented
        );
    }

    #[test]
    fn test_from_json_accepts_wire_format() {
        let data = r#"{"type":"counter_deleted","counter":{"id":"c9","name":"Gone","value":4,"lastUpdated":7},"timestamp":8}"#;
        let event = SyncEvent::from_json(data).unwrap();
        assert_eq!(event.event_type, EventType::CounterDeleted);
        assert_eq!(event.counter.unwrap().id, "c9");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(SyncEvent::from_json("not json").is_err());
        assert!(SyncEvent::from_json(r#"{"type":"bogus","timestamp":1}"#).is_err());
    }

    #[test]
    fn test_from_json_rejects_missing_payload() {
        let err = SyncEvent::from_json(r#"{"type":"counter_updated","timestamp":1}"#).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(_)));

        let err = SyncEvent::from_json(r#"{"type":"initial","timestamp":1}"#).unwrap_err();
        assert!(matches!(err, CoreError::MalformedEvent(_)));
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(EventType::Initial.to_string(), "initial");
        assert_eq!(EventType::CounterDecremented.as_str(), "counter_decremented");
    }
}
