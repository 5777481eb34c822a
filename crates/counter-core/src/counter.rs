//! The counter entity and its mutation inputs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::validation::ValidationError;

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// The `YYYY-MM-DD` (UTC) history key for an epoch-millisecond timestamp.
pub fn day_key(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

/// A named counter shared by every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counter {
    /// Stable unique identifier, never reused.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Running count. Unbounded, may go negative.
    pub value: i64,
    /// Daily target. `None` means no goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_goal: Option<i64>,
    /// Net delta applied today (UTC).
    #[serde(default)]
    pub daily_count: i64,
    /// Net delta per day, keyed by `YYYY-MM-DD`.
    #[serde(default)]
    pub history: BTreeMap<String, i64>,
    /// Reference to the stored image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Last mutation time (epoch millis), used as a last-write-wins marker.
    pub last_updated: i64,
}

impl Counter {
    /// Create a counter at zero with no goal.
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            value: 0,
            daily_goal: None,
            daily_count: 0,
            history: BTreeMap::new(),
            image_url: None,
            last_updated: now,
        }
    }

    /// Apply a delta, recording it against the day of `now`.
    ///
    /// Leaves the counter untouched if the value or today's history entry
    /// would leave the `i64` range.
    pub fn apply_delta(&mut self, delta: i64, now: i64) -> Result<(), ValidationError> {
        let today = day_key(now);
        let current_day = self.history.get(&today).copied().unwrap_or(0);

        let value = self
            .value
            .checked_add(delta)
            .ok_or(ValidationError::Overflow(delta))?;
        let day = current_day
            .checked_add(delta)
            .ok_or(ValidationError::Overflow(delta))?;

        self.value = value;
        self.history.insert(today, day);
        self.daily_count = day;
        self.last_updated = now;
        Ok(())
    }

    /// Recompute `daily_count` for the day of `now` from `history`.
    pub fn refresh_daily_count(&mut self, now: i64) {
        self.daily_count = self.history.get(&day_key(now)).copied().unwrap_or(0);
    }

    /// Whether a positive daily goal is set.
    pub fn has_goal(&self) -> bool {
        matches!(self.daily_goal, Some(goal) if goal > 0)
    }

    /// Progress towards today's goal in `[0, 1]`, or `None` without a goal.
    pub fn goal_progress(&self) -> Option<f64> {
        match self.daily_goal {
            Some(goal) if goal > 0 => Some((self.daily_count as f64 / goal as f64).clamp(0.0, 1.0)),
            _ => None,
        }
    }

    /// Apply an edit in place. Returns `true` if any field changed.
    pub fn apply_patch(&mut self, patch: &CounterPatch, now: i64) -> bool {
        let mut changed = false;
        if let Some(name) = &patch.name {
            let name = name.trim();
            if self.name != name {
                self.name = name.to_string();
                changed = true;
            }
        }
        if let Some(value) = patch.value {
            if self.value != value {
                self.value = value;
                changed = true;
            }
        }
        if let Some(goal) = patch.daily_goal {
            let goal = if goal == 0 { None } else { Some(goal) };
            if self.daily_goal != goal {
                self.daily_goal = goal;
                changed = true;
            }
        }
        if changed {
            self.last_updated = now;
        }
        changed
    }
}

/// Fields for creating (or upserting) a counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCounter {
    /// Client-chosen id. The server assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_goal: Option<i64>,
}

impl NewCounter {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_goal(mut self, goal: i64) -> Self {
        self.daily_goal = Some(goal);
        self
    }

    /// Build the counter this input describes, as the client shows it before
    /// the server confirms.
    pub fn to_counter(&self, id: impl Into<String>, now: i64) -> Counter {
        let mut counter = Counter::new(id, self.name.trim(), now);
        counter.value = self.value.unwrap_or(0);
        counter.daily_goal = self.daily_goal.filter(|goal| *goal > 0);
        counter
    }
}

/// A partial edit of a counter. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<i64>,
    /// `Some(0)` clears the goal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_goal: Option<i64>,
}

impl CounterPatch {
    /// A patch that sets the value back to zero.
    pub fn reset() -> Self {
        Self {
            value: Some(0),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.value.is_none() && self.daily_goal.is_none()
    }

    /// Fold a later patch into this one; later fields win.
    pub fn merge(&mut self, later: &CounterPatch) {
        if later.name.is_some() {
            self.name = later.name.clone();
        }
        if later.value.is_some() {
            self.value = later.value;
        }
        if later.daily_goal.is_some() {
            self.daily_goal = later.daily_goal;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2026-10-17T12:00:00Z
    const NOON: i64 = 1_792_238_400_000;

    #[test]
    fn test_day_key() {
        assert_eq!(day_key(NOON), "2026-10-17");
        assert_eq!(day_key(NOON + 12 * 3_600_000), "2026-10-18");
    }

    #[test]
    fn test_apply_delta_tracks_history() {
        let mut counter = Counter::new("c1", "Water", 0);
        counter.apply_delta(1, NOON).unwrap();
        counter.apply_delta(1, NOON + 1_000).unwrap();
        counter.apply_delta(-3, NOON + 2_000).unwrap();

        assert_eq!(counter.value, -1);
        assert_eq!(counter.daily_count, -1);
        assert_eq!(counter.history.get("2026-10-17"), Some(&-1));
        assert_eq!(counter.last_updated, NOON + 2_000);

        // Next day starts from zero
        counter.apply_delta(2, NOON + 24 * 3_600_000).unwrap();
        assert_eq!(counter.daily_count, 2);
        assert_eq!(counter.value, 1);
        assert_eq!(counter.history.len(), 2);
    }

    #[test]
    fn test_apply_delta_rejects_overflow() {
        let mut counter = Counter::new("c1", "Big", 0);
        counter.apply_delta(i64::MAX, NOON).unwrap();

        assert_eq!(
            counter.apply_delta(1, NOON + 1_000),
            Err(ValidationError::Overflow(1))
        );
        assert_eq!(counter.value, i64::MAX);
        assert_eq!(counter.history.get("2026-10-17"), Some(&i64::MAX));
        assert_eq!(counter.last_updated, NOON);

        // Back inside the range is fine
        counter.apply_delta(-1, NOON + 2_000).unwrap();
        assert_eq!(counter.value, i64::MAX - 1);
    }

    #[test]
    fn test_goal_progress() {
        let mut counter = Counter::new("c1", "Pages", NOON);
        assert_eq!(counter.goal_progress(), None);
        assert!(!counter.has_goal());

        counter.daily_goal = Some(4);
        counter.apply_delta(1, NOON).unwrap();
        assert_eq!(counter.goal_progress(), Some(0.25));

        counter.apply_delta(10, NOON).unwrap();
        assert_eq!(counter.goal_progress(), Some(1.0));

        counter.daily_goal = Some(0);
        assert_eq!(counter.goal_progress(), None);
    }

    #[test]
    fn test_apply_patch() {
        let mut counter = Counter::new("c1", "Old", NOON);
        counter.daily_goal = Some(5);

        let patch = CounterPatch {
            name: Some("  New ".to_string()),
            value: Some(42),
            daily_goal: Some(0),
        };
        assert!(counter.apply_patch(&patch, NOON + 5));
        assert_eq!(counter.name, "New");
        assert_eq!(counter.value, 42);
        assert_eq!(counter.daily_goal, None);
        assert_eq!(counter.last_updated, NOON + 5);

        // Same patch again changes nothing
        assert!(!counter.apply_patch(&patch, NOON + 10));
        assert_eq!(counter.last_updated, NOON + 5);
    }

    #[test]
    fn test_patch_merge() {
        let mut first = CounterPatch {
            name: Some("A".to_string()),
            value: Some(1),
            daily_goal: None,
        };
        first.merge(&CounterPatch {
            name: None,
            value: Some(7),
            daily_goal: Some(3),
        });
        assert_eq!(first.name.as_deref(), Some("A"));
        assert_eq!(first.value, Some(7));
        assert_eq!(first.daily_goal, Some(3));
    }

    #[test]
    fn test_counter_json_is_camel_case() {
        let mut counter = Counter::new("c1", "A", NOON);
        counter.daily_goal = Some(3);
        counter.image_url = Some("/api/counters/c1/image".to_string());

        let json = serde_json::to_value(&counter).unwrap();
        assert_eq!(json["dailyGoal"], 3);
        assert_eq!(json["imageUrl"], "/api/counters/c1/image");
        assert_eq!(json["lastUpdated"], NOON);
        assert_eq!(json["dailyCount"], 0);
    }

    #[test]
    fn test_new_counter_to_counter() {
        let input = NewCounter::named(" Laps ").with_goal(0);
        let counter = input.to_counter("x", NOON);
        assert_eq!(counter.name, "Laps");
        assert_eq!(counter.daily_goal, None);
        assert_eq!(counter.value, 0);
    }
}
