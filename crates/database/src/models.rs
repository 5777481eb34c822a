//! Database rows and their conversion into shared types.

use std::collections::BTreeMap;

use counter_core::{day_key, Counter, UserColor};
use sqlx::FromRow;

/// Column list matching [`CounterRow`].
pub(crate) const COUNTER_COLUMNS: &str =
    "id, name, value, daily_goal, history, image_url, last_updated";

/// A row of the `counters` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CounterRow {
    pub id: String,
    pub name: String,
    pub value: i64,
    pub daily_goal: Option<i64>,
    /// JSON object of `YYYY-MM-DD` -> net delta.
    pub history: String,
    pub image_url: Option<String>,
    pub last_updated: i64,
}

impl CounterRow {
    /// Convert into a [`Counter`], deriving `daily_count` for the day of `now`.
    pub fn into_counter(self, now: i64) -> Counter {
        let history: BTreeMap<String, i64> = match serde_json::from_str(&self.history) {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(counter_id = %self.id, error = %e, "Unreadable counter history, treating as empty");
                BTreeMap::new()
            }
        };
        let daily_count = history.get(&day_key(now)).copied().unwrap_or(0);

        Counter {
            id: self.id,
            name: self.name,
            value: self.value,
            daily_goal: self.daily_goal.filter(|goal| *goal > 0),
            daily_count,
            history,
            image_url: self.image_url,
            last_updated: self.last_updated,
        }
    }
}

/// A row of the `user_colors` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserColorRow {
    pub username: String,
    pub color: String,
    pub updated_at: i64,
}

impl From<UserColorRow> for UserColor {
    fn from(row: UserColorRow) -> Self {
        UserColor {
            username: row.username,
            color: row.color,
        }
    }
}

/// A stored counter image.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CounterImage {
    pub counter_id: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub updated_at: i64,
}
