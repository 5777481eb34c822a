//! Per-user highlight colors.
//!
//! Each username maps to at most one color and no two users share a color.
//! The server enforces uniqueness; this registry validates locally first and
//! keeps a read-through cache of what it has seen.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use counter_core::validation::{normalize_color, validate_username};
use counter_core::UserColor;
use tracing::{debug, info};

use crate::api::CounterApi;
use crate::error::Result;

pub struct ColorRegistry {
    api: Arc<CounterApi>,
    cache: RwLock<HashMap<String, String>>,
}

impl ColorRegistry {
    pub fn new(api: Arc<CounterApi>) -> Self {
        Self {
            api,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Cached color for a user, without a request.
    pub fn cached(&self, username: &str) -> Option<String> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username.trim())
            .cloned()
    }

    /// Color for a user, fetched on a cache miss. `None` if the user has none.
    pub async fn color_for(&self, username: &str) -> Result<Option<String>> {
        let username = username.trim();
        if let Some(color) = self.cached(username) {
            return Ok(Some(color));
        }

        match self.api.get_color(username).await {
            Ok(assigned) => {
                let color = assigned.color.clone();
                self.remember(assigned);
                Ok(Some(color))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Claim a color. A color held by someone else fails with a 409
    /// (see [`ClientError::is_conflict`](crate::ClientError::is_conflict)).
    pub async fn assign(&self, username: &str, color: &str) -> Result<UserColor> {
        let username = username.trim();
        validate_username(username)?;
        let color = normalize_color(color)?;

        let assigned = self.api.set_color(username, &color).await?;
        info!(username = %assigned.username, color = %assigned.color, "Color assigned");
        self.remember(assigned.clone());
        Ok(assigned)
    }

    /// Give up a user's color.
    pub async fn release(&self, username: &str) -> Result<()> {
        let username = username.trim();
        self.api.delete_color(username).await?;
        self.write().remove(username);
        Ok(())
    }

    /// Reload every assignment from the server.
    pub async fn refresh(&self) -> Result<Vec<UserColor>> {
        let all = self.api.list_colors().await?;
        let mut cache = self.write();
        cache.clear();
        for entry in &all {
            cache.insert(entry.username.clone(), entry.color.clone());
        }
        debug!(count = all.len(), "Colors refreshed");
        Ok(all)
    }

    fn remember(&self, assigned: UserColor) {
        self.write().insert(assigned.username, assigned.color);
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, String>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }
}
