//! Counter CRUD operations.

use counter_core::validation::{validate_delta, validate_new_counter, validate_patch};
use counter_core::{now_millis, Counter, CounterPatch, NewCounter, ValidationError};
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::{CounterRow, COUNTER_COLUMNS};

/// List all counters in creation order.
pub async fn list_counters(pool: &SqlitePool) -> Result<Vec<Counter>> {
    let rows = sqlx::query_as::<_, CounterRow>(&format!(
        "SELECT {COUNTER_COLUMNS} FROM counters ORDER BY created_at, id"
    ))
    .fetch_all(pool)
    .await?;

    let now = now_millis();
    Ok(rows.into_iter().map(|row| row.into_counter(now)).collect())
}

/// Get a counter by ID.
pub async fn get_counter(pool: &SqlitePool, id: &str) -> Result<Counter> {
    find_counter(pool, id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Counter",
            id: id.to_string(),
        })
}

/// Get a counter by ID, returning `None` when it does not exist.
pub async fn find_counter(pool: &SqlitePool, id: &str) -> Result<Option<Counter>> {
    let row = sqlx::query_as::<_, CounterRow>(&format!(
        "SELECT {COUNTER_COLUMNS} FROM counters WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| row.into_counter(now_millis())))
}

/// Add `delta` to a counter's value and today's history entry in one statement.
///
/// A delta that would take either out of the `i64` range is rejected with
/// [`ValidationError::Overflow`] and nothing is written.
pub async fn apply_delta(pool: &SqlitePool, id: &str, delta: i64) -> Result<Counter> {
    validate_delta(delta)?;

    let now = now_millis();
    let day_path = format!("$.\"{}\"", counter_core::day_key(now));

    // Bounds a current value must lie within for `value + delta` to fit
    let (lower, upper) = if delta > 0 {
        (i64::MIN, i64::MAX - delta)
    } else {
        (i64::MIN - delta, i64::MAX)
    };

    let row = sqlx::query_as::<_, CounterRow>(&format!(
        r#"
        UPDATE counters
        SET value = value + ?1,
            history = json_set(history, ?2, COALESCE(json_extract(history, ?2), 0) + ?1),
            last_updated = ?3
        WHERE id = ?4
          AND value BETWEEN ?5 AND ?6
          AND COALESCE(json_extract(history, ?2), 0) BETWEEN ?5 AND ?6
        RETURNING {COUNTER_COLUMNS}
        "#
    ))
    .bind(delta)
    .bind(&day_path)
    .bind(now)
    .bind(id)
    .bind(lower)
    .bind(upper)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(row.into_counter(now)),
        None if find_counter(pool, id).await?.is_some() => {
            Err(ValidationError::Overflow(delta).into())
        }
        None => Err(DatabaseError::NotFound {
            entity: "Counter",
            id: id.to_string(),
        }),
    }
}

/// Insert a counter, or update name and goal if the id already exists.
///
/// The value of an existing counter is never overwritten, so replaying a
/// create that already reached the server does not lose increments made
/// since. Returns the counter and whether it was newly created.
pub async fn upsert_counter(pool: &SqlitePool, input: &NewCounter) -> Result<(Counter, bool)> {
    validate_new_counter(input)?;

    let id = input
        .id
        .as_deref()
        .map(|id| id.trim().to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let existed = find_counter(pool, &id).await?.is_some();
    let now = now_millis();

    let row = sqlx::query_as::<_, CounterRow>(&format!(
        r#"
        INSERT INTO counters (id, name, value, daily_goal, history, image_url, last_updated, created_at)
        VALUES (?1, ?2, ?3, ?4, '{{}}', NULL, ?5, ?5)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            daily_goal = COALESCE(excluded.daily_goal, counters.daily_goal),
            last_updated = excluded.last_updated
        RETURNING {COUNTER_COLUMNS}
        "#
    ))
    .bind(&id)
    .bind(input.name.trim())
    .bind(input.value.unwrap_or(0))
    .bind(input.daily_goal)
    .bind(now)
    .fetch_one(pool)
    .await?;

    if existed {
        tracing::debug!(counter_id = %id, "Upsert hit an existing counter");
    }

    Ok((row.into_counter(now), !existed))
}

/// Apply an edit to an existing counter.
pub async fn update_counter(pool: &SqlitePool, id: &str, patch: &CounterPatch) -> Result<Counter> {
    validate_patch(patch)?;

    let now = now_millis();
    let name = patch.name.as_deref().map(str::trim);

    let row = sqlx::query_as::<_, CounterRow>(&format!(
        r#"
        UPDATE counters
        SET name = COALESCE(?1, name),
            value = COALESCE(?2, value),
            daily_goal = COALESCE(?3, daily_goal),
            last_updated = ?4
        WHERE id = ?5
        RETURNING {COUNTER_COLUMNS}
        "#
    ))
    .bind(name)
    .bind(patch.value)
    .bind(patch.daily_goal)
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| row.into_counter(now))
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Counter",
            id: id.to_string(),
        })
}

/// Delete a counter (and, through the foreign key, its image).
pub async fn delete_counter(pool: &SqlitePool, id: &str) -> Result<Counter> {
    let row = sqlx::query_as::<_, CounterRow>(&format!(
        "DELETE FROM counters WHERE id = ? RETURNING {COUNTER_COLUMNS}"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| row.into_counter(now_millis()))
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Counter",
            id: id.to_string(),
        })
}

/// Set or clear a counter's image reference.
pub async fn set_image_url(pool: &SqlitePool, id: &str, image_url: Option<&str>) -> Result<Counter> {
    let now = now_millis();

    let row = sqlx::query_as::<_, CounterRow>(&format!(
        r#"
        UPDATE counters
        SET image_url = ?, last_updated = ?
        WHERE id = ?
        RETURNING {COUNTER_COLUMNS}
        "#
    ))
    .bind(image_url)
    .bind(now)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| row.into_counter(now))
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Counter",
            id: id.to_string(),
        })
}

/// Count counters.
pub async fn count_counters(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM counters
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count)
}
