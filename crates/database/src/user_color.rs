//! User color assignments.
//!
//! Each color belongs to at most one user; the `UNIQUE` constraint on
//! `color` enforces single assignment.

use counter_core::validation::{normalize_color, validate_username};
use counter_core::{now_millis, UserColor};
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::UserColorRow;

/// Get a user's color.
pub async fn get_color(pool: &SqlitePool, username: &str) -> Result<UserColor> {
    sqlx::query_as::<_, UserColorRow>(
        r#"
        SELECT username, color, updated_at
        FROM user_colors
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await?
    .map(UserColor::from)
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Color",
        id: username.to_string(),
    })
}

/// List every assignment.
pub async fn list_colors(pool: &SqlitePool) -> Result<Vec<UserColor>> {
    let rows = sqlx::query_as::<_, UserColorRow>(
        r#"
        SELECT username, color, updated_at
        FROM user_colors
        ORDER BY username
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(UserColor::from).collect())
}

/// Assign a color to a user, replacing their previous one.
///
/// Fails with [`DatabaseError::AlreadyExists`] if another user holds the color.
pub async fn set_color(pool: &SqlitePool, username: &str, color: &str) -> Result<UserColor> {
    validate_username(username)?;
    let color = normalize_color(color)?;
    let username = username.trim();

    sqlx::query(
        r#"
        INSERT INTO user_colors (username, color, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(username) DO UPDATE SET
            color = excluded.color,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(username)
    .bind(&color)
    .bind(now_millis())
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DatabaseError::AlreadyExists {
                    entity: "Color",
                    id: color.clone(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(UserColor {
        username: username.to_string(),
        color,
    })
}

/// Remove a user's color.
pub async fn delete_color(pool: &SqlitePool, username: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_colors
        WHERE username = ?
        "#,
    )
    .bind(username)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Color",
            id: username.to_string(),
        });
    }

    Ok(())
}
