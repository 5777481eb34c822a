//! Counter image blobs.

use counter_core::now_millis;
use counter_core::validation::validate_image_type;
use sqlx::SqlitePool;

use crate::error::{DatabaseError, Result};
use crate::models::CounterImage;

/// Get the stored image for a counter.
pub async fn get_image(pool: &SqlitePool, counter_id: &str) -> Result<CounterImage> {
    sqlx::query_as::<_, CounterImage>(
        r#"
        SELECT counter_id, content_type, data, updated_at
        FROM counter_images
        WHERE counter_id = ?
        "#,
    )
    .bind(counter_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Image",
        id: counter_id.to_string(),
    })
}

/// Store an image, replacing (and so deleting) any previous one.
///
/// Returns the `updated_at` stamp of the stored image.
pub async fn put_image(
    pool: &SqlitePool,
    counter_id: &str,
    content_type: &str,
    data: &[u8],
) -> Result<i64> {
    validate_image_type(content_type)?;
    let now = now_millis();

    sqlx::query(
        r#"
        INSERT INTO counter_images (counter_id, content_type, data, updated_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(counter_id) DO UPDATE SET
            content_type = excluded.content_type,
            data = excluded.data,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(counter_id)
    .bind(content_type)
    .bind(data)
    .bind(now)
    .execute(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_foreign_key_violation() {
                return DatabaseError::NotFound {
                    entity: "Counter",
                    id: counter_id.to_string(),
                };
            }
        }
        DatabaseError::Sqlx(e)
    })?;

    Ok(now)
}

/// Delete a counter's image.
pub async fn delete_image(pool: &SqlitePool, counter_id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM counter_images
        WHERE counter_id = ?
        "#,
    )
    .bind(counter_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Image",
            id: counter_id.to_string(),
        });
    }

    Ok(())
}
