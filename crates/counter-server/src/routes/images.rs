//! Counter image endpoints.

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use counter_core::validation::validate_image_type;
use counter_core::{Counter, CounterResponse, SyncEvent};
use database::image;
use tracing::info;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Serve the stored image bytes.
pub async fn get_image(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let stored = image::get_image(state.db.pool(), &id).await?;

    Ok((
        [
            (header::CONTENT_TYPE, stored.content_type),
            (header::CACHE_CONTROL, "public, max-age=31536000".to_string()),
        ],
        stored.data,
    )
        .into_response())
}

/// Upload an image, replacing any previous one.
///
/// `imageUrl` carries the upload time so clients never show a cached copy
/// of the replaced image.
pub async fn put_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Json<CounterResponse>> {
    let max = state.max_image_bytes;
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::TooLarge { max }
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    })?;
    if body.len() > max {
        return Err(ApiError::TooLarge { max });
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    validate_image_type(&content_type)?;

    let stamp = image::put_image(state.db.pool(), &id, &content_type, &body).await?;
    let url = format!("/api/counters/{}/image?v={}", id, stamp);
    let counter = set_url(&state, &id, Some(url)).await?;

    info!(counter_id = %id, bytes = body.len(), "Image stored");
    Ok(Json(CounterResponse::new(counter)))
}

/// Remove a counter's image.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CounterResponse>> {
    image::delete_image(state.db.pool(), &id).await?;
    let counter = set_url(&state, &id, None).await?;

    info!(counter_id = %id, "Image deleted");
    Ok(Json(CounterResponse::new(counter)))
}

async fn set_url(state: &AppState, id: &str, url: Option<String>) -> Result<Counter> {
    let counter = state
        .store
        .set_image_url(id, url)
        .await?
        .ok_or_else(|| ApiError::counter_not_found(id))?;

    state.broadcast(SyncEvent::updated(counter.clone())).await;
    Ok(counter)
}
