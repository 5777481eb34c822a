//! Counter endpoints.
//!
//! Every successful mutation publishes its event through the hub before the
//! response is returned.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use counter_core::validation::{validate_delta, validate_new_counter, validate_patch};
use counter_core::{
    Counter, CounterListResponse, CounterPatch, CounterResponse, DeltaRequest, NewCounter,
    SyncEvent,
};
use tracing::info;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// List every counter.
pub async fn list_counters(State(state): State<AppState>) -> Result<Json<CounterListResponse>> {
    let counters = state.store.list().await?;
    Ok(Json(CounterListResponse::new(counters)))
}

/// Get one counter.
pub async fn get_counter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CounterResponse>> {
    let counter = state
        .store
        .get_by_id(&id)
        .await?
        .ok_or_else(|| ApiError::counter_not_found(&id))?;
    Ok(Json(CounterResponse::new(counter)))
}

/// Create a counter, or upsert it when the client supplied an id that exists.
///
/// Replaying an offline create hits the second case, which answers `200`
/// with a `counter_updated` event instead of `201`/`counter_created`.
pub async fn create_counter(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewCounter>, JsonRejection>,
) -> Result<(StatusCode, Json<CounterResponse>)> {
    let Json(input) = payload?;
    validate_new_counter(&input)?;

    let (counter, created) = state.store.upsert(input).await?;
    let (status, event) = if created {
        info!(counter_id = %counter.id, name = %counter.name, "Counter created");
        (StatusCode::CREATED, SyncEvent::created(counter.clone()))
    } else {
        info!(counter_id = %counter.id, "Counter upserted");
        (StatusCode::OK, SyncEvent::updated(counter.clone()))
    };
    state.broadcast(event).await;

    Ok((status, Json(CounterResponse::new(counter))))
}

/// Edit name, value and/or daily goal.
pub async fn update_counter(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<CounterPatch>, JsonRejection>,
) -> Result<Json<CounterResponse>> {
    let Json(patch) = payload?;
    validate_patch(&patch)?;

    if patch.is_empty() {
        return get_counter(State(state), Path(id)).await;
    }

    let counter = update(&state, &id, &patch).await?;
    Ok(Json(CounterResponse::new(counter)))
}

/// Delete a counter together with its image.
pub async fn delete_counter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CounterResponse>> {
    let counter = state
        .store
        .delete(&id)
        .await?
        .ok_or_else(|| ApiError::counter_not_found(&id))?;

    info!(counter_id = %id, "Counter deleted");
    state.broadcast(SyncEvent::deleted(counter.clone())).await;

    Ok(Json(CounterResponse::new(counter)))
}

pub async fn increment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CounterResponse>> {
    let counter = delta(&state, &id, 1).await?;
    Ok(Json(CounterResponse::new(counter)))
}

pub async fn decrement(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CounterResponse>> {
    let counter = delta(&state, &id, -1).await?;
    Ok(Json(CounterResponse::new(counter)))
}

/// Apply an arbitrary non-zero delta, as sent by a replayed offline queue.
pub async fn apply_delta(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<DeltaRequest>, JsonRejection>,
) -> Result<Json<CounterResponse>> {
    let Json(request) = payload?;
    let counter = delta(&state, &id, request.delta).await?;
    Ok(Json(CounterResponse::new(counter)))
}

/// Set the value back to zero. History is left alone.
pub async fn reset(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CounterResponse>> {
    let counter = update(&state, &id, &CounterPatch::reset()).await?;
    Ok(Json(CounterResponse::new(counter)))
}

async fn delta(state: &AppState, id: &str, delta: i64) -> Result<Counter> {
    validate_delta(delta)?;

    let counter = state
        .store
        .apply_delta(id, delta)
        .await?
        .ok_or_else(|| ApiError::counter_not_found(id))?;

    tracing::debug!(counter_id = %id, delta, value = counter.value, "Delta applied");
    state
        .broadcast(SyncEvent::for_delta(counter.clone(), delta))
        .await;

    Ok(counter)
}

async fn update(state: &AppState, id: &str, patch: &CounterPatch) -> Result<Counter> {
    let counter = state
        .store
        .update(id, patch)
        .await?
        .ok_or_else(|| ApiError::counter_not_found(id))?;

    info!(counter_id = %id, "Counter updated");
    state.broadcast(SyncEvent::updated(counter.clone())).await;

    Ok(counter)
}
