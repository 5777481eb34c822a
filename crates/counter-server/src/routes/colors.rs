//! User color endpoints. Plain key/value CRUD; nothing is broadcast.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use counter_core::{ColorRequest, UserColor};
use database::user_color;
use tracing::info;

use crate::error::Result;
use crate::state::AppState;

pub async fn list_colors(State(state): State<AppState>) -> Result<Json<Vec<UserColor>>> {
    let colors = user_color::list_colors(state.db.pool()).await?;
    Ok(Json(colors))
}

pub async fn get_color(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<UserColor>> {
    let color = user_color::get_color(state.db.pool(), &username).await?;
    Ok(Json(color))
}

/// Assign a color. `409` if another user already holds it.
pub async fn set_color(
    State(state): State<AppState>,
    Path(username): Path<String>,
    payload: std::result::Result<Json<ColorRequest>, JsonRejection>,
) -> Result<Json<UserColor>> {
    let Json(request) = payload?;
    let assigned = user_color::set_color(state.db.pool(), &username, &request.color).await?;

    info!(username = %assigned.username, color = %assigned.color, "Color assigned");
    Ok(Json(assigned))
}

pub async fn delete_color(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<StatusCode> {
    user_color::delete_color(state.db.pool(), &username).await?;
    Ok(StatusCode::NO_CONTENT)
}
