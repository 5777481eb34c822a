//! Route handlers for the counter server.

pub mod colors;
pub mod counters;
pub mod health;
pub mod images;
pub mod stream;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the router with all routes.
///
/// `max_image_bytes` bounds the image upload route only; every other route
/// keeps axum's default body limit.
pub fn router(max_image_bytes: usize) -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health))
        // Counters
        .route(
            "/api/counters",
            get(counters::list_counters).post(counters::create_counter),
        )
        .route(
            "/api/counters/:id",
            get(counters::get_counter)
                .put(counters::update_counter)
                .delete(counters::delete_counter),
        )
        .route("/api/counters/:id/increment", post(counters::increment))
        .route("/api/counters/:id/decrement", post(counters::decrement))
        .route("/api/counters/:id/delta", post(counters::apply_delta))
        .route("/api/counters/:id/reset", post(counters::reset))
        // Images
        .route(
            "/api/counters/:id/image",
            get(images::get_image)
                .put(images::put_image)
                .delete(images::delete_image)
                .layer(DefaultBodyLimit::max(max_image_bytes)),
        )
        // Colors
        .route("/api/colors", get(colors::list_colors))
        .route(
            "/api/colors/:username",
            get(colors::get_color)
                .put(colors::set_color)
                .delete(colors::delete_color),
        )
        // Live updates
        .route("/api/stream", get(stream::stream))
}
