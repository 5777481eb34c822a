//! HTTP server for the shared-counter service.
//!
//! Serves the counter, image and color endpoints plus the live update stream
//! at `/api/stream`. One [`BroadcastHub`](broadcaster::BroadcastHub) is owned
//! by [`AppState`] and shared by every handler, so each successful mutation
//! reaches every open stream.

pub mod config;
pub mod error;
pub mod live;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use state::AppState;

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Build the application router for `state`.
pub fn app(state: AppState) -> Router {
    routes::router(state.max_image_bytes)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve `state` in a background task.
///
/// Returns the bound address, which differs from `addr` when binding port 0.
pub async fn spawn(addr: SocketAddr, state: AppState) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    let app = app(state);

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!(error = %err, "Server stopped");
        }
    });

    Ok(local)
}
