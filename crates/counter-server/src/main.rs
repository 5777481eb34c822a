//! Shared-counter server binary.

use broadcaster::BroadcastHub;
use counter_server::{app, AppState, Config};
use database::Database;
use tower_http::services::ServeDir;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(addr = %config.addr, "Starting counter server");

    // Connect to database
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    // One hub for the whole process
    let hub = BroadcastHub::new(config.stream_buffer);

    // Build application state
    let state = AppState::new(db, hub).with_max_image_bytes(config.max_image_bytes);

    // Build router
    let app = app(state).nest_service("/static", ServeDir::new(&config.static_dir));

    // Start server
    info!(addr = %config.addr, "Counter server listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
