//! Group chat coordination core
//!
//! Friendships, presence and group messaging over SQLite, exposed through
//! a thin axum API. Real-time events leave through a [`dispatch::Dispatcher`].

pub mod chat;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod friends;
pub mod handlers;
pub mod images;
pub mod models;
pub mod presence;
pub mod store;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use clock::SystemClock;
use config::{AppState, ChatServerConfig};
use dispatch::BroadcastDispatcher;
use images::DiskImageStore;

/// Serve the chat API until the process is stopped. Live events reach
/// clients through the `GET /events` server-sent event feed.
pub async fn run() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        // Already set, ignore
    }

    info!("=== Chat Server ===");

    let config = ChatServerConfig::from_env();
    config.ensure_dirs().await?;

    info!("Database: {}", config.database_url);
    info!("Image directory: {:?}", config.image_dir);

    let pool = store::connect(&config.database_url).await?;
    info!("[Store] Schema ready");

    let dispatcher = Arc::new(BroadcastDispatcher::new(config.dispatch_capacity));
    let images = Arc::new(DiskImageStore::new(config.image_dir.clone()));

    let state = AppState::assemble(
        config.clone(),
        pool,
        Arc::new(SystemClock),
        dispatcher.clone(),
        images,
    )
    .with_event_stream((*dispatcher).clone());

    let _sweeper = state
        .presence
        .clone()
        .spawn_sweeper(Duration::from_secs(config.presence_sweep_secs.max(1)));
    info!(
        "[Presence] TTL {}s, sweeping every {}s",
        config.presence_ttl_secs, config.presence_sweep_secs
    );

    let app = handlers::router(state)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
