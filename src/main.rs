//! Swap Market - item-swap marketplace core
//!
//! A Rust backend driving guided conversational flows for posting and
//! browsing items and for proposing one-for-one swaps.

mod api;
mod catalog;
mod config;
mod db;
mod geo;
mod market;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use config::MarketConfig;
use db::Database;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "swap_market=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = MarketConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path, "Opening database");
    let db = Database::open(&config.db_path)?;

    let state = AppState::new(db, &config);

    // Sessions live in memory only; expiry is opt-in
    match config.session_ttl {
        Some(ttl) => {
            tracing::info!(ttl_secs = ttl.as_secs(), "Session expiry enabled");
            let _sweeper = state.sessions.spawn_sweeper(ttl);
        }
        None => tracing::info!("Sessions never expire"),
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        radius_km = config.limits.default_radius_km,
        "Swap market listening on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
