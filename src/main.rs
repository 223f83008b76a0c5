//! Prop Engine - resilient multi-tier prop computation service

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use prop_engine::{create_router, spawn_cache_warmer, spawn_housekeeping, AppState, Config};

/// Main entry point for the prop engine server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Compose cache tiers, collaborators and the engine
/// 4. Start housekeeping and cache warming tasks
/// 5. Serve the Axum router until SIGINT/SIGTERM
/// 6. Cancel tracked tasks and release connection pools
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to info for this crate, can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prop_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Prop Engine");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, memory_max_entries={}, ttls={}/{}/{}s, max_concurrency={}",
        config.server_port,
        config.memory_max_entries,
        config.memory_ttl,
        config.distributed_ttl,
        config.durable_ttl,
        config.max_concurrency
    );

    let state = AppState::from_config(&config)
        .await
        .context("failed to compose engine")?;
    let engine = state.engine.clone();
    let resources = engine.resources().clone();

    spawn_housekeeping(
        engine.cache().clone(),
        resources.clone(),
        config.housekeeping_interval_secs,
    );
    spawn_cache_warmer(engine.clone(), &config);
    info!("Background tasks started: {:?}", resources.tracked_tasks());

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    resources.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
