use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dblanes::config::Settings;
use dblanes::pool::PoolLanes;
use dblanes::server::{create_app, AppState};
use dblanes::shutdown::{shutdown_signal, GracefulShutdown};
use dblanes::tasks::SeedTask;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Resolve both lane configs; validation failures abort startup here
    let lanes = Arc::new(PoolLanes::new(&settings)?);

    // Open both lanes up front so an unreachable connection target fails
    // startup instead of the first borrower
    let transactional = lanes.transactional().await?;
    tracing::info!(pool = %transactional.name(), "Transactional lane ready");
    let processing = lanes.processing().await?;
    tracing::info!(pool = %processing.name(), "Processing lane ready");

    let (shutdown_tx, _) = broadcast::channel(1);

    // Optionally seed example rows in the background
    let seed_handle = if settings.seed.enabled {
        let task = SeedTask::new(
            settings.seed.clone(),
            lanes.clone(),
            shutdown_tx.subscribe(),
        );
        Some(tokio::spawn(async move { task.run().await }))
    } else {
        None
    };

    // Create Axum app
    let state = AppState::new(settings.clone(), lanes.clone());
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop background tasks, then close the pools
    let _ = shutdown_tx.send(());
    if let Some(handle) = seed_handle {
        let _ = handle.await;
    }
    GracefulShutdown::new(lanes).execute("process exit").await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
