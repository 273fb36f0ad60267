//! Graceful shutdown handling.
//!
//! Shutdown is best-effort and bounded: signal arrival stops the ops
//! surface, then the pool lanes are closed within a drain timeout. Abrupt
//! termination is tolerated — the connection backends own the actual
//! network connections.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal;
use tokio::time::timeout;

use crate::pool::PoolLanes;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for the pool lanes to close (default: 10 seconds)
    pub close_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(10),
        }
    }
}

/// Coordinates teardown of the pool lanes at process exit.
pub struct GracefulShutdown {
    lanes: Arc<PoolLanes>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(lanes: Arc<PoolLanes>) -> Self {
        Self {
            lanes,
            config: ShutdownConfig::default(),
        }
    }

    pub fn with_config(lanes: Arc<PoolLanes>, config: ShutdownConfig) -> Self {
        Self { lanes, config }
    }

    /// Close every constructed lane, bounded by the close timeout.
    /// Returns whether the close completed in time.
    pub async fn execute(&self, reason: &str) -> bool {
        let start = Instant::now();
        let open_lanes = self.lanes.initialized().len();
        tracing::info!(reason = %reason, open_lanes, "Starting graceful shutdown");

        let closed = match timeout(self.config.close_timeout, self.lanes.close()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!("Timed out closing connection pools");
                false
            }
        };

        tracing::info!(
            closed,
            duration_ms = start.elapsed().as_millis() as u64,
            "Graceful shutdown completed"
        );
        closed
    }
}

/// Resolves when SIGINT or SIGTERM arrives.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolSettings, PoolsConfig, SeedConfig, ServerConfig, Settings};

    fn memory_settings() -> Settings {
        let pool = PoolSettings {
            backend: "memory".to_string(),
            url: "memory://test".to_string(),
            min_size: 1,
            max_size: 2,
            connect_timeout_ms: 200,
            idle_timeout_secs: 60,
            validation_query: "SELECT 1".to_string(),
        };
        Settings {
            server: ServerConfig::default(),
            pools: PoolsConfig {
                transactional: pool.clone(),
                processing: pool,
            },
            seed: SeedConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_shutdown_closes_lanes() {
        let lanes = Arc::new(PoolLanes::new(&memory_settings()).unwrap());
        let tx = lanes.transactional().await.unwrap();

        let shutdown = GracefulShutdown::new(lanes);
        assert!(shutdown.execute("test shutdown").await);

        assert!(tx.acquire().await.is_err());
    }

    #[test]
    fn test_shutdown_config_defaults() {
        let config = ShutdownConfig::default();
        assert_eq!(config.close_timeout, Duration::from_secs(10));
    }
}
