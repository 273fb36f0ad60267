//! Pool construction and registry wiring.
//!
//! [`Pool::connect`] builds the bounded pool for a resolved config and
//! registers its health probe and metrics exporter, exactly once per pool
//! name. A second registration attempt under the same name fails with
//! `Duplicate` and leaves the first pool untouched; a failed construction
//! unwinds any registration it already made.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use crate::error::{PoolError, Result};
use crate::health::{HealthProbe, HealthRegistry, ProbeStatus};
use crate::metrics::MetricsRegistry;
use crate::postgres::PgConnectionFactory;

use super::config::PoolConfig;
use super::connection::ConnectionFactory;
use super::core::{PoolCore, PoolStats, PooledConnection};
use super::memory::MemoryConnectionFactory;

/// Upper bound for one health probe run.
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A named, bounded connection pool with its health and metrics
/// registrations.
///
/// Created at most once per name for the life of the process; shared by
/// all consumers via `Arc`; never mutated after construction apart from the
/// internal connection accounting.
pub struct Pool {
    core: Arc<PoolCore>,
    /// Owned by the pool; the health registry only holds it weakly
    probe: Arc<ConnectivityProbe>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.core.name())
            .finish_non_exhaustive()
    }
}

impl Pool {
    /// Build a pool with the backend selected by its config and register
    /// it with both registries.
    pub async fn connect(
        config: PoolConfig,
        metrics: &MetricsRegistry,
        health: &HealthRegistry,
    ) -> Result<Arc<Pool>> {
        let factory = backend_factory(&config)?;
        Self::with_factory(config, factory, metrics, health).await
    }

    /// Same as [`Pool::connect`] but with an explicit connection factory.
    pub async fn with_factory(
        config: PoolConfig,
        factory: Arc<dyn ConnectionFactory>,
        metrics: &MetricsRegistry,
        health: &HealthRegistry,
    ) -> Result<Arc<Pool>> {
        let name = config.name.clone();

        // Claiming the metrics slot first makes the name collision check
        // cheap: a duplicate fails before any connection is opened.
        let pool_metrics = metrics.register_pool(&name)?;

        let core = match PoolCore::open(config, factory, pool_metrics).await {
            Ok(core) => core,
            Err(e) => {
                metrics.remove(&name);
                return Err(e);
            }
        };

        let probe = Arc::new(ConnectivityProbe {
            core: Arc::downgrade(&core),
        });
        let probe_dyn: Arc<dyn HealthProbe> = probe.clone();
        let weak: Weak<dyn HealthProbe> = Arc::downgrade(&probe_dyn);
        if let Err(e) = health.register(&name, weak) {
            metrics.remove(&name);
            core.close().await;
            return Err(e);
        }

        tracing::info!(pool = %name, "Pool registered with health and metrics registries");

        Ok(Arc::new(Pool { core, probe }))
    }

    /// Borrow a connection. The only access path into pooled resources.
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.core.acquire().await
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn config(&self) -> &PoolConfig {
        self.core.config()
    }

    pub fn stats(&self) -> PoolStats {
        self.core.stats()
    }

    /// Run this pool's own health probe once.
    pub async fn check_health(&self) -> ProbeStatus {
        self.probe.check().await
    }

    /// Close the pool: refuse further borrows and drain idle connections.
    pub async fn close(&self) {
        self.core.close().await;
    }
}

/// Select the connection backend named in the config. An unknown backend
/// is a configuration error, not a fallback.
fn backend_factory(config: &PoolConfig) -> Result<Arc<dyn ConnectionFactory>> {
    match config.backend.as_str() {
        "postgres" => Ok(Arc::new(PgConnectionFactory::new(
            &config.url,
            config.connect_timeout,
        ))),
        "memory" => Ok(Arc::new(MemoryConnectionFactory::new())),
        other => Err(PoolError::Configuration(format!(
            "pool `{}`: unknown backend `{}`",
            config.name, other
        ))),
    }
}

/// Health probe borrowing a connection and running the validation query.
struct ConnectivityProbe {
    core: Weak<PoolCore>,
}

#[async_trait]
impl HealthProbe for ConnectivityProbe {
    async fn check(&self) -> ProbeStatus {
        let Some(core) = self.core.upgrade() else {
            return ProbeStatus::unhealthy("pool has been dropped");
        };
        if core.is_closed() {
            return ProbeStatus::unhealthy("pool is closed");
        }

        let validation_query = core.config().validation_query.clone();
        let outcome = timeout(HEALTH_PROBE_TIMEOUT, async {
            let mut handle = core.acquire().await?;
            handle
                .connection_mut()
                .ping(&validation_query)
                .await
                .map_err(PoolError::Backend)?;
            Ok::<_, PoolError>(())
        })
        .await;

        match outcome {
            Ok(Ok(())) => ProbeStatus::healthy("validation query succeeded"),
            Ok(Err(e)) => ProbeStatus::unhealthy(format!("validation failed: {}", e)),
            Err(_) => ProbeStatus::unhealthy("validation timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_config(name: &str) -> PoolConfig {
        PoolConfig {
            name: name.to_string(),
            backend: "memory".to_string(),
            url: "memory://test".to_string(),
            min_size: 1,
            max_size: 4,
            connect_timeout: Duration::from_millis(200),
            idle_timeout: Duration::from_secs(60),
            validation_query: "SELECT 1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_connect_registers_probe_and_exporter() {
        let metrics = MetricsRegistry::new();
        let health = HealthRegistry::new();

        let pool = Pool::connect(memory_config("transactional"), &metrics, &health)
            .await
            .unwrap();

        assert!(metrics.contains("transactional"));
        assert!(health.contains("transactional"));

        // Healthy immediately after construction
        let status = pool.check_health().await;
        assert!(status.healthy);
    }

    #[tokio::test]
    async fn test_unknown_backend_is_configuration_error() {
        let metrics = MetricsRegistry::new();
        let health = HealthRegistry::new();

        let mut config = memory_config("transactional");
        config.backend = "oracle".to_string();

        let err = Pool::connect(config, &metrics, &health).await.unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
        assert!(metrics.is_empty());
    }

    #[tokio::test]
    async fn test_failed_construction_unwinds_registrations() {
        let metrics = MetricsRegistry::new();
        let health = HealthRegistry::new();

        let err = Pool::with_factory(
            memory_config("transactional"),
            Arc::new(MemoryConnectionFactory::unreachable()),
            &metrics,
            &health,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PoolError::Creation { .. }));
        assert!(!metrics.contains("transactional"));
        assert!(!health.contains("transactional"));
    }

    #[tokio::test]
    async fn test_duplicate_name_fails_and_keeps_first() {
        let metrics = MetricsRegistry::new();
        let health = HealthRegistry::new();

        let first = Pool::connect(memory_config("transactional"), &metrics, &health)
            .await
            .unwrap();
        let err = Pool::connect(memory_config("transactional"), &metrics, &health)
            .await
            .unwrap_err();

        assert!(matches!(err, PoolError::Duplicate(_)));
        assert_eq!(metrics.len(), 1);
        assert_eq!(health.len(), 1);

        // The first pool still works
        let _handle = first.acquire().await.unwrap();
        assert!(first.check_health().await.healthy);
    }
}
