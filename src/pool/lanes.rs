//! Workload-isolated pool lanes.
//!
//! Exactly two pools live here: `transactional` for short, latency-bound
//! work and `processing` for long-running bulk work. Splitting the lanes
//! means a backlog of bulk work queuing up on the processing pool can
//! never eat the connection slots reserved for interactive traffic — the
//! lanes share no capacity.
//!
//! Each lane is constructed lazily on first access through a one-shot
//! cell, so concurrent first callers get exactly one pool and exactly one
//! health/metrics registration. A failed construction is not cached; the
//! next caller retries.

use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::config::Settings;
use crate::error::Result;
use crate::health::HealthRegistry;
use crate::metrics::MetricsRegistry;

use super::config::PoolConfig;
use super::factory::Pool;

pub const TRANSACTIONAL: &str = "transactional";
pub const PROCESSING: &str = "processing";

/// Process-scoped context owning the two pool lanes and the registries
/// they report into. Constructed once at startup, passed by reference,
/// closed best-effort at shutdown.
pub struct PoolLanes {
    transactional_config: PoolConfig,
    processing_config: PoolConfig,
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthRegistry>,
    transactional: OnceCell<Arc<Pool>>,
    processing: OnceCell<Arc<Pool>>,
}

impl PoolLanes {
    /// Resolve both lane configs. Validation failures surface here, at
    /// startup, before any connection is opened.
    pub fn new(settings: &Settings) -> Result<Self> {
        Self::with_registries(
            settings,
            Arc::new(MetricsRegistry::new()),
            Arc::new(HealthRegistry::new()),
        )
    }

    /// Same as [`PoolLanes::new`] but reporting into existing registries.
    pub fn with_registries(
        settings: &Settings,
        metrics: Arc<MetricsRegistry>,
        health: Arc<HealthRegistry>,
    ) -> Result<Self> {
        Ok(Self {
            transactional_config: PoolConfig::resolve(
                TRANSACTIONAL,
                &settings.pools.transactional,
            )?,
            processing_config: PoolConfig::resolve(PROCESSING, &settings.pools.processing)?,
            metrics,
            health,
            transactional: OnceCell::new(),
            processing: OnceCell::new(),
        })
    }

    /// The lane for short, latency-sensitive transactional work.
    ///
    /// Constructed on first access; later calls return the same pool with
    /// no further synchronization cost.
    pub async fn transactional(&self) -> Result<Arc<Pool>> {
        self.transactional
            .get_or_try_init(|| {
                Pool::connect(
                    self.transactional_config.clone(),
                    &self.metrics,
                    &self.health,
                )
            })
            .await
            .cloned()
    }

    /// The lane for long-running bulk and background work.
    pub async fn processing(&self) -> Result<Arc<Pool>> {
        self.processing
            .get_or_try_init(|| {
                Pool::connect(self.processing_config.clone(), &self.metrics, &self.health)
            })
            .await
            .cloned()
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Pools that have been constructed so far.
    pub fn initialized(&self) -> Vec<Arc<Pool>> {
        [self.transactional.get(), self.processing.get()]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Best-effort close of every constructed lane.
    pub async fn close(&self) {
        for pool in self.initialized() {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolSettings, PoolsConfig, SeedConfig, ServerConfig};

    fn memory_pool_settings(max_size: u32) -> PoolSettings {
        PoolSettings {
            backend: "memory".to_string(),
            url: "memory://test".to_string(),
            min_size: 0,
            max_size,
            connect_timeout_ms: 200,
            idle_timeout_secs: 60,
            validation_query: "SELECT 1".to_string(),
        }
    }

    fn memory_settings() -> Settings {
        Settings {
            server: ServerConfig::default(),
            pools: PoolsConfig {
                transactional: memory_pool_settings(5),
                processing: memory_pool_settings(2),
            },
            seed: SeedConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_lanes_are_singletons() {
        let lanes = PoolLanes::new(&memory_settings()).unwrap();

        let first = lanes.transactional().await.unwrap();
        let second = lanes.transactional().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        // One registration per lane, not per call
        assert_eq!(lanes.health().len(), 1);
        assert_eq!(lanes.metrics().len(), 1);
    }

    #[tokio::test]
    async fn test_lanes_are_distinct_pools() {
        let lanes = PoolLanes::new(&memory_settings()).unwrap();

        let tx = lanes.transactional().await.unwrap();
        let proc = lanes.processing().await.unwrap();
        assert!(!Arc::ptr_eq(&tx, &proc));
        assert_eq!(tx.name(), TRANSACTIONAL);
        assert_eq!(proc.name(), PROCESSING);
        assert_eq!(lanes.health().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_settings_rejected_at_startup() {
        let mut settings = memory_settings();
        settings.pools.processing.max_size = 0;
        assert!(PoolLanes::new(&settings).is_err());
    }

    #[tokio::test]
    async fn test_close_shuts_constructed_lanes() {
        let lanes = PoolLanes::new(&memory_settings()).unwrap();
        let tx = lanes.transactional().await.unwrap();
        lanes.close().await;

        assert!(tx.acquire().await.is_err());
        // The processing lane was never constructed
        assert_eq!(lanes.initialized().len(), 1);
    }
}
