//! Prometheus metrics for the pooling service.
//!
//! Every pool registers one exporter under its name, reporting:
//! - active (borrowed) connections
//! - idle connections
//! - pending borrow requests
//! - borrow wait time (histogram, average derivable from sum/count)
//!
//! The registry owns its own `prometheus::Registry` rather than the process
//! default, and is passed explicitly to the components that record into it.
//! Names are unique: registering the same pool name twice is an error, not
//! a silent overwrite.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

use crate::error::PoolError;

/// Prefix for all metrics
const METRIC_PREFIX: &str = "db_pool";

/// Per-pool collectors, labeled with the pool's name.
#[derive(Debug)]
pub struct PoolMetrics {
    pub active_connections: IntGauge,
    pub idle_connections: IntGauge,
    pub pending_borrows: IntGauge,
    pub borrow_wait_seconds: Histogram,
    pub borrows_total: IntCounter,
    pub borrow_timeouts_total: IntCounter,
}

impl PoolMetrics {
    fn for_pool(pool_name: &str) -> Result<Self, prometheus::Error> {
        let labels: HashMap<String, String> =
            HashMap::from([("pool".to_string(), pool_name.to_string())]);

        let active_connections = IntGauge::with_opts(
            Opts::new(
                format!("{}_active_connections", METRIC_PREFIX),
                "Connections currently borrowed from the pool",
            )
            .const_labels(labels.clone()),
        )?;

        let idle_connections = IntGauge::with_opts(
            Opts::new(
                format!("{}_idle_connections", METRIC_PREFIX),
                "Open connections currently idle in the pool",
            )
            .const_labels(labels.clone()),
        )?;

        let pending_borrows = IntGauge::with_opts(
            Opts::new(
                format!("{}_pending_borrows", METRIC_PREFIX),
                "Borrow requests currently waiting for a free connection",
            )
            .const_labels(labels.clone()),
        )?;

        let borrow_wait_seconds = Histogram::with_opts(
            HistogramOpts::new(
                format!("{}_borrow_wait_seconds", METRIC_PREFIX),
                "Time spent waiting to borrow a connection",
            )
            .const_labels(labels.clone())
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        )?;

        let borrows_total = IntCounter::with_opts(
            Opts::new(
                format!("{}_borrows_total", METRIC_PREFIX),
                "Total successful connection borrows",
            )
            .const_labels(labels.clone()),
        )?;

        let borrow_timeouts_total = IntCounter::with_opts(
            Opts::new(
                format!("{}_borrow_timeouts_total", METRIC_PREFIX),
                "Borrow attempts that timed out waiting for a connection",
            )
            .const_labels(labels),
        )?;

        Ok(Self {
            active_connections,
            idle_connections,
            pending_borrows,
            borrow_wait_seconds,
            borrows_total,
            borrow_timeouts_total,
        })
    }

    fn collectors(&self) -> Vec<Box<dyn Collector>> {
        vec![
            Box::new(self.active_connections.clone()),
            Box::new(self.idle_connections.clone()),
            Box::new(self.pending_borrows.clone()),
            Box::new(self.borrow_wait_seconds.clone()),
            Box::new(self.borrows_total.clone()),
            Box::new(self.borrow_timeouts_total.clone()),
        ]
    }
}

/// Process-wide, append-only mapping from pool name to metrics exporter.
///
/// Mutated only during pool construction; steady-state borrow/release
/// traffic records into already-registered collectors without touching the
/// map.
pub struct MetricsRegistry {
    registry: Registry,
    exporters: DashMap<String, Arc<PoolMetrics>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            exporters: DashMap::new(),
        }
    }

    /// Register a pool's exporter. Fails with `Duplicate` if the name is
    /// already taken, leaving the existing registration intact.
    pub fn register_pool(&self, name: &str) -> Result<Arc<PoolMetrics>, PoolError> {
        match self.exporters.entry(name.to_string()) {
            Entry::Occupied(_) => Err(PoolError::Duplicate(name.to_string())),
            Entry::Vacant(slot) => {
                let metrics =
                    Arc::new(PoolMetrics::for_pool(name).map_err(|e| PoolError::Creation {
                        name: name.to_string(),
                        reason: format!("metrics exporter construction failed: {}", e),
                    })?);
                for collector in metrics.collectors() {
                    self.registry
                        .register(collector)
                        .map_err(|e| PoolError::Creation {
                            name: name.to_string(),
                            reason: format!("metrics registration failed: {}", e),
                        })?;
                }
                slot.insert(metrics.clone());
                Ok(metrics)
            }
        }
    }

    /// Remove a pool's exporter again. Only used to unwind a partially
    /// constructed pool.
    pub(crate) fn remove(&self, name: &str) {
        if let Some((_, metrics)) = self.exporters.remove(name) {
            for collector in metrics.collectors() {
                let _ = self.registry.unregister(collector);
            }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.exporters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.exporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exporters.is_empty()
    }

    /// Encode all registered collectors to Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_encode() {
        let registry = MetricsRegistry::new();
        let metrics = registry.register_pool("transactional").unwrap();
        metrics.active_connections.set(3);
        metrics.borrows_total.inc();

        let output = registry.encode().unwrap();
        assert!(output.contains("db_pool_active_connections"));
        assert!(output.contains("pool=\"transactional\""));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = MetricsRegistry::new();
        registry.register_pool("transactional").unwrap();

        let err = registry.register_pool("transactional").unwrap_err();
        assert!(matches!(err, PoolError::Duplicate(_)));

        // The first registration is untouched
        assert!(registry.contains("transactional"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_two_pools_coexist() {
        let registry = MetricsRegistry::new();
        let tx = registry.register_pool("transactional").unwrap();
        let proc = registry.register_pool("processing").unwrap();
        tx.idle_connections.set(2);
        proc.idle_connections.set(7);

        let output = registry.encode().unwrap();
        assert!(output.contains("pool=\"transactional\""));
        assert!(output.contains("pool=\"processing\""));
    }

    #[test]
    fn test_remove_unwinds_registration() {
        let registry = MetricsRegistry::new();
        registry.register_pool("transactional").unwrap();
        registry.remove("transactional");

        assert!(!registry.contains("transactional"));
        // Name is free again
        registry.register_pool("transactional").unwrap();
    }
}
