//! Health probe registry.
//!
//! Pools register a named probe at construction; an ops surface polls
//! [`HealthRegistry::check_all`]. The registry holds probes weakly — the
//! pool owns its probe — so a dropped pool shows up as unhealthy rather
//! than keeping the probe alive.

use std::collections::HashMap;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::timeout;

use crate::error::PoolError;

/// Upper bound for a single probe run during `check_all`.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// A lightweight check reporting whether a pool's connections are usable.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self) -> ProbeStatus;
}

/// Outcome of one probe run.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeStatus {
    pub healthy: bool,
    pub detail: String,
    pub checked_at: DateTime<Utc>,
}

impl ProbeStatus {
    pub fn healthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: true,
            detail: detail.into(),
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(detail: impl Into<String>) -> Self {
        Self {
            healthy: false,
            detail: detail.into(),
            checked_at: Utc::now(),
        }
    }
}

/// Process-wide, append-only mapping from pool name to health probe.
///
/// Mutated only during pool construction; `check_all` reads without
/// blocking borrow/release traffic.
pub struct HealthRegistry {
    probes: DashMap<String, Weak<dyn HealthProbe>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            probes: DashMap::new(),
        }
    }

    /// Register a probe under a unique name. Fails with `Duplicate` if the
    /// name is taken, leaving the existing registration intact.
    pub fn register(&self, name: &str, probe: Weak<dyn HealthProbe>) -> Result<(), PoolError> {
        match self.probes.entry(name.to_string()) {
            Entry::Occupied(_) => Err(PoolError::Duplicate(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(probe);
                tracing::debug!(pool = %name, "Health probe registered");
                Ok(())
            }
        }
    }

    /// Remove a probe again. Only used to unwind a partially constructed
    /// pool.
    pub(crate) fn remove(&self, name: &str) {
        self.probes.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.probes.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Run every registered probe concurrently, each bounded by
    /// [`PROBE_TIMEOUT`].
    pub async fn check_all(&self) -> HashMap<String, ProbeStatus> {
        let entries: Vec<(String, Weak<dyn HealthProbe>)> = self
            .probes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let checks = entries.into_iter().map(|(name, weak)| async move {
            let status = match weak.upgrade() {
                Some(probe) => match timeout(PROBE_TIMEOUT, probe.check()).await {
                    Ok(status) => status,
                    Err(_) => ProbeStatus::unhealthy("health check timed out"),
                },
                None => ProbeStatus::unhealthy("pool has been dropped"),
            };
            (name, status)
        });

        join_all(checks).await.into_iter().collect()
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct StaticProbe {
        healthy: bool,
    }

    #[async_trait]
    impl HealthProbe for StaticProbe {
        async fn check(&self) -> ProbeStatus {
            if self.healthy {
                ProbeStatus::healthy("ok")
            } else {
                ProbeStatus::unhealthy("validation query failed")
            }
        }
    }

    #[tokio::test]
    async fn test_register_and_check() {
        let registry = HealthRegistry::new();
        let probe: Arc<dyn HealthProbe> = Arc::new(StaticProbe { healthy: true });
        registry
            .register("transactional", Arc::downgrade(&probe))
            .unwrap();

        let results = registry.check_all().await;
        assert_eq!(results.len(), 1);
        assert!(results["transactional"].healthy);
    }

    #[tokio::test]
    async fn test_duplicate_registration_fails() {
        let registry = HealthRegistry::new();
        let first: Arc<dyn HealthProbe> = Arc::new(StaticProbe { healthy: true });
        let second: Arc<dyn HealthProbe> = Arc::new(StaticProbe { healthy: false });

        registry
            .register("transactional", Arc::downgrade(&first))
            .unwrap();
        let err = registry
            .register("transactional", Arc::downgrade(&second))
            .unwrap_err();
        assert!(matches!(err, PoolError::Duplicate(_)));

        // The first probe still answers
        let results = registry.check_all().await;
        assert!(results["transactional"].healthy);
    }

    #[tokio::test]
    async fn test_dropped_probe_reports_unhealthy() {
        let registry = HealthRegistry::new();
        let probe: Arc<dyn HealthProbe> = Arc::new(StaticProbe { healthy: true });
        registry
            .register("processing", Arc::downgrade(&probe))
            .unwrap();
        drop(probe);

        let results = registry.check_all().await;
        assert!(!results["processing"].healthy);
        assert!(results["processing"].detail.contains("dropped"));
    }
}
