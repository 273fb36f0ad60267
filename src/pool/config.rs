//! Resolved, validated per-pool configuration.

use std::time::Duration;

use crate::config::PoolSettings;
use crate::error::PoolError;

/// Immutable configuration for one connection pool.
///
/// Produced once at startup by [`PoolConfig::resolve`]; never mutated after
/// resolution.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub name: String,
    pub backend: String,
    pub url: String,
    pub min_size: usize,
    pub max_size: usize,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub validation_query: String,
}

impl PoolConfig {
    /// Resolve raw settings into a validated config. Pure function of its
    /// inputs; fails with a configuration error if a value is out of range.
    pub fn resolve(name: &str, settings: &PoolSettings) -> Result<Self, PoolError> {
        if name.is_empty() {
            return Err(PoolError::Configuration("pool name must not be empty".into()));
        }
        if settings.max_size == 0 {
            return Err(PoolError::Configuration(format!(
                "pool `{}`: max_size must be greater than 0",
                name
            )));
        }
        if settings.min_size > settings.max_size {
            return Err(PoolError::Configuration(format!(
                "pool `{}`: min_size ({}) exceeds max_size ({})",
                name, settings.min_size, settings.max_size
            )));
        }
        if settings.connect_timeout_ms == 0 {
            return Err(PoolError::Configuration(format!(
                "pool `{}`: connect_timeout_ms must be greater than 0",
                name
            )));
        }
        if settings.url.is_empty() {
            return Err(PoolError::Configuration(format!(
                "pool `{}`: url must not be empty",
                name
            )));
        }
        if settings.validation_query.is_empty() {
            return Err(PoolError::Configuration(format!(
                "pool `{}`: validation_query must not be empty",
                name
            )));
        }

        Ok(Self {
            name: name.to_string(),
            backend: settings.backend.clone(),
            url: settings.url.clone(),
            min_size: settings.min_size as usize,
            max_size: settings.max_size as usize,
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
            idle_timeout: Duration::from_secs(settings.idle_timeout_secs),
            validation_query: settings.validation_query.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_settings() -> PoolSettings {
        PoolSettings {
            backend: "memory".to_string(),
            url: "memory://test".to_string(),
            min_size: 1,
            max_size: 5,
            connect_timeout_ms: 500,
            idle_timeout_secs: 60,
            validation_query: "SELECT 1".to_string(),
        }
    }

    #[test]
    fn test_resolve_valid() {
        let config = PoolConfig::resolve("transactional", &base_settings()).unwrap();
        assert_eq!(config.name, "transactional");
        assert_eq!(config.min_size, 1);
        assert_eq!(config.max_size, 5);
        assert_eq!(config.connect_timeout, Duration::from_millis(500));
    }

    #[test]
    fn test_resolve_rejects_zero_max_size() {
        let mut settings = base_settings();
        settings.max_size = 0;
        let err = PoolConfig::resolve("transactional", &settings).unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
    }

    #[test]
    fn test_resolve_rejects_min_above_max() {
        let mut settings = base_settings();
        settings.min_size = 10;
        settings.max_size = 5;
        let err = PoolConfig::resolve("processing", &settings).unwrap_err();
        assert!(matches!(err, PoolError::Configuration(_)));
        assert!(format!("{}", err).contains("min_size"));
    }

    #[test]
    fn test_resolve_rejects_zero_timeout() {
        let mut settings = base_settings();
        settings.connect_timeout_ms = 0;
        assert!(PoolConfig::resolve("transactional", &settings).is_err());
    }

    #[test]
    fn test_resolve_rejects_empty_url() {
        let mut settings = base_settings();
        settings.url = String::new();
        assert!(PoolConfig::resolve("transactional", &settings).is_err());
    }
}
