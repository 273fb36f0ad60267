use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    pub pools: PoolsConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

/// The two named pool sub-trees. Each lane is sized independently; they
/// never share connection slots.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolsConfig {
    pub transactional: PoolSettings,
    pub processing: PoolSettings,
}

/// Raw, unvalidated settings for one pool. Validation happens when these
/// are resolved into a `PoolConfig`.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    /// Connection backend: "postgres" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Connection target, credentials included
    #[serde(default = "default_url")]
    pub url: String,
    /// Connections opened eagerly at construction
    #[serde(default)]
    pub min_size: u32,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    /// Upper bound on how long a borrow may wait for a free connection
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Idle connections older than this are discarded on borrow
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_validation_query")]
    pub validation_query: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Demonstration load generator: inserts example rows through the
/// transactional lane. Off by default.
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_seed_rows")]
    pub rows: u32,
    /// Upper bound for the random delay inside each insert transaction
    #[serde(default = "default_seed_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_backend() -> String {
    "postgres".to_string()
}

fn default_url() -> String {
    "postgres://localhost:5432/app".to_string()
}

fn default_max_size() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_validation_query() -> String {
    "SELECT 1".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8081
}

fn default_seed_rows() -> u32 {
    100
}

fn default_seed_max_delay_ms() -> u64 {
    3000
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8081)?
            .set_default("pools.transactional.max_size", 10)?
            .set_default("pools.transactional.connect_timeout_ms", 1000)?
            .set_default("pools.processing.max_size", 30)?
            .set_default("pools.processing.connect_timeout_ms", 10000)?
            .set_default("pools.processing.idle_timeout_secs", 600)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables
            // SERVER__PORT, POOLS__TRANSACTIONAL__MAX_SIZE, etc.
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_url(),
            min_size: 0,
            max_size: default_max_size(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            validation_query: default_validation_query(),
        }
    }
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rows: default_seed_rows(),
            max_delay_ms: default_seed_max_delay_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let server = ServerConfig::default();
        assert_eq!(server.host, "0.0.0.0");
        assert_eq!(server.port, 8081);

        let pool = PoolSettings::default();
        assert_eq!(pool.backend, "postgres");
        assert_eq!(pool.max_size, 10);
        assert_eq!(pool.validation_query, "SELECT 1");

        let seed = SeedConfig::default();
        assert!(!seed.enabled);
    }
}
