mod settings;

pub use settings::{PoolSettings, PoolsConfig, SeedConfig, ServerConfig, Settings};
