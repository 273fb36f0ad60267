//! Workload-isolated connection pooling.
//!
//! - [`config`]: resolved, validated per-pool configuration
//! - [`connection`]: the backend capability traits
//! - [`core`]: the semaphore-bounded pool and its RAII handle
//! - [`factory`]: pool construction and registry wiring
//! - [`lanes`]: the two-lane transactional/processing registry
//! - [`memory`]: in-memory backend for tests and local development

pub mod config;
pub mod connection;
pub mod core;
pub mod factory;
pub mod lanes;
pub mod memory;

pub use config::PoolConfig;
pub use connection::{Connection, ConnectionFactory};
pub use core::{PoolStats, PooledConnection};
pub use factory::Pool;
pub use lanes::{PoolLanes, PROCESSING, TRANSACTIONAL};
pub use memory::{MemoryConnectionFactory, MemoryStore};
