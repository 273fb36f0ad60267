//! Error taxonomy for the pooling layer.
//!
//! Construction-time failures (`Configuration`, `Creation`, `Duplicate`) are
//! fatal for the affected pool and abort its startup. Steady-state failures
//! (`Exhausted`, `UnitOfWork`, `Backend`) are returned to the immediate
//! caller and logged; they never crash the process.

use thiserror::Error;

/// Connection-level failures surfaced by a pool backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("{0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        BackendError::Unavailable(message.into())
    }
}

/// Errors produced by pool configuration, construction and use.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Bad or missing pool parameters. Fatal at startup, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The underlying connection backend refused to initialize. Fatal for
    /// that pool; the process must not silently fall back to another pool.
    #[error("failed to create pool `{name}`: {reason}")]
    Creation { name: String, reason: String },

    /// The same pool name was registered twice. A programming error.
    #[error("pool `{0}` is already registered")]
    Duplicate(String),

    /// A borrow exceeded its wait bound. Transient; the caller may retry
    /// with backoff.
    #[error("pool `{name}` exhausted: no connection became available within {waited_ms}ms")]
    Exhausted { name: String, waited_ms: u64 },

    /// The pool has been closed and no longer hands out connections.
    #[error("pool `{0}` is closed")]
    Closed(String),

    /// A consumer's statement failed inside a transaction. The transaction
    /// has been rolled back; the error is reported, never retried here.
    #[error("unit of work failed: {0}")]
    UnitOfWork(#[source] BackendError),

    /// A connection-level failure outside a unit of work.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type Result<T> = std::result::Result<T, PoolError>;
