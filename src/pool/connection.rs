//! Backend capability seam.
//!
//! The pool treats its connection backend as a small capability set: open a
//! connection, execute statements on it, drive an explicit transaction,
//! validate it, close it. Backends (PostgreSQL via sqlx, in-memory for tests
//! and local development) implement these traits.

use async_trait::async_trait;

use crate::error::BackendError;

/// A single database connection, owned exclusively by its borrower.
///
/// Connections start in auto-commit mode. [`Connection::begin`] suspends
/// auto-commit until the matching [`Connection::commit`] or
/// [`Connection::rollback`].
#[async_trait]
pub trait Connection: Send {
    /// Execute a statement, returning the number of affected rows.
    async fn execute(&mut self, statement: &str) -> Result<u64, BackendError>;

    /// Run a query expected to produce a single nullable integer value.
    async fn fetch_scalar(&mut self, query: &str) -> Result<Option<i64>, BackendError>;

    /// Start an explicit transaction.
    async fn begin(&mut self) -> Result<(), BackendError>;

    /// Commit the current transaction and restore auto-commit.
    async fn commit(&mut self) -> Result<(), BackendError>;

    /// Roll back the current transaction and restore auto-commit.
    async fn rollback(&mut self) -> Result<(), BackendError>;

    /// Run the pool's validation query. Ok means the connection is usable.
    async fn ping(&mut self, validation_query: &str) -> Result<(), BackendError>;

    /// Close the connection, releasing its server-side resources.
    async fn close(self: Box<Self>);
}

impl std::fmt::Debug for dyn Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Connection")
    }
}

/// Opens connections for a pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Connection>, BackendError>;
}
