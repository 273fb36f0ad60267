//! In-memory connection backend.
//!
//! Used for tests and local development, selected with `backend = "memory"`.
//! Each factory owns a shared statement store; committed statements are
//! appended to it, and explicit transactions stage statements in a buffer
//! that is flushed on commit and discarded on rollback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::BackendError;

use super::connection::{Connection, ConnectionFactory};

/// Shared committed state behind all connections of one memory factory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshot of all committed statements, in commit order.
    pub fn committed(&self) -> Vec<String> {
        self.rows.lock().expect("memory store lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().expect("memory store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn append(&self, statements: impl IntoIterator<Item = String>) {
        let mut rows = self.rows.lock().expect("memory store lock poisoned");
        rows.extend(statements);
    }
}

/// Factory handing out [`MemoryConnection`]s over a shared store.
pub struct MemoryConnectionFactory {
    store: Arc<MemoryStore>,
    reachable: AtomicBool,
}

impl MemoryConnectionFactory {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            reachable: AtomicBool::new(true),
        }
    }

    /// Factory over an existing store, so multiple pools (or assertions in
    /// tests) can observe the same committed state.
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        Self {
            store,
            reachable: AtomicBool::new(true),
        }
    }

    /// A factory that refuses every open, simulating an unreachable
    /// connection target.
    pub fn unreachable() -> Self {
        Self {
            store: MemoryStore::new(),
            reachable: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }
}

impl Default for MemoryConnectionFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionFactory for MemoryConnectionFactory {
    async fn open(&self) -> Result<Box<dyn Connection>, BackendError> {
        if !self.reachable.load(Ordering::Acquire) {
            return Err(BackendError::unavailable("memory target unreachable"));
        }
        Ok(Box::new(MemoryConnection {
            store: self.store.clone(),
            tx_buffer: None,
        }))
    }
}

/// One in-memory connection. `tx_buffer` is `Some` while an explicit
/// transaction is open.
pub struct MemoryConnection {
    store: Arc<MemoryStore>,
    tx_buffer: Option<Vec<String>>,
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn execute(&mut self, statement: &str) -> Result<u64, BackendError> {
        match &mut self.tx_buffer {
            Some(buffer) => buffer.push(statement.to_string()),
            None => self.store.append([statement.to_string()]),
        }
        Ok(1)
    }

    async fn fetch_scalar(&mut self, _query: &str) -> Result<Option<i64>, BackendError> {
        // The memory backend answers every scalar query with the committed
        // row count, which is enough for the demo load generator.
        let count = self.store.len() as i64;
        Ok(if count == 0 { None } else { Some(count) })
    }

    async fn begin(&mut self) -> Result<(), BackendError> {
        if self.tx_buffer.is_some() {
            return Err(BackendError::unavailable("transaction already open"));
        }
        self.tx_buffer = Some(Vec::new());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), BackendError> {
        match self.tx_buffer.take() {
            Some(buffer) => {
                self.store.append(buffer);
                Ok(())
            }
            None => Err(BackendError::unavailable("no open transaction to commit")),
        }
    }

    async fn rollback(&mut self) -> Result<(), BackendError> {
        match self.tx_buffer.take() {
            Some(_) => Ok(()),
            None => Err(BackendError::unavailable("no open transaction to roll back")),
        }
    }

    async fn ping(&mut self, _validation_query: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_autocommit_appends_directly() {
        let factory = MemoryConnectionFactory::new();
        let mut conn = factory.open().await.unwrap();

        conn.execute("INSERT 1").await.unwrap();
        conn.execute("INSERT 2").await.unwrap();

        assert_eq!(factory.store().committed(), vec!["INSERT 1", "INSERT 2"]);
    }

    #[tokio::test]
    async fn test_commit_flushes_buffer() {
        let factory = MemoryConnectionFactory::new();
        let mut conn = factory.open().await.unwrap();

        conn.begin().await.unwrap();
        conn.execute("INSERT 1").await.unwrap();
        assert!(factory.store().is_empty());

        conn.commit().await.unwrap();
        assert_eq!(factory.store().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_discards_buffer() {
        let factory = MemoryConnectionFactory::new();
        let mut conn = factory.open().await.unwrap();

        conn.begin().await.unwrap();
        conn.execute("INSERT 1").await.unwrap();
        conn.execute("INSERT 2").await.unwrap();
        conn.rollback().await.unwrap();

        assert!(factory.store().is_empty());

        // Auto-commit is restored after rollback
        conn.execute("INSERT 3").await.unwrap();
        assert_eq!(factory.store().committed(), vec!["INSERT 3"]);
    }

    #[tokio::test]
    async fn test_unreachable_factory_refuses_open() {
        let factory = MemoryConnectionFactory::unreachable();
        let err = factory.open().await.unwrap_err();
        assert!(format!("{}", err).contains("unreachable"));
    }

    #[tokio::test]
    async fn test_fetch_scalar_reports_committed_count() {
        let factory = MemoryConnectionFactory::new();
        let mut conn = factory.open().await.unwrap();

        assert_eq!(conn.fetch_scalar("SELECT MAX(id)").await.unwrap(), None);
        conn.execute("INSERT 1").await.unwrap();
        assert_eq!(conn.fetch_scalar("SELECT MAX(id)").await.unwrap(), Some(1));
    }
}
