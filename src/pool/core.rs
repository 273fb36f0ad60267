//! Semaphore-bounded connection pool.
//!
//! Capacity is enforced by a semaphore with `max_size` permits; a borrow
//! waits up to `connect_timeout` for a permit and then fails instead of
//! blocking forever. Idle connections are kept in a LIFO stack and
//! validated with the pool's validation query before being handed out.
//! Borrowed connections are returned through the [`PooledConnection`]
//! guard's `Drop`, so every exit path — success, error, panic, task
//! cancellation — releases the slot.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;

use crate::error::{BackendError, PoolError};
use crate::metrics::PoolMetrics;

use super::config::PoolConfig;
use super::connection::{Connection, ConnectionFactory};

/// Upper bound on validating an idle connection before handing it out.
const BORROW_VALIDATION_TIMEOUT: Duration = Duration::from_secs(2);

struct IdleEntry {
    conn: Box<dyn Connection>,
    parked_at: Instant,
}

pub(crate) struct PoolCore {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    /// Idle connections, most recently used last
    idle: Mutex<Vec<IdleEntry>>,
    semaphore: Arc<Semaphore>,
    borrowed: AtomicUsize,
    idle_count: AtomicUsize,
    pending: AtomicUsize,
    borrows_total: AtomicU64,
    wait_ms_total: AtomicU64,
    timeouts_total: AtomicU64,
    closed: AtomicBool,
    metrics: Arc<PoolMetrics>,
}

impl std::fmt::Debug for PoolCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCore")
            .field("name", &self.config.name)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl PoolCore {
    /// Build the pool and open its `min_size` connections eagerly. An
    /// unreachable target fails here, not on first borrow.
    pub(crate) async fn open(
        config: PoolConfig,
        factory: Arc<dyn ConnectionFactory>,
        metrics: Arc<PoolMetrics>,
    ) -> Result<Arc<Self>, PoolError> {
        let core = Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(config.max_size)),
            factory,
            idle: Mutex::new(Vec::with_capacity(config.max_size)),
            borrowed: AtomicUsize::new(0),
            idle_count: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
            borrows_total: AtomicU64::new(0),
            wait_ms_total: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            metrics,
            config,
        });

        for _ in 0..core.config.min_size {
            let conn = core.open_connection().await?;
            core.park(conn).await;
        }
        if core.config.min_size == 0 {
            // Still verify the target is reachable, fail-fast semantics
            let conn = core.open_connection().await?;
            conn.close().await;
        }

        tracing::info!(
            pool = %core.config.name,
            min_size = core.config.min_size,
            max_size = core.config.max_size,
            "Connection pool created"
        );

        Ok(core)
    }

    pub(crate) fn name(&self) -> &str {
        &self.config.name
    }

    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn open_connection(&self) -> Result<Box<dyn Connection>, PoolError> {
        self.factory.open().await.map_err(|e| PoolError::Creation {
            name: self.config.name.clone(),
            reason: e.to_string(),
        })
    }

    async fn park(&self, conn: Box<dyn Connection>) {
        let mut idle = self.idle.lock().await;
        idle.push(IdleEntry {
            conn,
            parked_at: Instant::now(),
        });
        self.idle_count.fetch_add(1, Ordering::AcqRel);
        self.metrics
            .idle_connections
            .set(self.idle_count.load(Ordering::Acquire) as i64);
    }

    /// Borrow a connection, waiting up to `connect_timeout` for a free
    /// slot.
    pub(crate) async fn acquire(self: &Arc<Self>) -> Result<PooledConnection, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed(self.config.name.clone()));
        }

        let start = Instant::now();
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.metrics
            .pending_borrows
            .set(self.pending.load(Ordering::Acquire) as i64);

        let permit = match timeout(
            self.config.connect_timeout,
            self.semaphore.clone().acquire_owned(),
        )
        .await
        {
            Ok(Ok(permit)) => {
                self.settle_pending();
                permit
            }
            Ok(Err(_closed)) => {
                self.settle_pending();
                return Err(PoolError::Closed(self.config.name.clone()));
            }
            Err(_elapsed) => {
                self.settle_pending();
                self.timeouts_total.fetch_add(1, Ordering::AcqRel);
                self.metrics.borrow_timeouts_total.inc();
                return Err(PoolError::Exhausted {
                    name: self.config.name.clone(),
                    waited_ms: start.elapsed().as_millis() as u64,
                });
            }
        };

        let conn = match self.checkout().await {
            Ok(conn) => conn,
            Err(e) => {
                // Permit drops here, handing the slot back
                drop(permit);
                return Err(PoolError::Backend(e));
            }
        };

        let waited = start.elapsed();
        self.borrowed.fetch_add(1, Ordering::AcqRel);
        self.borrows_total.fetch_add(1, Ordering::AcqRel);
        self.wait_ms_total
            .fetch_add(waited.as_millis() as u64, Ordering::AcqRel);
        self.metrics.borrows_total.inc();
        self.metrics.borrow_wait_seconds.observe(waited.as_secs_f64());
        self.metrics
            .active_connections
            .set(self.borrowed.load(Ordering::Acquire) as i64);

        // The slot stays taken until release() hands it back
        permit.forget();

        Ok(PooledConnection {
            conn: Some(conn),
            core: self.clone(),
            poisoned: false,
        })
    }

    fn settle_pending(&self) {
        self.pending.fetch_sub(1, Ordering::AcqRel);
        self.metrics
            .pending_borrows
            .set(self.pending.load(Ordering::Acquire) as i64);
    }

    /// Pop idle connections until one passes validation, opening a fresh
    /// one when the stack runs dry.
    async fn checkout(&self) -> Result<Box<dyn Connection>, BackendError> {
        loop {
            let entry = {
                let mut idle = self.idle.lock().await;
                let entry = idle.pop();
                if entry.is_some() {
                    self.idle_count.fetch_sub(1, Ordering::AcqRel);
                }
                entry
            };

            let Some(entry) = entry else {
                return self.factory.open().await;
            };
            self.metrics
                .idle_connections
                .set(self.idle_count.load(Ordering::Acquire) as i64);

            if entry.parked_at.elapsed() > self.config.idle_timeout {
                entry.conn.close().await;
                continue;
            }

            let mut conn = entry.conn;
            match timeout(
                BORROW_VALIDATION_TIMEOUT,
                conn.ping(&self.config.validation_query),
            )
            .await
            {
                Ok(Ok(())) => return Ok(conn),
                Ok(Err(e)) => {
                    tracing::warn!(
                        pool = %self.config.name,
                        error = %e,
                        "Discarding idle connection that failed validation"
                    );
                    conn.close().await;
                }
                Err(_) => {
                    tracing::warn!(
                        pool = %self.config.name,
                        "Discarding idle connection: validation timed out"
                    );
                    conn.close().await;
                }
            }
        }
    }

    /// Return a borrowed connection. Poisoned connections are closed
    /// instead of parked.
    pub(crate) async fn release(&self, conn: Box<dyn Connection>, poisoned: bool) {
        self.semaphore.add_permits(1);
        self.borrowed.fetch_sub(1, Ordering::AcqRel);
        self.metrics
            .active_connections
            .set(self.borrowed.load(Ordering::Acquire) as i64);

        if poisoned || self.is_closed() {
            conn.close().await;
            return;
        }

        self.park(conn).await;
    }

    /// Refuse further borrows, wake pending waiters and drain the idle
    /// stack. Connections still borrowed are closed as they come back.
    pub(crate) async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.semaphore.close();

        let mut idle = self.idle.lock().await;
        for entry in idle.drain(..) {
            entry.conn.close().await;
        }
        self.idle_count.store(0, Ordering::Release);
        self.metrics.idle_connections.set(0);

        tracing::info!(pool = %self.config.name, "Connection pool closed");
    }

    pub(crate) fn stats(&self) -> PoolStats {
        let borrows = self.borrows_total.load(Ordering::Acquire);
        let wait_ms = self.wait_ms_total.load(Ordering::Acquire);
        PoolStats {
            active: self.borrowed.load(Ordering::Acquire),
            idle: self.idle_count.load(Ordering::Acquire),
            pending: self.pending.load(Ordering::Acquire),
            borrows_total: borrows,
            borrow_timeouts_total: self.timeouts_total.load(Ordering::Acquire),
            avg_borrow_wait_ms: if borrows == 0 {
                0.0
            } else {
                wait_ms as f64 / borrows as f64
            },
        }
    }
}

/// Accounting snapshot of one pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub active: usize,
    pub idle: usize,
    pub pending: usize,
    pub borrows_total: u64,
    pub borrow_timeouts_total: u64,
    pub avg_borrow_wait_ms: f64,
}

/// A connection leased from a pool, owned exclusively by the borrower.
///
/// Dropping the guard returns the connection to the pool — on success,
/// error, panic and cancellation paths alike.
pub struct PooledConnection {
    conn: Option<Box<dyn Connection>>,
    core: Arc<PoolCore>,
    poisoned: bool,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("pool", &self.core.name())
            .field("poisoned", &self.poisoned)
            .finish_non_exhaustive()
    }
}

impl PooledConnection {
    pub fn connection_mut(&mut self) -> &mut dyn Connection {
        self.conn
            .as_mut()
            .expect("connection already returned to pool")
            .as_mut()
    }

    pub fn pool_name(&self) -> &str {
        self.core.name()
    }

    /// Mark the connection as unusable; it will be closed instead of
    /// returned to the idle stack.
    pub fn poison(&mut self) {
        self.poisoned = true;
    }
}

impl std::ops::Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.conn
            .as_ref()
            .expect("connection already returned to pool")
            .as_ref()
    }
}

impl std::ops::DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
            .as_mut()
            .expect("connection already returned to pool")
            .as_mut()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            let core = self.core.clone();
            let poisoned = self.poisoned;
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        core.release(conn, poisoned).await;
                    });
                }
                Err(_) => {
                    // Runtime already gone; only happens during shutdown,
                    // when the pool is being torn down anyway
                    tracing::warn!(
                        pool = %core.name(),
                        "Connection dropped without being returned to pool"
                    );
                }
            }
        }
    }
}
