//! Transaction discipline for consumers.
//!
//! [`unit_of_work`] is how mutating callers use a pool: borrow a handle,
//! open a transaction, run the statements, commit on success, roll back on
//! any failure, and return the handle on every exit path. Auto-commit is
//! restored when the transaction ends, so the connection goes back to the
//! pool in a reusable state.

use futures::future::BoxFuture;

use crate::error::{BackendError, PoolError, Result};
use crate::pool::connection::Connection;
use crate::pool::factory::Pool;

/// Run one unit of work inside a transaction on a connection borrowed from
/// `pool`.
///
/// The closure's statements either all commit or none do. The borrowed
/// handle is released when this function returns, success or failure; a
/// connection whose rollback fails is discarded rather than returned.
pub async fn unit_of_work<T, F>(pool: &Pool, work: F) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut dyn Connection) -> BoxFuture<'c, std::result::Result<T, BackendError>>
        + Send,
{
    let mut handle = pool.acquire().await?;

    handle
        .connection_mut()
        .begin()
        .await
        .map_err(PoolError::Backend)?;

    match work(handle.connection_mut()).await {
        Ok(value) => {
            if let Err(commit_err) = handle.connection_mut().commit().await {
                if let Err(rollback_err) = handle.connection_mut().rollback().await {
                    tracing::error!(
                        pool = %pool.name(),
                        error = %rollback_err,
                        "Rollback after failed commit also failed, discarding connection"
                    );
                    handle.poison();
                }
                return Err(PoolError::UnitOfWork(commit_err));
            }
            Ok(value)
        }
        Err(work_err) => {
            tracing::warn!(
                pool = %pool.name(),
                error = %work_err,
                "Unit of work failed, rolling back"
            );
            if let Err(rollback_err) = handle.connection_mut().rollback().await {
                tracing::error!(
                    pool = %pool.name(),
                    error = %rollback_err,
                    "Rollback failed, discarding connection"
                );
                handle.poison();
            }
            Err(PoolError::UnitOfWork(work_err))
        }
    }
}
