//! Demonstration load generator.
//!
//! Inserts example account rows through the transactional lane using the
//! standard unit-of-work discipline, with a random hold inside each
//! transaction to mimic bulk work. Gated by `seed.enabled`; off by
//! default.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::SeedConfig;
use crate::error::{BackendError, PoolError};
use crate::pool::connection::Connection;
use crate::pool::{Pool, PoolLanes};
use crate::work::unit_of_work;

/// Background task seeding example rows.
pub struct SeedTask {
    config: SeedConfig,
    lanes: Arc<PoolLanes>,
    shutdown: broadcast::Receiver<()>,
}

impl SeedTask {
    pub fn new(
        config: SeedConfig,
        lanes: Arc<PoolLanes>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            lanes,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        if !self.config.enabled {
            return;
        }

        let pool = match self.lanes.transactional().await {
            Ok(pool) => pool,
            Err(e) => {
                tracing::error!(error = %e, "Seed task could not open the transactional lane");
                return;
            }
        };

        let next = match prepare(&pool).await {
            Ok(next) => next,
            Err(e) => {
                tracing::error!(error = %e, "Seed task failed to prepare the account table");
                return;
            }
        };

        let run_id = Uuid::new_v4();
        tracing::info!(
            %run_id,
            next_id = next,
            rows = self.config.rows,
            "Seeding example accounts"
        );

        let mut handles = Vec::with_capacity(self.config.rows as usize);
        for id in next..next + self.config.rows as i64 {
            let pool = pool.clone();
            let delay_ms = if self.config.max_delay_ms == 0 {
                0
            } else {
                rand::rng().random_range(0..self.config.max_delay_ms)
            };
            handles.push(tokio::spawn(async move {
                insert_account(&pool, id, delay_ms).await;
            }));
        }

        let all_done = futures::future::join_all(handles);
        tokio::select! {
            _ = self.shutdown.recv() => {
                tracing::info!(%run_id, "Seed task received shutdown signal");
            }
            _ = all_done => {
                tracing::info!(%run_id, "Seeding complete");
            }
        }
    }
}

/// Make sure the demo table exists and find where numbering left off.
async fn prepare(pool: &Pool) -> Result<i64, PoolError> {
    let mut handle = pool.acquire().await?;
    handle
        .connection_mut()
        .execute(
            "CREATE TABLE IF NOT EXISTS account (id BIGINT PRIMARY KEY, account_no VARCHAR(32) NOT NULL)",
        )
        .await
        .map_err(PoolError::Backend)?;
    let last = handle
        .connection_mut()
        .fetch_scalar("SELECT MAX(id) FROM account")
        .await
        .map_err(PoolError::Backend)?;
    Ok(last.unwrap_or(0) + 1)
}

async fn insert_account(pool: &Pool, id: i64, delay_ms: u64) {
    let account_no = 1_000_000 + id;
    tracing::debug!(id, "Adding account, waiting for a connection");

    let result = unit_of_work(pool, move |conn: &mut dyn Connection| {
        Box::pin(async move {
            let statement = format!(
                "INSERT INTO account (id, account_no) VALUES ({}, '{}')",
                id, account_no
            );
            conn.execute(&statement).await?;
            // Hold the transaction open briefly to mimic bulk work
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<_, BackendError>(())
        })
    })
    .await;

    match result {
        Ok(()) => tracing::info!(id, account_no, "Account added"),
        Err(e) => tracing::error!(id, error = %e, "Failed to add account"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PoolSettings, PoolsConfig, ServerConfig, Settings};

    fn seed_settings(rows: u32) -> Settings {
        let pool = PoolSettings {
            backend: "memory".to_string(),
            url: "memory://test".to_string(),
            min_size: 0,
            max_size: 4,
            connect_timeout_ms: 1000,
            idle_timeout_secs: 60,
            validation_query: "SELECT 1".to_string(),
        };
        Settings {
            server: ServerConfig::default(),
            pools: PoolsConfig {
                transactional: pool.clone(),
                processing: pool,
            },
            seed: SeedConfig {
                enabled: true,
                rows,
                max_delay_ms: 0,
            },
        }
    }

    #[tokio::test]
    async fn test_seed_inserts_rows() {
        let settings = seed_settings(5);
        let lanes = Arc::new(PoolLanes::new(&settings).unwrap());
        let (_tx, rx) = broadcast::channel(1);

        SeedTask::new(settings.seed.clone(), lanes.clone(), rx)
            .run()
            .await;

        // One CREATE TABLE plus five inserts reached the store
        let pool = lanes.transactional().await.unwrap();
        let mut handle = pool.acquire().await.unwrap();
        let count = handle
            .connection_mut()
            .fetch_scalar("SELECT COUNT(*)")
            .await
            .unwrap();
        assert_eq!(count, Some(6));
    }

    #[tokio::test]
    async fn test_seed_disabled_is_a_no_op() {
        let mut settings = seed_settings(5);
        settings.seed.enabled = false;
        let lanes = Arc::new(PoolLanes::new(&settings).unwrap());
        let (_tx, rx) = broadcast::channel(1);

        SeedTask::new(settings.seed.clone(), lanes.clone(), rx)
            .run()
            .await;

        // The transactional lane was never constructed
        assert!(lanes.initialized().is_empty());
    }
}
