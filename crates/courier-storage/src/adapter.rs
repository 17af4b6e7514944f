// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage, queue and delivery-log traits.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use courier_config::model::StorageConfig;
use courier_core::{
    AdapterType, CourierError, DeliveryLog, DeliveryStatus, HealthStatus, NewQueueEntry,
    PluginAdapter, QueueEntry, QueueStats, QueueStatus, QueueStore, StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to [`queries::queue`]. The
/// database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`](StorageAdapter::initialize) is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, CourierError> {
        self.db.get().ok_or_else(|| CourierError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Most recently updated entries with `status`, newest first.
    pub async fn recent(
        &self,
        status: QueueStatus,
        limit: usize,
    ) -> Result<Vec<QueueEntry>, CourierError> {
        queries::queue::list_recent(self.db()?, status, limit).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), CourierError> {
        let db =
            Database::open_with_options(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| CourierError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), CourierError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteStorage {
    async fn enqueue_batch(&self, entries: Vec<NewQueueEntry>) -> Result<Vec<i64>, CourierError> {
        queries::queue::enqueue_batch(self.db()?, entries).await
    }

    async fn claim_next(&self) -> Result<Option<QueueEntry>, CourierError> {
        queries::queue::claim_next(self.db()?).await
    }

    async fn complete(
        &self,
        id: i64,
        status: QueueStatus,
        response: Option<String>,
    ) -> Result<(), CourierError> {
        queries::queue::complete(self.db()?, id, status, response).await
    }

    async fn release(
        &self,
        id: i64,
        error: &str,
        max_retries: u32,
    ) -> Result<QueueStatus, CourierError> {
        queries::queue::release(self.db()?, id, error, max_retries).await
    }

    async fn get(&self, id: i64) -> Result<Option<QueueEntry>, CourierError> {
        queries::queue::get(self.db()?, id).await
    }

    async fn recover_stale(&self) -> Result<u64, CourierError> {
        queries::queue::recover_stale(self.db()?).await
    }

    async fn stats(&self) -> Result<QueueStats, CourierError> {
        queries::queue::stats(self.db()?).await
    }
}

#[async_trait]
impl DeliveryLog for SqliteStorage {
    async fn record_delivery(
        &self,
        entry_id: i64,
        status: DeliveryStatus,
        detail: Option<&str>,
    ) -> Result<(), CourierError> {
        queries::queue::record_delivery(self.db()?, entry_id, status, detail).await
    }
}
