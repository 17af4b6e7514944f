// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage traits: backend lifecycle, the durable work queue, and the delivery log.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{DeliveryStatus, NewQueueEntry, QueueEntry, QueueStats, QueueStatus};

/// Adapter for storage and persistence backends.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), CourierError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), CourierError>;
}

/// The durable, status-tracked work queue.
///
/// `claim_next` is the only operation that moves an entry from `pending`
/// to `processing`; implementations must make it atomic so that two
/// claimers never receive the same entry.
#[async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Persist one entry and return its id.
    async fn enqueue(&self, entry: NewQueueEntry) -> Result<i64, CourierError> {
        self.enqueue_batch(vec![entry])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CourierError::Internal("enqueue returned no id".to_string()))
    }

    /// Persist entries in order, all or nothing. Returns ids in the same order.
    async fn enqueue_batch(&self, entries: Vec<NewQueueEntry>) -> Result<Vec<i64>, CourierError>;

    /// Claim the oldest pending entry, marking it `processing` and counting
    /// the attempt. Returns `None` when nothing is pending.
    async fn claim_next(&self) -> Result<Option<QueueEntry>, CourierError>;

    /// Move a `processing` entry to a terminal status.
    ///
    /// Fails with [`CourierError::InvalidTransition`] if the entry is not
    /// `processing`, or [`CourierError::NotTerminal`] if `status` is not terminal.
    async fn complete(
        &self,
        id: i64,
        status: QueueStatus,
        response: Option<String>,
    ) -> Result<(), CourierError>;

    /// Record a failed attempt on a `processing` entry.
    ///
    /// The entry returns to `pending` while `attempts < max_retries`;
    /// otherwise it becomes `failed` with `error` as its response.
    /// Returns the resulting status.
    async fn release(
        &self,
        id: i64,
        error: &str,
        max_retries: u32,
    ) -> Result<QueueStatus, CourierError>;

    /// Look up an entry by id.
    async fn get(&self, id: i64) -> Result<Option<QueueEntry>, CourierError>;

    /// Return entries left `processing` by an interrupted run to `pending`.
    async fn recover_stale(&self) -> Result<u64, CourierError>;

    /// Entry counts per status.
    async fn stats(&self) -> Result<QueueStats, CourierError>;
}

/// Side channel where platform handlers record delivery outcomes.
///
/// Delivery status is independent of processing status: recording a
/// failed delivery never changes an entry's `status`.
#[async_trait]
pub trait DeliveryLog: Send + Sync + 'static {
    async fn record_delivery(
        &self,
        entry_id: i64,
        status: DeliveryStatus,
        detail: Option<&str>,
    ) -> Result<(), CourierError>;
}
