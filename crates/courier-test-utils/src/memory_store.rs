// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory queue store for deterministic testing.
//!
//! `MemoryQueueStore` implements `QueueStore` and `DeliveryLog` with the same
//! transition rules as the SQLite store, plus injectable storage faults.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::types::timestamp_now;
use courier_core::{
    ConversationKey, CourierError, DeliveryLog, DeliveryStatus, NewQueueEntry, QueueEntry,
    QueueStats, QueueStatus, QueueStore,
};

#[derive(Default)]
struct State {
    next_id: i64,
    entries: BTreeMap<i64, QueueEntry>,
    failing_enqueues: usize,
    failing_claims: usize,
    failing_writes: usize,
    slow_enqueues: usize,
    enqueue_latency: Duration,
    enqueue_calls: usize,
}

/// A queue store backed by an ordered map.
///
/// Ids start at 1 and increase monotonically. Every operation holds one lock,
/// so `claim_next` is atomic just like the SQLite transaction.
#[derive(Default)]
pub struct MemoryQueueStore {
    state: Mutex<State>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `enqueue_batch` fail with a storage error.
    pub async fn fail_next_enqueues(&self, n: usize) {
        self.state.lock().await.failing_enqueues = n;
    }

    /// Make the next `n` calls to `claim_next` fail with a storage error.
    pub async fn fail_next_claims(&self, n: usize) {
        self.state.lock().await.failing_claims = n;
    }

    /// Make the next `n` calls to `complete` or `release` fail with a storage error.
    pub async fn fail_next_writes(&self, n: usize) {
        self.state.lock().await.failing_writes = n;
    }

    /// Make the next `n` calls to `enqueue_batch` take `latency` before they
    /// succeed or fail. The store stays usable while they wait.
    pub async fn slow_next_enqueues(&self, n: usize, latency: Duration) {
        let mut state = self.state.lock().await;
        state.slow_enqueues = n;
        state.enqueue_latency = latency;
    }

    /// Number of `enqueue_batch` calls so far, failed ones included.
    pub async fn enqueue_calls(&self) -> usize {
        self.state.lock().await.enqueue_calls
    }

    /// Snapshot of every entry in id order.
    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.state.lock().await.entries.values().cloned().collect()
    }

    /// Payloads stored for one conversation, in id order.
    pub async fn payloads_for(&self, key: &ConversationKey) -> Vec<String> {
        self.state
            .lock()
            .await
            .entries
            .values()
            .filter(|e| &e.key == key)
            .map(|e| e.payload.clone())
            .collect()
    }
}

fn injected_fault(what: &str) -> CourierError {
    CourierError::Storage {
        source: format!("injected {what} failure").into(),
    }
}

fn take_fault(remaining: &mut usize) -> bool {
    if *remaining == 0 {
        return false;
    }
    *remaining -= 1;
    true
}

fn expect_processing(state: &mut State, id: i64) -> Result<&mut QueueEntry, CourierError> {
    let entry = state
        .entries
        .get_mut(&id)
        .ok_or(CourierError::NotFound { id })?;
    if entry.status != QueueStatus::Processing {
        return Err(CourierError::InvalidTransition {
            id,
            expected: QueueStatus::Processing,
            actual: entry.status,
        });
    }
    Ok(entry)
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue_batch(&self, entries: Vec<NewQueueEntry>) -> Result<Vec<i64>, CourierError> {
        let latency = {
            let mut state = self.state.lock().await;
            state.enqueue_calls += 1;
            take_fault(&mut state.slow_enqueues).then_some(state.enqueue_latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if take_fault(&mut state.failing_enqueues) {
            return Err(injected_fault("enqueue"));
        }

        let mut ids = Vec::with_capacity(entries.len());
        for new in entries {
            state.next_id += 1;
            let id = state.next_id;
            state.entries.insert(
                id,
                QueueEntry {
                    id,
                    key: new.key,
                    payload: new.payload,
                    status: QueueStatus::Pending,
                    attempts: 0,
                    received_at: new.received_at,
                    updated_at: new.created_at.clone(),
                    created_at: new.created_at,
                    response: None,
                    delivery_status: None,
                    delivery_detail: None,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    async fn claim_next(&self) -> Result<Option<QueueEntry>, CourierError> {
        let mut state = self.state.lock().await;
        if take_fault(&mut state.failing_claims) {
            return Err(injected_fault("claim"));
        }

        let Some(entry) = state
            .entries
            .values_mut()
            .find(|e| e.status == QueueStatus::Pending)
        else {
            return Ok(None);
        };
        entry.status = QueueStatus::Processing;
        entry.attempts += 1;
        entry.updated_at = timestamp_now();
        Ok(Some(entry.clone()))
    }

    async fn complete(
        &self,
        id: i64,
        status: QueueStatus,
        response: Option<String>,
    ) -> Result<(), CourierError> {
        if !status.is_terminal() {
            return Err(CourierError::NotTerminal { id, status });
        }
        let mut state = self.state.lock().await;
        if take_fault(&mut state.failing_writes) {
            return Err(injected_fault("complete"));
        }
        let entry = expect_processing(&mut state, id)?;
        entry.status = status;
        entry.response = response;
        entry.updated_at = timestamp_now();
        Ok(())
    }

    async fn release(
        &self,
        id: i64,
        error: &str,
        max_retries: u32,
    ) -> Result<QueueStatus, CourierError> {
        let mut state = self.state.lock().await;
        if take_fault(&mut state.failing_writes) {
            return Err(injected_fault("release"));
        }
        let entry = expect_processing(&mut state, id)?;
        if entry.attempts < max_retries {
            entry.status = QueueStatus::Pending;
        } else {
            entry.status = QueueStatus::Failed;
            entry.response = Some(error.to_string());
        }
        entry.updated_at = timestamp_now();
        Ok(entry.status)
    }

    async fn get(&self, id: i64) -> Result<Option<QueueEntry>, CourierError> {
        Ok(self.state.lock().await.entries.get(&id).cloned())
    }

    async fn recover_stale(&self) -> Result<u64, CourierError> {
        let mut state = self.state.lock().await;
        let mut recovered = 0;
        for entry in state.entries.values_mut() {
            if entry.status == QueueStatus::Processing {
                entry.status = QueueStatus::Pending;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn stats(&self) -> Result<QueueStats, CourierError> {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for entry in state.entries.values() {
            stats.count(entry.status);
        }
        Ok(stats)
    }
}

#[async_trait]
impl DeliveryLog for MemoryQueueStore {
    async fn record_delivery(
        &self,
        entry_id: i64,
        status: DeliveryStatus,
        detail: Option<&str>,
    ) -> Result<(), CourierError> {
        let mut state = self.state.lock().await;
        let entry = state
            .entries
            .get_mut(&entry_id)
            .ok_or(CourierError::NotFound { id: entry_id })?;
        entry.delivery_status = Some(status);
        entry.delivery_detail = detail.map(str::to_string);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_entry(payload: &str) -> NewQueueEntry {
        NewQueueEntry {
            key: ConversationKey::new("mock", "u1", 1, 1),
            payload: payload.to_string(),
            received_at: timestamp_now(),
            created_at: timestamp_now(),
        }
    }

    #[tokio::test]
    async fn follows_queue_transition_rules() {
        let store = MemoryQueueStore::new();
        let ids = store
            .enqueue_batch(vec![new_entry("a"), new_entry("b")])
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2]);

        let claimed = store.claim_next().await.unwrap().unwrap();
        assert_eq!((claimed.id, claimed.attempts), (1, 1));

        assert!(matches!(
            store.complete(2, QueueStatus::Success, None).await,
            Err(CourierError::InvalidTransition { .. })
        ));
        assert_eq!(
            store.release(1, "nope", 1).await.unwrap(),
            QueueStatus::Failed
        );
        assert_eq!(store.stats().await.unwrap().failed, 1);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let store = MemoryQueueStore::new();
        store.fail_next_enqueues(1).await;
        assert!(store.enqueue(new_entry("x")).await.is_err());
        assert!(store.enqueue(new_entry("x")).await.is_ok());
        assert_eq!(store.enqueue_calls().await, 2);

        store.fail_next_claims(1).await;
        assert!(store.claim_next().await.is_err());
        let claimed = store.claim_next().await.unwrap().unwrap();

        store.fail_next_writes(1).await;
        assert!(store.complete(claimed.id, QueueStatus::Success, None).await.is_err());
        assert_eq!(
            store.get(claimed.id).await.unwrap().unwrap().status,
            QueueStatus::Processing
        );
        store
            .complete(claimed.id, QueueStatus::Success, None)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_enqueue_does_not_block_other_calls() {
        let store = std::sync::Arc::new(MemoryQueueStore::new());
        store.slow_next_enqueues(1, Duration::from_secs(10)).await;

        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.enqueue(new_entry("slow")).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.enqueue_calls().await, 1);
        assert!(store.entries().await.is_empty());
        assert_eq!(store.stats().await.unwrap().total(), 0);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(slow.await.unwrap().unwrap(), 1);
    }
}
