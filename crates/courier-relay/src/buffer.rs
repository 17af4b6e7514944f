// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-conversation debounce buffer.
//!
//! Messages for one [`ConversationKey`] accumulate until `delay` passes
//! without a new one; the whole batch is then written to the queue store in
//! one transaction, one entry per message, in receipt order.
//!
//! Each key has at most one timer task. A new message aborts it and arms a
//! fresh one tagged with a new generation. A timer only flushes the batch if
//! the generation still matches, and it detaches the batch from the table
//! under the lock before writing, so a concurrent `add` lands in a new batch.
//!
//! Writes for one key are serialized by a per-key writer lock held across
//! the store call and any requeue, so a later batch is never written ahead of
//! an earlier one that is still in flight or being put back after a failure.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use courier_core::{BufferedMessage, ConversationKey, CourierError, NewQueueEntry, QueueStore};

/// Lower bound on the delay before retrying a failed flush.
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

type Writer = Arc<tokio::sync::Mutex<()>>;

struct PendingBatch {
    messages: Vec<BufferedMessage>,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Table {
    batches: HashMap<ConversationKey, PendingBatch>,
    writers: HashMap<ConversationKey, Writer>,
    closed: bool,
}

enum Placement {
    /// New inbound messages go after anything already buffered.
    Append,
    /// Messages from a failed flush go back in front.
    Requeue,
}

struct Inner {
    store: Arc<dyn QueueStore>,
    delay: Duration,
    table: Mutex<Table>,
    generation: AtomicU64,
    tracker: TaskTracker,
}

/// Coalesces bursts of inbound messages per conversation.
///
/// Cloning yields another handle to the same buffer.
#[derive(Clone)]
pub struct ConversationBuffer {
    inner: Arc<Inner>,
}

impl ConversationBuffer {
    pub fn new(store: Arc<dyn QueueStore>, delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                delay,
                table: Mutex::new(Table::default()),
                generation: AtomicU64::new(0),
                tracker: TaskTracker::new(),
            }),
        }
    }

    /// Buffer one inbound message and restart the key's quiet-period timer.
    ///
    /// After [`shutdown`](Self::shutdown) has begun the message is persisted
    /// immediately, behind any write still in flight for the key, and any
    /// storage error is returned.
    pub async fn add(
        &self,
        key: ConversationKey,
        text: String,
        received_at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let message = BufferedMessage { text, received_at };
        let Some(messages) = self.inner.schedule(&key, vec![message], Placement::Append) else {
            return Ok(());
        };

        debug!(%key, "buffer closed, persisting message immediately");
        let writer = self.inner.writer(&key);
        let written = {
            let _write = writer.lock().await;
            self.inner.persist(&key, &messages).await.map(|_| ())
        };
        self.inner.release_writer(&key, writer);
        written
    }

    /// Number of messages waiting for `key`'s timer.
    pub fn buffered(&self, key: &ConversationKey) -> usize {
        self.inner
            .lock()
            .batches
            .get(key)
            .map_or(0, |b| b.messages.len())
    }

    #[cfg(test)]
    fn pending_conversations(&self) -> usize {
        self.inner.lock().batches.len()
    }

    /// Flush every batch and wait for in-flight flushes to finish.
    ///
    /// Later calls to [`add`](Self::add) bypass the debounce. Fails if some
    /// messages could not be written even after a final attempt.
    pub async fn shutdown(&self) -> Result<(), CourierError> {
        let (mut drained, keys) = {
            let mut table = self.inner.lock();
            table.closed = true;
            let drained: HashMap<_, _> = take_all(&mut table).into_iter().collect();
            let keys: HashSet<ConversationKey> = drained
                .keys()
                .chain(table.writers.keys())
                .cloned()
                .collect();
            (drained, keys)
        };
        info!(conversations = keys.len(), "draining conversation buffer");

        let mut unwritten = 0;
        for key in keys {
            let writer = self.inner.writer(&key);
            {
                let _write = writer.lock().await;
                // An in-flight flush that failed has put its older messages back.
                let mut messages = self
                    .inner
                    .lock()
                    .batches
                    .remove(&key)
                    .map(|b| b.messages)
                    .unwrap_or_default();
                messages.extend(drained.remove(&key).unwrap_or_default());
                unwritten += self.inner.persist_remaining(&key, &messages).await;
            }
            self.inner.release_writer(&key, writer);
        }

        self.inner.tracker.close();
        self.inner.tracker.wait().await;

        let leftover = take_all(&mut self.inner.lock());
        for (key, messages) in leftover {
            unwritten += self.inner.persist_remaining(&key, &messages).await;
        }

        if unwritten > 0 {
            return Err(CourierError::Storage {
                source: format!("{unwritten} buffered messages could not be persisted").into(),
            });
        }
        debug!("conversation buffer drained");
        Ok(())
    }
}

fn take_all(table: &mut Table) -> Vec<(ConversationKey, Vec<BufferedMessage>)> {
    table
        .batches
        .drain()
        .map(|(key, batch)| {
            if let Some(timer) = batch.timer {
                timer.abort();
            }
            (key, batch.messages)
        })
        .collect()
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Table> {
        // A panicking holder cannot leave the table half-updated.
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn writer(&self, key: &ConversationKey) -> Writer {
        Arc::clone(self.lock().writers.entry(key.clone()).or_default())
    }

    /// Drop the key's writer lock from the table once nobody else holds it.
    fn release_writer(&self, key: &ConversationKey, writer: Writer) {
        let mut table = self.lock();
        // One reference in the table, one here.
        if Arc::strong_count(&writer) == 2 {
            table.writers.remove(key);
        }
    }

    /// Add messages to the key's batch and (re)arm its timer.
    ///
    /// Returns the messages back when the buffer is closed and they were
    /// appended as new input; the caller persists them directly.
    fn schedule(
        self: &Arc<Self>,
        key: &ConversationKey,
        messages: Vec<BufferedMessage>,
        placement: Placement,
    ) -> Option<Vec<BufferedMessage>> {
        let mut table = self.lock();
        let closed = table.closed;
        if closed && matches!(placement, Placement::Append) {
            return Some(messages);
        }

        let batch = table
            .batches
            .entry(key.clone())
            .or_insert_with(|| PendingBatch {
                messages: Vec::new(),
                generation: 0,
                timer: None,
            });

        match placement {
            Placement::Append => batch.messages.extend(messages),
            Placement::Requeue => {
                let newer = std::mem::replace(&mut batch.messages, messages);
                batch.messages.extend(newer);
            }
        }

        if let Some(previous) = batch.timer.take() {
            previous.abort();
        }
        batch.generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;

        // Once closed, shutdown collects requeued messages itself.
        if !closed {
            let delay = match placement {
                Placement::Append => self.delay,
                Placement::Requeue => self.delay.max(MIN_RETRY_DELAY),
            };
            let task = Arc::clone(self).flush_after(key.clone(), batch.generation, delay);
            batch.timer = Some(self.tracker.spawn(task));
        }
        debug!(%key, buffered = batch.messages.len(), "timer armed");
        None
    }

    async fn flush_after(self: Arc<Self>, key: ConversationKey, generation: u64, delay: Duration) {
        tokio::time::sleep(delay).await;

        let writer = self.writer(&key);
        {
            let _write = writer.lock().await;
            self.flush(&key, generation).await;
        }
        self.release_writer(&key, writer);
    }

    /// Write the key's batch if it is still `generation`. Runs under the
    /// key's writer lock, which stays held through a requeue.
    async fn flush(self: &Arc<Self>, key: &ConversationKey, generation: u64) {
        let messages = {
            let mut table = self.lock();
            match table.batches.get(key) {
                Some(batch) if batch.generation == generation => {
                    table.batches.remove(key).map(|b| b.messages)
                }
                _ => None,
            }
        };
        let Some(messages) = messages.filter(|m| !m.is_empty()) else {
            return;
        };

        if let Err(e) = self.persist(key, &messages).await {
            warn!(%key, count = messages.len(), error = %e, "flush failed, messages re-buffered");
            self.schedule(key, messages, Placement::Requeue);
        }
    }

    async fn persist(
        &self,
        key: &ConversationKey,
        messages: &[BufferedMessage],
    ) -> Result<Vec<i64>, CourierError> {
        let entries = NewQueueEntry::from_batch(key, messages, Utc::now());
        let ids = self.store.enqueue_batch(entries).await?;
        info!(%key, count = ids.len(), first_id = ids.first().copied(), "batch flushed to queue");
        Ok(ids)
    }

    /// Persist one batch once. Returns how many messages could not be written.
    async fn persist_remaining(&self, key: &ConversationKey, messages: &[BufferedMessage]) -> usize {
        if messages.is_empty() {
            return 0;
        }
        match self.persist(key, messages).await {
            Ok(_) => 0,
            Err(e) => {
                error!(%key, count = messages.len(), error = %e, "could not persist buffered messages");
                messages.len()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use courier_test_utils::MemoryQueueStore;

    use super::*;

    const D: Duration = Duration::from_secs(5);

    fn key(user: &str) -> ConversationKey {
        ConversationKey::new("telegram", user, 1, 1)
    }

    fn setup() -> (Arc<MemoryQueueStore>, ConversationBuffer) {
        let store = Arc::new(MemoryQueueStore::new());
        let buffer = ConversationBuffer::new(store.clone(), D);
        (store, buffer)
    }

    async fn add(buffer: &ConversationBuffer, k: &ConversationKey, text: &str) {
        buffer.add(k.clone(), text.to_string(), Utc::now()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn burst_flushes_once_after_quiet_period() {
        let (store, buffer) = setup();
        let k = key("1");

        add(&buffer, &k, "a").await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        add(&buffer, &k, "b").await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        add(&buffer, &k, "c").await;

        // 4.9s after the last message: nothing written yet.
        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(store.entries().await.is_empty());
        assert_eq!(buffer.buffered(&k), 3);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.payloads_for(&k).await, vec!["a", "b", "c"]);
        assert_eq!(store.enqueue_calls().await, 1);
        assert_eq!(buffer.buffered(&k), 0);

        let entries = store.entries().await;
        assert!(entries.iter().all(|e| e.created_at == entries[0].created_at));
    }

    #[tokio::test(start_paused = true)]
    async fn messages_further_apart_flush_separately() {
        let (store, buffer) = setup();
        let k = key("1");

        add(&buffer, &k, "first").await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        add(&buffer, &k, "second").await;
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(store.payloads_for(&k).await, vec!["first", "second"]);
        assert_eq!(store.enqueue_calls().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn keys_debounce_independently() {
        let (store, buffer) = setup();
        let (k1, k2) = (key("1"), key("2"));

        add(&buffer, &k1, "one").await;
        tokio::time::sleep(Duration::from_secs(3)).await;
        add(&buffer, &k2, "two").await;
        assert_eq!(buffer.pending_conversations(), 2);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(store.payloads_for(&k1).await, vec!["one"]);
        assert!(store.payloads_for(&k2).await.is_empty());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(store.payloads_for(&k2).await, vec!["two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_is_retried_in_order() {
        let (store, buffer) = setup();
        let k = key("1");
        store.fail_next_enqueues(1).await;

        add(&buffer, &k, "a").await;
        add(&buffer, &k, "b").await;
        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert!(store.entries().await.is_empty());
        assert_eq!(buffer.buffered(&k), 2);

        // Arrives while the retry timer is pending; goes after the re-buffered pair.
        add(&buffer, &k, "c").await;
        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert_eq!(store.payloads_for(&k).await, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn add_during_inflight_flush_starts_a_new_batch() {
        let (store, buffer) = setup();
        let k = key("1");
        store.slow_next_enqueues(1, Duration::from_secs(6)).await;

        add(&buffer, &k, "a").await;
        // The flush of "a" starts at 5s and is still writing at 5.5s.
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(buffer.buffered(&k), 0);

        add(&buffer, &k, "b").await;
        assert_eq!(buffer.buffered(&k), 1);

        // "b"'s timer fired at 10.5s but waits for the write of "a".
        tokio::time::sleep(Duration::from_millis(5100)).await;
        assert!(store.entries().await.is_empty());
        assert_eq!(store.enqueue_calls().await, 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.payloads_for(&k).await, vec!["a", "b"]);
        assert_eq!(store.enqueue_calls().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_failed_flush_stays_ahead_of_later_messages() {
        let (store, buffer) = setup();
        let k = key("1");
        store.slow_next_enqueues(1, Duration::from_secs(6)).await;
        store.fail_next_enqueues(1).await;

        add(&buffer, &k, "a").await;
        tokio::time::sleep(Duration::from_millis(5500)).await;
        add(&buffer, &k, "b").await;
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(store.payloads_for(&k).await, vec!["a", "b"]);
        // The failed write, then one retry carrying both messages.
        assert_eq!(store.enqueue_calls().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_inflight_flush_before_writing_newer_messages() {
        let (store, buffer) = setup();
        let k = key("1");
        store.slow_next_enqueues(1, Duration::from_secs(6)).await;
        store.fail_next_enqueues(1).await;

        add(&buffer, &k, "a").await;
        tokio::time::sleep(Duration::from_millis(5500)).await;
        add(&buffer, &k, "b").await;

        buffer.shutdown().await.unwrap();
        assert_eq!(store.payloads_for(&k).await, vec!["a", "b"]);
        assert_eq!(buffer.pending_conversations(), 0);

        add(&buffer, &k, "c").await;
        assert_eq!(store.payloads_for(&k).await, vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_everything_without_waiting() {
        let (store, buffer) = setup();
        add(&buffer, &key("1"), "x").await;
        add(&buffer, &key("2"), "y").await;

        let started = tokio::time::Instant::now();
        buffer.shutdown().await.unwrap();
        assert!(started.elapsed() < D);

        assert_eq!(store.entries().await.len(), 2);
        assert_eq!(buffer.pending_conversations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn add_after_shutdown_persists_immediately() {
        let (store, buffer) = setup();
        buffer.shutdown().await.unwrap();

        add(&buffer, &key("1"), "late").await;
        assert_eq!(store.payloads_for(&key("1")).await, vec!["late"]);
        assert_eq!(buffer.pending_conversations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_reports_unwritable_messages() {
        let (store, buffer) = setup();
        add(&buffer, &key("1"), "doomed").await;
        store.fail_next_enqueues(2).await;

        let err = buffer.shutdown().await.unwrap_err();
        assert!(err.to_string().contains("1 buffered messages"));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_does_not_flush_new_batch() {
        let (store, buffer) = setup();
        let k = key("1");

        for i in 0..10 {
            add(&buffer, &k, &format!("m{i}")).await;
            tokio::time::sleep(Duration::from_millis(4000)).await;
        }
        assert!(store.entries().await.is_empty());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(store.entries().await.len(), 10);
        assert_eq!(store.enqueue_calls().await, 1);
    }
}
