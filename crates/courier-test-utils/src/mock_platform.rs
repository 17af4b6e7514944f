// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock platform handler for deterministic testing.
//!
//! `MockPlatform` captures every outbound message for assertion and can be
//! told to reject sends. When given a delivery log it records outcomes the
//! same way a real platform handler does.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use courier_core::{
    AdapterType, ConversationKey, CourierError, DeliveryLog, DeliveryStatus, PlatformHandler,
    PluginAdapter,
};

/// One captured outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipient: ConversationKey,
    pub text: String,
    pub entry_id: i64,
}

/// A platform handler that records instead of sending.
pub struct MockPlatform {
    platform: String,
    sent: Arc<Mutex<Vec<SentMessage>>>,
    reject_with: Mutex<Option<String>>,
    delivery_log: Option<Arc<dyn DeliveryLog>>,
    notify: Arc<Notify>,
}

impl MockPlatform {
    pub fn new(platform: &str) -> Self {
        Self {
            platform: platform.to_string(),
            sent: Arc::new(Mutex::new(Vec::new())),
            reject_with: Mutex::new(None),
            delivery_log: None,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Record delivery outcomes in `log`.
    pub fn with_delivery_log(mut self, log: Arc<dyn DeliveryLog>) -> Self {
        self.delivery_log = Some(log);
        self
    }

    /// Reject every subsequent send with `reason`, or accept again with `None`.
    pub async fn reject_sends(&self, reason: Option<&str>) {
        *self.reject_with.lock().await = reason.map(str::to_string);
    }

    /// All messages accepted so far.
    pub async fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Wait until at least `count` messages were accepted, or `timeout` passes.
    /// Returns the messages seen so far either way.
    pub async fn wait_for_sent(&self, count: usize, timeout: Duration) -> Vec<SentMessage> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.sent.lock().await.len() >= count {
                    return;
                }
                notified.await;
            }
        };
        let _ = tokio::time::timeout(timeout, wait).await;
        self.sent_messages().await
    }

    async fn record(&self, entry_id: i64, status: DeliveryStatus, detail: Option<&str>) {
        if let Some(log) = &self.delivery_log {
            // Entries unknown to the log are fine in tests that dispatch by hand.
            let _ = log.record_delivery(entry_id, status, detail).await;
        }
    }
}

#[async_trait]
impl PluginAdapter for MockPlatform {
    fn name(&self) -> &str {
        "mock-platform"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }
}

#[async_trait]
impl PlatformHandler for MockPlatform {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn send(
        &self,
        recipient: &ConversationKey,
        text: &str,
        entry_id: i64,
    ) -> Result<(), CourierError> {
        let rejection = self.reject_with.lock().await.clone();
        if let Some(reason) = rejection {
            self.record(entry_id, DeliveryStatus::Failed, Some(&reason))
                .await;
            return Err(CourierError::platform(reason));
        }

        self.sent.lock().await.push(SentMessage {
            recipient: recipient.clone(),
            text: text.to_string(),
            entry_id,
        });
        self.record(entry_id, DeliveryStatus::Delivered, None).await;
        self.notify.notify_waiters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use courier_core::QueueStore;
    use courier_core::types::{NewQueueEntry, timestamp_now};

    use super::*;
    use crate::MemoryQueueStore;

    #[tokio::test]
    async fn captures_sends() {
        let platform = MockPlatform::new("mock");
        let key = ConversationKey::new("mock", "u1", 1, 1);
        platform.send(&key, "hello", 7).await.unwrap();

        let sent = platform.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "hello");
        assert_eq!(sent[0].entry_id, 7);
        assert_eq!(platform.platform(), "mock");
    }

    #[tokio::test]
    async fn rejected_sends_are_logged_as_failed() {
        let store = Arc::new(MemoryQueueStore::new());
        let key = ConversationKey::new("mock", "u1", 1, 1);
        let id = store
            .enqueue(NewQueueEntry {
                key: key.clone(),
                payload: "p".into(),
                received_at: timestamp_now(),
                created_at: timestamp_now(),
            })
            .await
            .unwrap();

        let platform = MockPlatform::new("mock").with_delivery_log(store.clone());
        platform.reject_sends(Some("chat not found")).await;
        assert!(platform.send(&key, "hi", id).await.is_err());
        assert_eq!(platform.sent_count().await, 0);

        let entry = store.get(id).await.unwrap().unwrap();
        assert_eq!(entry.delivery_status, Some(DeliveryStatus::Failed));
        assert_eq!(entry.delivery_detail.as_deref(), Some("chat not found"));
    }

    #[tokio::test]
    async fn wait_for_sent_returns_once_count_reached() {
        let platform = Arc::new(MockPlatform::new("mock"));
        let sender = platform.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let key = ConversationKey::new("mock", "u1", 1, 1);
            sender.send(&key, "late", 1).await.unwrap();
        });

        let sent = platform.wait_for_sent(1, Duration::from_secs(2)).await;
        assert_eq!(sent.len(), 1);
    }
}
