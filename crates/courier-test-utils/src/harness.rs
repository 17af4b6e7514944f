// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a running relay on a temp SQLite database with a
//! scripted [`MockAgent`] and a [`MockPlatform`] registered under
//! [`TEST_PLATFORM`]. `send_message()` drives one message through the whole
//! pipeline and returns what the platform received.

use std::sync::Arc;
use std::time::Duration;

use courier_config::live::{LiveSettings, RuntimeSettings};
use courier_config::model::StorageConfig;
use courier_core::{
    ConversationKey, CourierError, MessageMode, QueueStats, QueueStore, StorageAdapter,
};
use courier_relay::Relay;
use courier_storage::SqliteStorage;

use crate::mock_agent::{AgentReply, MockAgent};
use crate::mock_platform::MockPlatform;

/// Platform tag the harness registers its mock handler under.
pub const TEST_PLATFORM: &str = "test";

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    mode: MessageMode,
    max_retries: u32,
    replies: Vec<AgentReply>,
    failing_agent: Option<String>,
    buffer_delay: Duration,
    agent_timeout: Duration,
    response_timeout: Duration,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            mode: MessageMode::Agent,
            max_retries: 3,
            replies: Vec::new(),
            failing_agent: None,
            buffer_delay: Duration::from_millis(20),
            agent_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_mode(mut self, mode: MessageMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Scripted agent outcomes, played in order.
    pub fn with_agent_replies(mut self, replies: Vec<AgentReply>) -> Self {
        self.replies = replies;
        self
    }

    /// Make every agent call fail with `message`.
    pub fn with_failing_agent(mut self, message: &str) -> Self {
        self.failing_agent = Some(message.to_string());
        self
    }

    pub fn with_buffer_delay(mut self, delay: Duration) -> Self {
        self.buffer_delay = delay;
        self
    }

    pub fn with_agent_timeout(mut self, timeout: Duration) -> Self {
        self.agent_timeout = timeout;
        self
    }

    /// How long `send_message` waits for the platform to receive a reply.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Build the harness and start the queue processor.
    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| CourierError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        }));
        storage.initialize().await?;

        let agent = Arc::new(match self.failing_agent {
            Some(message) => MockAgent::failing(&message),
            None => MockAgent::with_replies(self.replies),
        });
        let platform =
            Arc::new(MockPlatform::new(TEST_PLATFORM).with_delivery_log(storage.clone()));

        let settings = LiveSettings::new(RuntimeSettings {
            message_mode: self.mode,
            refresh_interval: POLL_INTERVAL,
            max_retries: self.max_retries,
            debug_mode: false,
        });
        let relay = Relay::new(
            storage.clone(),
            agent.clone(),
            settings,
            self.buffer_delay,
            self.agent_timeout,
        );
        relay.dispatcher().register(TEST_PLATFORM, platform.clone())?;
        relay.start();

        Ok(TestHarness {
            agent,
            platform,
            storage,
            relay,
            response_timeout: self.response_timeout,
            _temp_dir: temp_dir,
        })
    }
}

/// A running relay with mock adapters and temp storage.
pub struct TestHarness {
    /// The scripted agent.
    pub agent: Arc<MockAgent>,
    /// The mock platform handler, registered as [`TEST_PLATFORM`].
    pub platform: Arc<MockPlatform>,
    /// SQLite storage (temp DB, removed on drop).
    pub storage: Arc<SqliteStorage>,
    pub relay: Relay,
    response_timeout: Duration,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Conversation key for user `user` on the test platform.
    pub fn key(user: &str) -> ConversationKey {
        ConversationKey::new(TEST_PLATFORM, user, 1, 1)
    }

    /// Submit `text` as user `user` without waiting for a reply.
    pub async fn submit(&self, user: &str, text: &str) -> Result<(), CourierError> {
        self.relay
            .submit(Self::key(user), text, chrono::Utc::now())
            .await
    }

    /// Send one message and return the text the platform receives for it.
    pub async fn send_message(&self, text: &str) -> Result<String, CourierError> {
        let before = self.platform.sent_count().await;
        self.submit("user-1", text).await?;

        let sent = self
            .platform
            .wait_for_sent(before + 1, self.response_timeout)
            .await;
        sent.get(before)
            .map(|m| m.text.clone())
            .ok_or(CourierError::Timeout {
                duration: self.response_timeout,
            })
    }

    /// Poll queue statistics until `done` holds or the response timeout passes.
    pub async fn wait_for_stats<F>(&self, done: F) -> Result<QueueStats, CourierError>
    where
        F: Fn(&QueueStats) -> bool,
    {
        let deadline = tokio::time::Instant::now() + self.response_timeout;
        loop {
            let stats = self.storage.stats().await?;
            if done(&stats) {
                return Ok(stats);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(CourierError::Timeout {
                    duration: self.response_timeout,
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Drain the relay, stop the processor and checkpoint the database.
    pub async fn shutdown(&self) -> Result<(), CourierError> {
        self.relay.shutdown().await?;
        self.storage.close().await
    }
}

#[cfg(test)]
mod tests {
    use courier_core::QueueStatus;

    use super::*;

    #[tokio::test]
    async fn builder_creates_working_environment() {
        let harness = TestHarness::builder().build().await.unwrap();
        assert_eq!(harness.storage.stats().await.unwrap().total(), 0);
        assert!(harness.relay.is_running());
        harness.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn send_message_returns_agent_reply() {
        let harness = TestHarness::builder()
            .with_agent_replies(vec![AgentReply::Text("custom response".into())])
            .build()
            .await
            .unwrap();

        let reply = harness.send_message("hello").await.unwrap();
        assert_eq!(reply, "custom response");
        assert_eq!(
            harness.agent.requests().await,
            vec!["[Platform: test, User ID: user-1] hello".to_string()]
        );
        harness.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn reply_is_persisted_with_delivery_status() {
        let harness = TestHarness::builder()
            .with_mode(MessageMode::Echo)
            .build()
            .await
            .unwrap();

        harness.send_message("store me").await.unwrap();
        let id = harness.platform.sent_messages().await[0].entry_id;

        let entry = harness.storage.get(id).await.unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Success);
        assert_eq!(entry.payload, "store me");
        assert_eq!(
            entry.delivery_status,
            Some(courier_core::DeliveryStatus::Delivered)
        );
        harness.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn temp_db_is_unique_per_harness() {
        let h1 = TestHarness::builder()
            .with_mode(MessageMode::Echo)
            .build()
            .await
            .unwrap();
        let h2 = TestHarness::builder().build().await.unwrap();

        h1.send_message("msg1").await.unwrap();
        assert_eq!(h1.storage.stats().await.unwrap().total(), 1);
        assert_eq!(h2.storage.stats().await.unwrap().total(), 0);

        h1.shutdown().await.unwrap();
        h2.shutdown().await.unwrap();
    }
}
