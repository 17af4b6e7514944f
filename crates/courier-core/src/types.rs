// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the buffer, queue store, processor, and dispatcher.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Timestamp format used for every persisted time column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a UTC instant the way the queue store persists it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Current time in the persisted timestamp format.
pub fn timestamp_now() -> String {
    format_timestamp(Utc::now())
}

/// Identifies one user's conversation on one platform.
///
/// Used both as the debounce-buffer key and for routing responses back
/// to the originating platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// Platform tag, e.g. `telegram` or `console`.
    pub platform: String,
    /// The user's identifier on that platform.
    pub platform_user_id: String,
    /// Courier's own user identifier.
    pub internal_user_id: i64,
    /// The platform profile linking the two.
    pub profile_id: i64,
}

impl ConversationKey {
    pub fn new(
        platform: impl Into<String>,
        platform_user_id: impl Into<String>,
        internal_user_id: i64,
        profile_id: i64,
    ) -> Self {
        Self {
            platform: platform.into(),
            platform_user_id: platform_user_id.into(),
            internal_user_id,
            profile_id,
        }
    }
}

impl fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (user {}, profile {})",
            self.platform, self.platform_user_id, self.internal_user_id, self.profile_id
        )
    }
}

/// Processing status of a queue entry.
///
/// `Pending -> Processing -> {Success, Failed}`, with `Processing -> Pending`
/// as the retry path. `Success` and `Failed` are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl QueueStatus {
    /// Terminal entries are never mutated again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Process-wide handling mode for claimed entries.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageMode {
    /// Reply with the formatted inbound message; the agent is not called.
    #[default]
    Echo,
    /// Send the message to the agent and reply with its response.
    #[strum(to_string = "agent", serialize = "live")]
    #[serde(alias = "live")]
    Agent,
    /// Store only; nothing is sent back.
    Listen,
}

/// Outcome of an outbound delivery attempt, recorded by platform handlers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Failed,
}

/// One inbound message held by the conversation buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferedMessage {
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// A queue entry about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueueEntry {
    pub key: ConversationKey,
    pub payload: String,
    /// When the platform delivered the message (ISO 8601).
    pub received_at: String,
    /// Flush time, shared by every entry of one batch (ISO 8601).
    pub created_at: String,
}

impl NewQueueEntry {
    /// Build the entries for one flushed batch, preserving receipt order.
    pub fn from_batch(
        key: &ConversationKey,
        messages: &[BufferedMessage],
        flushed_at: DateTime<Utc>,
    ) -> Vec<Self> {
        let created_at = format_timestamp(flushed_at);
        messages
            .iter()
            .map(|m| Self {
                key: key.clone(),
                payload: m.text.clone(),
                received_at: format_timestamp(m.received_at),
                created_at: created_at.clone(),
            })
            .collect()
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub key: ConversationKey,
    pub payload: String,
    pub status: QueueStatus,
    /// Number of processing attempts started so far.
    pub attempts: u32,
    pub received_at: String,
    pub created_at: String,
    pub updated_at: String,
    /// Agent response on success, error text on failure.
    pub response: Option<String>,
    pub delivery_status: Option<DeliveryStatus>,
    pub delivery_detail: Option<String>,
}

/// Entry counts per processing status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub success: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.success + self.failed
    }

    /// Add one entry with the given status to the tally.
    pub fn count(&mut self, status: QueueStatus) {
        match status {
            QueueStatus::Pending => self.pending += 1,
            QueueStatus::Processing => self.processing += 1,
            QueueStatus::Success => self.success += 1,
            QueueStatus::Failed => self.failed += 1,
        }
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Platform,
    Agent,
    Storage,
}
