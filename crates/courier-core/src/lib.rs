// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier message relay.
//!
//! This crate provides the trait definitions, error type, and domain types
//! shared by the conversation buffer, the durable queue, the queue
//! processor, and the platform dispatcher.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::CourierError;
pub use types::{
    AdapterType, BufferedMessage, ConversationKey, DeliveryStatus, HealthStatus, MessageMode,
    NewQueueEntry, QueueEntry, QueueStats, QueueStatus,
};

pub use traits::{
    AgentProcessor, DeliveryLog, PlatformHandler, PluginAdapter, QueueStore, StorageAdapter,
};
