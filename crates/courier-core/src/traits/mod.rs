// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the Courier relay.
//!
//! Agents, platform handlers, and storage backends extend the
//! [`PluginAdapter`] base trait and use `#[async_trait]` for dynamic
//! dispatch compatibility. The queue itself is described by [`QueueStore`]
//! so the pipeline can run against SQLite or an in-memory store.

pub mod adapter;
pub mod agent;
pub mod platform;
pub mod queue;

pub use adapter::PluginAdapter;
pub use agent::AgentProcessor;
pub use platform::PlatformHandler;
pub use queue::{DeliveryLog, QueueStore, StorageAdapter};
