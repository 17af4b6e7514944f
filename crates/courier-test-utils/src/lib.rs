// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MemoryQueueStore`] - In-memory queue store with injectable faults
//! - [`MockAgent`] - Agent processor playing back scripted replies
//! - [`MockPlatform`] - Platform handler capturing outbound messages
//! - [`TestHarness`] - Running relay on a temp SQLite database

pub mod harness;
pub mod memory_store;
pub mod mock_agent;
pub mod mock_platform;

pub use harness::{TEST_PLATFORM, TestHarness, TestHarnessBuilder};
pub use memory_store::MemoryQueueStore;
pub use mock_agent::{AgentReply, MockAgent};
pub use mock_platform::{MockPlatform, SentMessage};
