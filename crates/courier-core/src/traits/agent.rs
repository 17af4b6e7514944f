// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Agent processor trait for the external conversational-agent service.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;

/// A black-box request/response conversational agent.
///
/// Implementations perform a single call and never retry: retry and
/// backoff belong to the queue processor.
#[async_trait]
pub trait AgentProcessor: PluginAdapter {
    /// Sends `text` to the agent and returns its reply.
    async fn process(&self, text: &str) -> Result<String, CourierError>;
}
