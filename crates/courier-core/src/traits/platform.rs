// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound handler trait for messaging platform integrations.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::ConversationKey;

/// Delivers processed responses to one messaging platform.
///
/// Handlers are registered with the dispatcher under their platform tag.
/// A handler records the outcome of each delivery itself (see
/// [`DeliveryLog`](crate::DeliveryLog)); the dispatcher only logs.
#[async_trait]
pub trait PlatformHandler: PluginAdapter {
    /// The platform tag this handler serves, e.g. `telegram`.
    fn platform(&self) -> &str;

    /// Sends `text` to `recipient` in reply to queue entry `entry_id`.
    async fn send(
        &self,
        recipient: &ConversationKey,
        text: &str,
        entry_id: i64,
    ) -> Result<(), CourierError>;
}
