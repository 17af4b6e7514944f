// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text normalization and the metadata prefix sent to the agent.

use courier_core::ConversationKey;

/// Stateless message formatting helpers.
pub struct MessageFormatter;

impl MessageFormatter {
    /// Replace line breaks and characters outside the Basic Multilingual
    /// Plane with spaces, collapse whitespace runs and trim.
    pub fn sanitize_text(text: &str) -> String {
        let replaced: String = text
            .chars()
            .map(|c| {
                if c == '\n' || c == '\r' || u32::from(c) > 0xFFFF {
                    ' '
                } else {
                    c
                }
            })
            .collect();
        replaced.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// Prefix `payload` with the sender's platform identity:
    /// `[Platform: telegram, User ID: 42] hello`.
    pub fn format_for_agent(key: &ConversationKey, payload: &str) -> String {
        format!(
            "[Platform: {}, User ID: {}] {}",
            key.platform, key.platform_user_id, payload
        )
    }
}
