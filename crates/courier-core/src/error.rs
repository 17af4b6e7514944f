// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier message relay.

use thiserror::Error;

use crate::types::QueueStatus;

/// The primary error type used across all Courier adapter traits and core operations.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, rejected reloads).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Agent service errors (HTTP failure, empty or malformed response).
    #[error("agent error: {message}")]
    Agent {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Outbound platform errors (malformed recipient, send failure).
    #[error("platform error: {message}")]
    Platform {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A queue entry was asked to move out of a state it is not in.
    #[error("queue entry {id} is {actual}, expected {expected}")]
    InvalidTransition {
        id: i64,
        expected: QueueStatus,
        actual: QueueStatus,
    },

    /// `complete` was asked to finish an entry with a non-terminal status.
    #[error("cannot complete queue entry {id} as {status}: not a terminal status")]
    NotTerminal { id: i64, status: QueueStatus },

    /// The queue entry does not exist.
    #[error("queue entry {id} not found")]
    NotFound { id: i64 },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Shorthand for an agent error without an underlying source.
    pub fn agent(message: impl Into<String>) -> Self {
        Self::Agent {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a platform error without an underlying source.
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
            source: None,
        }
    }

    /// Whether the failure may succeed on a later attempt.
    ///
    /// Only agent failures and timeouts are retried by the queue processor.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Agent { .. } | Self::Timeout { .. })
    }
}
