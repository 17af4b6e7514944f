// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the agent HTTP endpoint.

use serde::{Deserialize, Serialize};

/// Request body: the formatted message text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub message: String,
}

/// Successful response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    pub response: String,
}

/// Error body some agent services return alongside a non-2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentErrorResponse {
    pub error: String,
}
