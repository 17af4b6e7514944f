// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier message relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use courier_core::MessageMode;
use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Buffering, retry and processing behavior.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Agent service connection settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Relay pipeline configuration.
///
/// Every field except `buffer_delay_secs`, `agent_timeout_secs`,
/// `reload_interval_secs` and `log_level` is re-read on reload.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// How claimed entries are handled: `echo`, `agent` (alias `live`) or `listen`.
    #[serde(default)]
    pub message_mode: MessageMode,

    /// Seconds the processor sleeps when the queue is empty.
    #[serde(default = "default_queue_refresh_secs")]
    pub queue_refresh_secs: u64,

    /// Processing attempts before an entry is marked failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Log full payloads and responses.
    #[serde(default)]
    pub debug_mode: bool,

    /// Quiet period before a conversation's buffered messages are flushed.
    #[serde(default = "default_buffer_delay_secs")]
    pub buffer_delay_secs: u64,

    /// Upper bound on a single agent call.
    #[serde(default = "default_agent_timeout_secs")]
    pub agent_timeout_secs: u64,

    /// How often the config file's modification time is polled.
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            message_mode: MessageMode::default(),
            queue_refresh_secs: default_queue_refresh_secs(),
            max_retries: default_max_retries(),
            debug_mode: false,
            buffer_delay_secs: default_buffer_delay_secs(),
            agent_timeout_secs: default_agent_timeout_secs(),
            reload_interval_secs: default_reload_interval_secs(),
            log_level: default_log_level(),
        }
    }
}

impl RelayConfig {
    pub fn buffer_delay(&self) -> Duration {
        Duration::from_secs(self.buffer_delay_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_secs(self.reload_interval_secs)
    }
}

fn default_queue_refresh_secs() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_buffer_delay_secs() -> u64 {
    5
}

fn default_agent_timeout_secs() -> u64 {
    120
}

fn default_reload_interval_secs() -> u64 {
    2
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Agent service configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// HTTP endpoint receiving `{"message": ...}` requests.
    /// When unset, agent mode fails every entry.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent with each request.
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL mode for concurrent reads.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("courier").join("courier.db"))
        .and_then(|p| p.to_str().map(String::from))
        .unwrap_or_else(|| "courier.db".to_string())
}

fn default_wal_mode() -> bool {
    true
}
