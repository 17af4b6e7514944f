// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde cannot express: positive intervals and retry
//! limits, a usable database path, and a well-formed agent endpoint.

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of stopping at the first one.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let relay = &config.relay;

    for (key, value) in [
        ("relay.queue_refresh_secs", relay.queue_refresh_secs),
        ("relay.max_retries", u64::from(relay.max_retries)),
        ("relay.agent_timeout_secs", relay.agent_timeout_secs),
        ("relay.reload_interval_secs", relay.reload_interval_secs),
    ] {
        if value < 1 {
            errors.push(ConfigError::validation(
                key,
                format!("must be at least 1, got {value}"),
            ));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path",
            "must not be empty",
        ));
    }

    if let Some(endpoint) = &config.agent.endpoint
        && !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
    {
        errors.push(ConfigError::validation(
            "agent.endpoint",
            format!("must start with http:// or https://, got `{endpoint}`"),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
