// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier config` subcommands.
//!
//! Loading already rendered any diagnostics and exited, so by the time these
//! run the configuration is known to be valid.

use std::path::Path;

use courier_config::model::CourierConfig;
use courier_core::CourierError;

const MASK: &str = "********";

/// `courier config check`: report where the configuration came from.
pub fn run_check(config: &CourierConfig, explicit: Option<&Path>) -> Result<(), CourierError> {
    let source = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(courier_config::watched_config_path);
    let origin = if source.exists() {
        source.display().to_string()
    } else {
        "built-in defaults".to_string()
    };

    println!("config OK ({origin})");
    println!("  message_mode: {}", config.relay.message_mode);
    println!("  database:     {}", config.storage.database_path);
    println!(
        "  agent:        {}",
        config.agent.endpoint.as_deref().unwrap_or("(not configured)")
    );
    Ok(())
}

/// `courier config show`: print the resolved configuration.
pub fn run_show(config: &CourierConfig) -> Result<(), CourierError> {
    print!("{}", render_masked(config)?);
    Ok(())
}

fn render_masked(config: &CourierConfig) -> Result<String, CourierError> {
    let mut shown = config.clone();
    if shown.agent.api_key.is_some() {
        shown.agent.api_key = Some(MASK.to_string());
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| CourierError::Config(format!("failed to render configuration: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_api_key() {
        let mut config = CourierConfig::default();
        config.agent.api_key = Some("super-secret".into());
        let rendered = render_masked(&config).unwrap();
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains(MASK));
        assert!(rendered.contains("message_mode = \"echo\""));
    }

    #[test]
    fn shown_config_parses_back() {
        let config = CourierConfig::default();
        let rendered = render_masked(&config).unwrap();
        let reparsed = courier_config::load_config_from_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }
}
