// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier serve` command implementation.
//!
//! Opens SQLite storage, returns entries interrupted by a previous run to
//! `pending`, wires the relay to the configured agent and the console
//! platform, and runs until SIGINT or SIGTERM.
//!
//! Shutdown order: console input stops, the buffer drains into the queue,
//! the processor stops between entries, the reload watcher stops, and the
//! database is checkpointed.

use std::path::PathBuf;
use std::sync::Arc;

use courier_agent::{HttpAgent, UnconfiguredAgent};
use courier_config::SettingsWatcher;
use courier_config::model::CourierConfig;
use courier_core::{
    AgentProcessor, CourierError, HealthStatus, MessageMode, PluginAdapter, QueueStore,
    StorageAdapter,
};
use courier_relay::{PlatformDispatcher, Relay, shutdown};
use courier_storage::SqliteStorage;
use tracing::{debug, error, info, warn};

use crate::console::{self, CONSOLE_PLATFORM, ConsolePlatform};

/// Runs the `courier serve` command.
///
/// `config_path` is the file given with `--config`; without it the standard
/// hierarchy is reloaded whenever the highest-precedence file changes.
pub async fn run_serve(
    config: CourierConfig,
    config_path: Option<PathBuf>,
) -> Result<(), CourierError> {
    init_tracing(&config.relay.log_level);

    info!(
        mode = %config.relay.message_mode,
        database = %config.storage.database_path,
        "starting courier serve"
    );

    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;

    let recovered = storage.recover_stale().await?;
    if recovered > 0 {
        warn!(recovered, "returned entries interrupted by the last run to pending");
    }

    let agent = build_agent(&config)?;
    let relay = Arc::new(Relay::from_config(storage.clone(), agent.clone(), &config.relay));
    relay
        .dispatcher()
        .register(CONSOLE_PLATFORM, Arc::new(ConsolePlatform::new(storage.clone())))?;
    check_health(relay.dispatcher(), agent.as_ref()).await;

    let cancel = shutdown::install_signal_handler();

    let watcher = match &config_path {
        Some(path) => SettingsWatcher::new(
            path,
            relay.settings().clone(),
            config.relay.reload_interval(),
        )
        .await,
        None => SettingsWatcher::new(
            courier_config::watched_config_path(),
            relay.settings().clone(),
            config.relay.reload_interval(),
        )
        .await
        .with_loader(courier_config::load_and_validate),
    };
    info!(path = %watcher.path().display(), "watching config for changes");
    let watcher_cancel = cancel.child_token();
    let watcher_task = tokio::spawn(watcher.run(watcher_cancel.clone()));

    relay.start();
    let inbound = tokio::spawn(console::run_inbound(relay.clone(), cancel.child_token()));

    info!("courier is running, press Ctrl+C to stop");
    cancel.cancelled().await;

    if let Err(e) = inbound.await {
        warn!(error = %e, "console inbound task ended abnormally");
    }
    let drained = relay.shutdown().await;
    if let Err(e) = &drained {
        error!(error = %e, "buffer drain incomplete");
    }

    watcher_cancel.cancel();
    if let Err(e) = watcher_task.await {
        warn!(error = %e, "settings watcher task ended abnormally");
    }

    storage.close().await?;
    info!("courier stopped");
    drained
}

fn build_agent(config: &CourierConfig) -> Result<Arc<dyn AgentProcessor>, CourierError> {
    if config.agent.endpoint.is_some() {
        return Ok(Arc::new(HttpAgent::new(
            &config.agent,
            config.relay.agent_timeout(),
        )?));
    }

    if config.relay.message_mode == MessageMode::Agent {
        warn!("message_mode is agent but agent.endpoint is not set; entries will fail");
    }
    Ok(Arc::new(UnconfiguredAgent))
}

/// Log the startup health of the agent and every platform handler.
///
/// Problems are warnings only; the relay still starts. Returns whether
/// everything reported healthy.
async fn check_health(dispatcher: &PlatformDispatcher, agent: &dyn AgentProcessor) -> bool {
    let agent_health = agent
        .health_check()
        .await
        .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
    let platform_health = dispatcher.health().await;

    let mut healthy = true;
    for (component, status) in [(agent.name(), agent_health), ("platforms", platform_health)] {
        match status {
            HealthStatus::Healthy => debug!(component, "healthy"),
            HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                warn!(component, %reason, "not healthy at startup");
                healthy = false;
            }
        }
    }
    if healthy {
        info!(platforms = ?dispatcher.platforms(), "agent and platform handlers healthy");
    }
    healthy
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise Courier's crates log at `log_level`
/// and everything else at `warn`. Logs go to stderr so stdout stays free for
/// console responses.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_falls_back_without_endpoint() {
        let agent = build_agent(&CourierConfig::default()).unwrap();
        assert_eq!(agent.name(), "unconfigured-agent");
    }

    #[tokio::test]
    async fn health_check_flags_missing_agent_endpoint() {
        let dispatcher = PlatformDispatcher::new();
        let store = Arc::new(courier_test_utils::MemoryQueueStore::new());
        dispatcher
            .register(CONSOLE_PLATFORM, Arc::new(ConsolePlatform::new(store)))
            .unwrap();

        let unconfigured = build_agent(&CourierConfig::default()).unwrap();
        assert!(!check_health(&dispatcher, unconfigured.as_ref()).await);

        let mut config = CourierConfig::default();
        config.agent.endpoint = Some("http://127.0.0.1:8080/chat".into());
        let http = build_agent(&config).unwrap();
        assert!(check_health(&dispatcher, http.as_ref()).await);
    }

    #[test]
    fn agent_uses_http_with_endpoint() {
        let mut config = CourierConfig::default();
        config.agent.endpoint = Some("http://127.0.0.1:8080/chat".into());
        let agent = build_agent(&config).unwrap();
        assert_eq!(agent.name(), "http-agent");
    }
}
