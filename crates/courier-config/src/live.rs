// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live-reloadable runtime settings.
//!
//! [`LiveSettings`] is a shared, atomically swappable snapshot that the queue
//! processor reads once per iteration. [`SettingsWatcher`] polls the config
//! file's modification time and swaps in a freshly validated snapshot when it
//! changes. An invalid reload is logged and the previous snapshot stays.
//! File reads run on the blocking pool so the runtime threads never wait on
//! disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use courier_core::MessageMode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diagnostic::ConfigError;
use crate::model::{CourierConfig, RelayConfig};

/// The subset of configuration the processor re-reads on every iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub message_mode: MessageMode,
    /// Sleep between polls of an empty queue, and the back-off after a storage fault.
    pub refresh_interval: Duration,
    pub max_retries: u32,
    pub debug_mode: bool,
}

impl RuntimeSettings {
    pub fn from_config(relay: &RelayConfig) -> Self {
        Self {
            message_mode: relay.message_mode,
            refresh_interval: Duration::from_secs(relay.queue_refresh_secs),
            max_retries: relay.max_retries,
            debug_mode: relay.debug_mode,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}

/// Shared handle to the current [`RuntimeSettings`]. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    inner: Arc<ArcSwap<RuntimeSettings>>,
}

impl LiveSettings {
    pub fn new(settings: RuntimeSettings) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(settings)),
        }
    }

    /// The latest settings. Later swaps do not affect a snapshot already taken.
    pub fn snapshot(&self) -> Arc<RuntimeSettings> {
        self.inner.load_full()
    }

    pub fn replace(&self, settings: RuntimeSettings) {
        self.inner.store(Arc::new(settings));
    }
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self::new(RuntimeSettings::default())
    }
}

type Loader = Arc<dyn Fn() -> Result<CourierConfig, Vec<ConfigError>> + Send + Sync>;

/// Polls a config file's modification time and reloads settings on change.
pub struct SettingsWatcher {
    path: PathBuf,
    settings: LiveSettings,
    interval: Duration,
    last_modified: Option<SystemTime>,
    loader: Loader,
}

impl SettingsWatcher {
    /// Watch `path`, reloading from that file (plus defaults and env) on change.
    ///
    /// The file's current modification time is the baseline; only later
    /// changes trigger a reload.
    pub async fn new(path: impl Into<PathBuf>, settings: LiveSettings, interval: Duration) -> Self {
        let path = path.into();
        let last_modified = modified_at(&path).await;
        let reload_path = path.clone();
        Self {
            path,
            settings,
            interval,
            last_modified,
            loader: Arc::new(move || crate::load_and_validate_path(&reload_path)),
        }
    }

    /// Replace how the configuration is re-read when the file changes.
    ///
    /// `serve` uses this to reload the whole file hierarchy rather than the
    /// watched file alone.
    pub fn with_loader<F>(mut self, loader: F) -> Self
    where
        F: Fn() -> Result<CourierConfig, Vec<ConfigError>> + Send + Sync + 'static,
    {
        self.loader = Arc::new(loader);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the file once. Returns `true` when new settings were applied.
    pub async fn poll(&mut self) -> bool {
        let modified = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta.modified().ok(),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "config file not readable");
                return false;
            }
        };

        if modified.is_none() || modified == self.last_modified {
            return false;
        }
        // Recorded before reloading so a broken file is reported once per edit.
        self.last_modified = modified;

        let loader = Arc::clone(&self.loader);
        let loaded = match tokio::task::spawn_blocking(move || loader()).await {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "config reload task failed");
                return false;
            }
        };

        match loaded {
            Ok(config) => {
                let next = RuntimeSettings::from_config(&config.relay);
                let previous = self.settings.snapshot();
                if *previous == next {
                    debug!(path = %self.path.display(), "config file touched, settings unchanged");
                    return false;
                }
                info!(
                    message_mode = %next.message_mode,
                    refresh_secs = next.refresh_interval.as_secs(),
                    max_retries = next.max_retries,
                    debug_mode = next.debug_mode,
                    "runtime settings reloaded"
                );
                self.settings.replace(next);
                true
            }
            Err(errors) => {
                for error in &errors {
                    warn!(path = %self.path.display(), %error, "rejected config reload");
                }
                false
            }
        }
    }

    /// Poll until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!(path = %self.path.display(), interval = ?self.interval, "settings watcher started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    self.poll().await;
                }
            }
        }
        debug!("settings watcher stopped");
    }
}

async fn modified_at(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .ok()
}
