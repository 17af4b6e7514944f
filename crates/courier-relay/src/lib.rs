// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Courier relay pipeline.
//!
//! Inbound text enters through [`Relay::submit`], is coalesced per
//! conversation by the [`ConversationBuffer`], persisted to the durable
//! queue, claimed by the [`QueueProcessor`] and routed back out through the
//! [`PlatformDispatcher`].
//!
//! Shutdown order matters: the buffer drains into the queue first, then the
//! processor is cancelled between entries. Entries it leaves `processing`
//! are recovered on the next start.

pub mod buffer;
pub mod dispatcher;
pub mod formatter;
pub mod processor;
pub mod shutdown;

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_config::live::{LiveSettings, RuntimeSettings};
use courier_config::model::RelayConfig;
use courier_core::{AgentProcessor, ConversationKey, CourierError, QueueStore};

pub use buffer::ConversationBuffer;
pub use dispatcher::{DispatchOutcome, PlatformDispatcher};
pub use formatter::MessageFormatter;
pub use processor::{ProcessOutcome, QueueProcessor};

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Buffer, processor and dispatcher wired to one queue store.
pub struct Relay {
    store: Arc<dyn QueueStore>,
    agent: Arc<dyn AgentProcessor>,
    buffer: ConversationBuffer,
    dispatcher: Arc<PlatformDispatcher>,
    settings: LiveSettings,
    agent_timeout: Duration,
    processor: Mutex<Option<Running>>,
}

impl Relay {
    pub fn new(
        store: Arc<dyn QueueStore>,
        agent: Arc<dyn AgentProcessor>,
        settings: LiveSettings,
        buffer_delay: Duration,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            buffer: ConversationBuffer::new(Arc::clone(&store), buffer_delay),
            dispatcher: Arc::new(PlatformDispatcher::new()),
            store,
            agent,
            settings,
            agent_timeout,
            processor: Mutex::new(None),
        }
    }

    /// Build a relay whose live settings start from `config`.
    pub fn from_config(
        store: Arc<dyn QueueStore>,
        agent: Arc<dyn AgentProcessor>,
        config: &RelayConfig,
    ) -> Self {
        Self::new(
            store,
            agent,
            LiveSettings::new(RuntimeSettings::from_config(config)),
            config.buffer_delay(),
            config.agent_timeout(),
        )
    }

    /// Registry for outbound platform handlers.
    pub fn dispatcher(&self) -> &Arc<PlatformDispatcher> {
        &self.dispatcher
    }

    /// Handle to the live settings, for the reload watcher.
    pub fn settings(&self) -> &LiveSettings {
        &self.settings
    }

    pub fn buffer(&self) -> &ConversationBuffer {
        &self.buffer
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    /// Accept one raw inbound message.
    ///
    /// The text is sanitized first; a message that is blank afterwards is
    /// dropped without reaching the buffer.
    pub async fn submit(
        &self,
        key: ConversationKey,
        text: &str,
        received_at: DateTime<Utc>,
    ) -> Result<(), CourierError> {
        let clean = MessageFormatter::sanitize_text(text);
        if clean.is_empty() {
            debug!(%key, "ignoring blank inbound message");
            return Ok(());
        }
        self.buffer.add(key, clean, received_at).await
    }

    /// Spawn the queue processor. A second call while running is ignored.
    pub fn start(&self) {
        let mut slot = self.processor.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            warn!("queue processor already running");
            return;
        }

        let processor = QueueProcessor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.agent),
            Arc::clone(&self.dispatcher),
            self.settings.clone(),
            self.agent_timeout,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(processor.run(cancel.clone()));
        *slot = Some(Running { cancel, handle });
        info!(platforms = ?self.dispatcher.platforms(), "relay started");
    }

    pub fn is_running(&self) -> bool {
        self.processor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drain the buffer into the queue, then stop the processor and the
    /// platform handlers.
    ///
    /// The processor is stopped even when draining fails; the drain error is
    /// returned afterwards.
    pub async fn shutdown(&self) -> Result<(), CourierError> {
        let drained = self.buffer.shutdown().await;

        let running = self
            .processor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "queue processor task ended abnormally");
            }
        }

        self.dispatcher.shutdown().await;
        info!("relay stopped");
        drained
    }
}
