// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The queue processor: claims pending entries one at a time, produces a
//! response according to the current [`MessageMode`], records the outcome
//! and hands successful responses to the [`PlatformDispatcher`].
//!
//! Settings are read from [`LiveSettings`] once per iteration, so a reloaded
//! mode, retry limit or refresh interval takes effect on the next entry.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use courier_config::live::{LiveSettings, RuntimeSettings};
use courier_core::{
    AgentProcessor, CourierError, MessageMode, PluginAdapter, QueueEntry, QueueStatus, QueueStore,
};

use crate::dispatcher::{DispatchOutcome, PlatformDispatcher};
use crate::formatter::MessageFormatter;

/// Result of handling one claimed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Completed `success` and handed to the dispatcher.
    Completed { id: i64, dispatch: DispatchOutcome },
    /// Listen mode: completed `success` without a response.
    Stored { id: i64 },
    /// Failed attempt, back to `pending` for another try.
    Requeued { id: i64, attempts: u32 },
    /// Retries exhausted or the failure cannot be retried; now terminal `failed`.
    Failed { id: i64, attempts: u32 },
}

/// A status write for a claimed entry that has not reached the store yet.
///
/// Kept when the store rejects the write, and retried before anything new is
/// claimed so the entry does not sit in `processing` until a restart.
#[derive(Debug)]
enum WriteBack {
    /// Mark the entry `success`, then dispatch `response` if there is one.
    Complete {
        entry: QueueEntry,
        response: Option<String>,
    },
    /// Record a failed attempt.
    Release {
        entry: QueueEntry,
        error: String,
        /// Retry limit handed to the store; 0 fails the entry outright.
        max_retries: u32,
    },
}

impl WriteBack {
    fn entry(&self) -> &QueueEntry {
        match self {
            Self::Complete { entry, .. } | Self::Release { entry, .. } => entry,
        }
    }
}

/// Single logical worker over the durable queue.
pub struct QueueProcessor {
    store: Arc<dyn QueueStore>,
    agent: Arc<dyn AgentProcessor>,
    dispatcher: Arc<PlatformDispatcher>,
    settings: LiveSettings,
    agent_timeout: Duration,
    unfinished: Mutex<Option<WriteBack>>,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn QueueStore>,
        agent: Arc<dyn AgentProcessor>,
        dispatcher: Arc<PlatformDispatcher>,
        settings: LiveSettings,
        agent_timeout: Duration,
    ) -> Self {
        Self {
            store,
            agent,
            dispatcher,
            settings,
            agent_timeout,
            unfinished: Mutex::new(None),
        }
    }

    /// Claim and handle one entry with the current settings.
    ///
    /// Returns `Ok(None)` when nothing is pending. Storage faults are returned;
    /// agent and dispatch failures are not. A status write that failed is
    /// retried on the next call before another entry is claimed.
    pub async fn process_next(&self) -> Result<Option<ProcessOutcome>, CourierError> {
        let settings = self.settings.snapshot();
        self.step(&settings).await
    }

    /// Run until `cancel` fires. Cancellation is observed between entries.
    pub async fn run(self, cancel: CancellationToken) {
        info!(agent = self.agent.name(), "queue processor started");

        while !cancel.is_cancelled() {
            let settings = self.settings.snapshot();
            match self.step(&settings).await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "queue processing iteration failed, backing off");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(settings.refresh_interval) => {}
            }
        }

        if let Some(write) = self.take_unfinished() {
            warn!(
                entry_id = write.entry().id,
                "stopping with an unwritten status, entry stays processing until recovery"
            );
        }
        info!("queue processor stopped");
    }

    async fn step(
        &self,
        settings: &RuntimeSettings,
    ) -> Result<Option<ProcessOutcome>, CourierError> {
        if let Some(write) = self.take_unfinished() {
            debug!(entry_id = write.entry().id, "retrying unwritten queue status");
            return self.finish(write, settings).await.map(Some);
        }

        let Some(entry) = self.store.claim_next().await? else {
            return Ok(None);
        };

        debug!(
            entry_id = entry.id,
            platform = %entry.key.platform,
            attempts = entry.attempts,
            mode = %settings.message_mode,
            "claimed queue entry"
        );
        if settings.debug_mode {
            info!(entry_id = entry.id, payload = %entry.payload, "processing payload");
        }

        let write = match settings.message_mode {
            MessageMode::Listen => WriteBack::Complete {
                entry,
                response: None,
            },
            MessageMode::Echo => {
                let response = MessageFormatter::format_for_agent(&entry.key, &entry.payload);
                WriteBack::Complete {
                    entry,
                    response: Some(response),
                }
            }
            MessageMode::Agent => match self.ask_agent(&entry).await {
                Ok(response) => WriteBack::Complete {
                    entry,
                    response: Some(response),
                },
                Err(cause) => {
                    // Only transient failures earn another attempt.
                    let max_retries = if cause.is_transient() {
                        settings.max_retries
                    } else {
                        0
                    };
                    WriteBack::Release {
                        entry,
                        error: cause.to_string(),
                        max_retries,
                    }
                }
            },
        };

        if let WriteBack::Complete {
            entry,
            response: Some(response),
        } = &write
        {
            if settings.debug_mode {
                info!(entry_id = entry.id, response = %response, "response ready");
            } else {
                debug!(entry_id = entry.id, response_len = response.len(), "response ready");
            }
        }

        self.finish(write, settings).await.map(Some)
    }

    /// Apply `write` to the store, then dispatch a completed response.
    ///
    /// On a storage fault the write is kept for the next iteration.
    async fn finish(
        &self,
        write: WriteBack,
        settings: &RuntimeSettings,
    ) -> Result<ProcessOutcome, CourierError> {
        let (entry, response) = match write {
            WriteBack::Release {
                entry,
                error,
                max_retries,
            } => {
                return match self.store.release(entry.id, &error, max_retries).await {
                    Ok(status) => Ok(released(&entry, &error, status, settings)),
                    Err(e) => {
                        let write = WriteBack::Release {
                            entry,
                            error,
                            max_retries,
                        };
                        Err(self.keep_unfinished(write, e))
                    }
                };
            }
            WriteBack::Complete { entry, response } => {
                let completed = self
                    .store
                    .complete(entry.id, QueueStatus::Success, response.clone())
                    .await;
                if let Err(e) = completed {
                    return Err(self.keep_unfinished(WriteBack::Complete { entry, response }, e));
                }
                (entry, response)
            }
        };

        let Some(response) = response else {
            debug!(entry_id = entry.id, "stored without response (listen mode)");
            return Ok(ProcessOutcome::Stored { id: entry.id });
        };

        let dispatch = self
            .dispatcher
            .dispatch(&entry.key, entry.id, &response)
            .await;
        Ok(ProcessOutcome::Completed {
            id: entry.id,
            dispatch,
        })
    }

    fn keep_unfinished(&self, write: WriteBack, cause: CourierError) -> CourierError {
        warn!(entry_id = write.entry().id, error = %cause, "queue status write failed, will retry");
        *self.lock_unfinished() = Some(write);
        cause
    }

    fn take_unfinished(&self) -> Option<WriteBack> {
        self.lock_unfinished().take()
    }

    fn lock_unfinished(&self) -> MutexGuard<'_, Option<WriteBack>> {
        self.unfinished.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn ask_agent(&self, entry: &QueueEntry) -> Result<String, CourierError> {
        let request = MessageFormatter::format_for_agent(&entry.key, &entry.payload);
        let reply = tokio::time::timeout(self.agent_timeout, self.agent.process(&request))
            .await
            .map_err(|_| CourierError::Timeout {
                duration: self.agent_timeout,
            })??;

        let response = MessageFormatter::sanitize_text(&reply);
        if response.is_empty() {
            return Err(CourierError::agent("agent returned an empty response"));
        }
        Ok(response)
    }
}

fn released(
    entry: &QueueEntry,
    error: &str,
    status: QueueStatus,
    settings: &RuntimeSettings,
) -> ProcessOutcome {
    if status == QueueStatus::Failed {
        error!(
            entry_id = entry.id,
            attempts = entry.attempts,
            max_retries = settings.max_retries,
            error = %error,
            "queue entry failed permanently"
        );
        ProcessOutcome::Failed {
            id: entry.id,
            attempts: entry.attempts,
        }
    } else {
        warn!(
            entry_id = entry.id,
            attempts = entry.attempts,
            max_retries = settings.max_retries,
            error = %error,
            "agent call failed, entry requeued"
        );
        ProcessOutcome::Requeued {
            id: entry.id,
            attempts: entry.attempts,
        }
    }
}
