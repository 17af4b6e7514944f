// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `console` platform: stdin lines in, responses out on stdout.
//!
//! Every line read from stdin is one inbound message for [`console_key`].
//! Responses are printed and their delivery recorded in the queue's
//! delivery log.

use std::io::BufRead;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::{
    AdapterType, ConversationKey, CourierError, DeliveryLog, DeliveryStatus, PlatformHandler,
    PluginAdapter,
};
use courier_relay::Relay;

/// Platform tag of the console handler.
pub const CONSOLE_PLATFORM: &str = "console";

/// The single local conversation the console serves.
pub fn console_key() -> ConversationKey {
    ConversationKey::new(CONSOLE_PLATFORM, "local", 1, 1)
}

type Printer = Box<dyn Fn(&str) + Send + Sync>;

/// Outbound handler printing responses to stdout.
pub struct ConsolePlatform {
    log: Arc<dyn DeliveryLog>,
    printer: Printer,
}

impl ConsolePlatform {
    pub fn new(log: Arc<dyn DeliveryLog>) -> Self {
        Self {
            log,
            printer: Box::new(|line| println!("{line}")),
        }
    }

    /// Route printed lines somewhere other than stdout.
    pub fn with_printer<F>(mut self, printer: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.printer = Box::new(printer);
        self
    }

    async fn record(&self, entry_id: i64, status: DeliveryStatus, detail: Option<&str>) {
        if let Err(e) = self.log.record_delivery(entry_id, status, detail).await {
            warn!(entry_id, error = %e, "could not record console delivery");
        }
    }
}

#[async_trait]
impl PluginAdapter for ConsolePlatform {
    fn name(&self) -> &str {
        "console"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Platform
    }
}

#[async_trait]
impl PlatformHandler for ConsolePlatform {
    fn platform(&self) -> &str {
        CONSOLE_PLATFORM
    }

    async fn send(
        &self,
        recipient: &ConversationKey,
        text: &str,
        entry_id: i64,
    ) -> Result<(), CourierError> {
        if recipient.platform_user_id != console_key().platform_user_id {
            let reason = format!("unknown console recipient `{}`", recipient.platform_user_id);
            self.record(entry_id, DeliveryStatus::Failed, Some(&reason))
                .await;
            return Err(CourierError::platform(reason));
        }

        (self.printer)(&format!("< {text}"));
        self.record(entry_id, DeliveryStatus::Delivered, None).await;
        Ok(())
    }
}

/// Read stdin on a dedicated thread and forward each line.
///
/// A blocking read cannot be cancelled, so the thread is detached rather
/// than tied to the runtime; it ends at EOF or when the receiver is gone.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(64);
    let spawned = std::thread::Builder::new()
        .name("console-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start console reader, console input disabled");
    }
    rx
}

/// Submit console lines to the relay until `cancel` fires or stdin closes.
pub async fn run_inbound(relay: Arc<Relay>, cancel: CancellationToken) {
    let lines = spawn_stdin_reader();
    forward_lines(relay, lines, cancel).await;
}

async fn forward_lines(
    relay: Arc<Relay>,
    mut lines: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    info!("console inbound ready, type a message and press enter");
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.recv() => line,
        };
        let Some(line) = line else {
            debug!("console input closed");
            break;
        };
        if let Err(e) = relay.submit(console_key(), &line, Utc::now()).await {
            warn!(error = %e, "could not accept console message");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use courier_config::live::{LiveSettings, RuntimeSettings};
    use courier_core::{MessageMode, QueueStore};
    use courier_test_utils::{MemoryQueueStore, MockAgent};

    use super::*;

    fn capture() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Send + Sync + 'static) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        (lines, move |line: &str| sink.lock().unwrap().push(line.to_string()))
    }

    #[tokio::test]
    async fn send_prints_and_records_delivery() {
        let store = Arc::new(MemoryQueueStore::new());
        let id = store
            .enqueue(courier_core::NewQueueEntry {
                key: console_key(),
                payload: "hi".into(),
                received_at: "2026-01-01T00:00:00.000Z".into(),
                created_at: "2026-01-01T00:00:00.000Z".into(),
            })
            .await
            .unwrap();

        let (printed, printer) = capture();
        let console = ConsolePlatform::new(store.clone()).with_printer(printer);
        console.send(&console_key(), "hello back", id).await.unwrap();

        assert_eq!(*printed.lock().unwrap(), vec!["< hello back".to_string()]);
        let entry = store.get(id).await.unwrap().unwrap();
        assert_eq!(entry.delivery_status, Some(DeliveryStatus::Delivered));
    }

    #[tokio::test]
    async fn foreign_recipient_is_a_failed_delivery() {
        let store = Arc::new(MemoryQueueStore::new());
        let id = store
            .enqueue(courier_core::NewQueueEntry {
                key: console_key(),
                payload: "hi".into(),
                received_at: "2026-01-01T00:00:00.000Z".into(),
                created_at: "2026-01-01T00:00:00.000Z".into(),
            })
            .await
            .unwrap();

        let (printed, printer) = capture();
        let console = ConsolePlatform::new(store.clone()).with_printer(printer);
        let stranger = ConversationKey::new(CONSOLE_PLATFORM, "remote", 9, 9);
        assert!(console.send(&stranger, "nope", id).await.is_err());

        assert!(printed.lock().unwrap().is_empty());
        let entry = store.get(id).await.unwrap().unwrap();
        assert_eq!(entry.delivery_status, Some(DeliveryStatus::Failed));
        assert!(entry.delivery_detail.unwrap().contains("remote"));
    }

    #[tokio::test]
    async fn lines_become_buffered_messages_until_input_closes() {
        let store = Arc::new(MemoryQueueStore::new());
        let relay = Arc::new(Relay::new(
            store.clone(),
            Arc::new(MockAgent::new()),
            LiveSettings::new(RuntimeSettings {
                message_mode: MessageMode::Listen,
                ..RuntimeSettings::default()
            }),
            Duration::from_secs(60),
            Duration::from_secs(1),
        ));

        let (tx, rx) = mpsc::channel(8);
        tx.send("first line".to_string()).await.unwrap();
        tx.send("   ".to_string()).await.unwrap();
        tx.send("second line".to_string()).await.unwrap();
        drop(tx);

        forward_lines(relay.clone(), rx, CancellationToken::new()).await;
        assert_eq!(relay.buffer().buffered(&console_key()), 2);

        relay.shutdown().await.unwrap();
        assert_eq!(
            store.payloads_for(&console_key()).await,
            vec!["first line", "second line"]
        );
    }

    #[tokio::test]
    async fn cancel_stops_forwarding() {
        let relay = Arc::new(Relay::new(
            Arc::new(MemoryQueueStore::new()),
            Arc::new(MockAgent::new()),
            LiveSettings::default(),
            Duration::from_secs(60),
            Duration::from_secs(1),
        ));
        let (_tx, rx) = mpsc::channel::<String>(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), forward_lines(relay, rx, cancel))
            .await
            .expect("forwarding should stop on cancel");
    }
}
