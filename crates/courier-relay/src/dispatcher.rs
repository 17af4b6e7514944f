// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routes processed responses to the handler registered for their platform.
//!
//! Dispatch never fails the caller: an unknown platform or a failing handler
//! is logged and reported through [`DispatchOutcome`], and the queue entry
//! keeps its terminal status either way.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, info, warn};

use courier_core::{ConversationKey, CourierError, HealthStatus, PlatformHandler, PluginAdapter};

/// What happened to one dispatched response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler accepted the message.
    Delivered,
    /// No handler is registered for the entry's platform.
    Undeliverable,
    /// The handler returned an error.
    Failed(String),
}

/// Registry of outbound platform handlers keyed by platform tag.
#[derive(Default)]
pub struct PlatformDispatcher {
    handlers: DashMap<String, Arc<dyn PlatformHandler>>,
}

impl PlatformDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `platform`, replacing any previous handler.
    ///
    /// The tag must be non-empty lowercase ASCII (letters, digits, `-`, `_`)
    /// and must match the handler's own [`PlatformHandler::platform`].
    pub fn register(
        &self,
        platform: &str,
        handler: Arc<dyn PlatformHandler>,
    ) -> Result<(), CourierError> {
        validate_tag(platform)?;
        if handler.platform() != platform {
            return Err(CourierError::platform(format!(
                "handler serves `{}`, cannot register it for `{platform}`",
                handler.platform()
            )));
        }

        if self.handlers.insert(platform.to_string(), handler).is_some() {
            warn!(platform, "replaced existing platform handler");
        } else {
            info!(platform, "platform handler registered");
        }
        Ok(())
    }

    /// Registered platform tags, sorted.
    pub fn platforms(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        tags.sort();
        tags
    }

    /// Send `response` for queue entry `entry_id` to the conversation's platform.
    pub async fn dispatch(
        &self,
        key: &ConversationKey,
        entry_id: i64,
        response: &str,
    ) -> DispatchOutcome {
        // Clone out of the map so no shard lock is held across the send.
        let handler = self.handlers.get(&key.platform).map(|h| Arc::clone(h.value()));
        let Some(handler) = handler else {
            warn!(
                entry_id,
                platform = %key.platform,
                "no handler registered for platform, response not delivered"
            );
            return DispatchOutcome::Undeliverable;
        };

        match handler.send(key, response, entry_id).await {
            Ok(()) => {
                debug!(entry_id, %key, "response delivered");
                DispatchOutcome::Delivered
            }
            Err(e) => {
                error!(entry_id, %key, error = %e, "platform handler failed to deliver response");
                DispatchOutcome::Failed(e.to_string())
            }
        }
    }

    /// Aggregate health of every handler.
    pub async fn health(&self) -> HealthStatus {
        let handlers: Vec<(String, Arc<dyn PlatformHandler>)> = self
            .handlers
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut problems = Vec::new();
        for (platform, handler) in handlers {
            match handler.health_check().await {
                Ok(HealthStatus::Healthy) => {}
                Ok(HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason)) => {
                    problems.push(format!("{platform}: {reason}"));
                }
                Err(e) => problems.push(format!("{platform}: {e}")),
            }
        }

        if problems.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(problems.join("; "))
        }
    }

    /// Shut down every handler. Errors are logged, not returned.
    pub async fn shutdown(&self) {
        let handlers: Vec<(String, Arc<dyn PlatformHandler>)> = self
            .handlers
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        for (platform, handler) in handlers {
            if let Err(e) = handler.shutdown().await {
                warn!(platform = %platform, error = %e, "platform handler shutdown error");
            }
        }
    }
}

fn validate_tag(platform: &str) -> Result<(), CourierError> {
    let valid = !platform.is_empty()
        && platform
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(CourierError::platform(format!(
            "invalid platform tag `{platform}`: use lowercase letters, digits, `-` or `_`"
        )))
    }
}

#[cfg(test)]
mod tests {
    use courier_test_utils::MockPlatform;

    use super::*;

    fn key(platform: &str) -> ConversationKey {
        ConversationKey::new(platform, "u1", 1, 1)
    }

    #[test]
    fn tag_validation() {
        assert!(validate_tag("telegram").is_ok());
        assert!(validate_tag("whats_app-2").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag("Telegram").is_err());
        assert!(validate_tag("tele gram").is_err());
    }

    #[test]
    fn register_rejects_mismatched_handler() {
        let dispatcher = PlatformDispatcher::new();
        let err = dispatcher
            .register("slack", Arc::new(MockPlatform::new("telegram")))
            .unwrap_err();
        assert!(err.to_string().contains("slack"));
        assert!(dispatcher.platforms().is_empty());
    }

    #[test]
    fn register_rejects_invalid_tag() {
        let dispatcher = PlatformDispatcher::new();
        assert!(
            dispatcher
                .register("Bad Tag", Arc::new(MockPlatform::new("Bad Tag")))
                .is_err()
        );
        assert!(dispatcher.platforms().is_empty());
    }

    #[tokio::test]
    async fn dispatch_reaches_registered_handler() {
        let dispatcher = PlatformDispatcher::new();
        let telegram = Arc::new(MockPlatform::new("telegram"));
        dispatcher.register("telegram", telegram.clone()).unwrap();

        let outcome = dispatcher.dispatch(&key("telegram"), 7, "hello").await;
        assert_eq!(outcome, DispatchOutcome::Delivered);

        let sent = telegram.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "hello");
        assert_eq!(sent[0].entry_id, 7);
        assert_eq!(sent[0].recipient, key("telegram"));
    }

    #[tokio::test]
    async fn reregistration_replaces_handler() {
        let dispatcher = PlatformDispatcher::new();
        let first = Arc::new(MockPlatform::new("telegram"));
        let second = Arc::new(MockPlatform::new("telegram"));
        dispatcher.register("telegram", first.clone()).unwrap();
        dispatcher.register("telegram", second.clone()).unwrap();

        dispatcher.dispatch(&key("telegram"), 1, "hi").await;
        assert_eq!(first.sent_count().await, 0);
        assert_eq!(second.sent_count().await, 1);
        assert_eq!(dispatcher.platforms(), vec!["telegram".to_string()]);
    }

    #[tokio::test]
    async fn unknown_platform_is_undeliverable() {
        let dispatcher = PlatformDispatcher::new();
        dispatcher
            .register("telegram", Arc::new(MockPlatform::new("telegram")))
            .unwrap();
        assert_eq!(
            dispatcher.dispatch(&key("x"), 1, "lost").await,
            DispatchOutcome::Undeliverable
        );
    }

    #[tokio::test]
    async fn handler_error_is_contained() {
        let dispatcher = PlatformDispatcher::new();
        let platform = Arc::new(MockPlatform::new("sms"));
        platform.reject_sends(Some("carrier down")).await;
        dispatcher.register("sms", platform).unwrap();

        match dispatcher.dispatch(&key("sms"), 3, "text").await {
            DispatchOutcome::Failed(reason) => assert!(reason.contains("carrier down")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_is_healthy_with_mock_handlers() {
        let dispatcher = PlatformDispatcher::new();
        dispatcher
            .register("irc", Arc::new(MockPlatform::new("irc")))
            .unwrap();
        assert_eq!(dispatcher.health().await, HealthStatus::Healthy);
        dispatcher.shutdown().await;
    }
}
