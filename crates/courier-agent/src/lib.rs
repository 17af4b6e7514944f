// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP agent processor for the Courier relay.
//!
//! [`HttpAgent`] implements [`AgentProcessor`] by POSTing each formatted
//! message to the configured agent endpoint. [`UnconfiguredAgent`] stands in
//! when no endpoint is set, so echo and listen modes still run.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use courier_config::model::AgentConfig;
use courier_core::error::CourierError;
use courier_core::traits::{AgentProcessor, PluginAdapter};
use courier_core::types::{AdapterType, HealthStatus};
use tracing::{debug, info};

use crate::client::AgentClient;

/// Agent processor backed by an HTTP endpoint.
pub struct HttpAgent {
    client: AgentClient,
}

impl HttpAgent {
    /// Creates an agent from `[agent]` configuration.
    ///
    /// Fails when `endpoint` is unset. `timeout` bounds each HTTP request.
    pub fn new(config: &AgentConfig, timeout: Duration) -> Result<Self, CourierError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| CourierError::Config("agent.endpoint is not set".into()))?;
        let client = AgentClient::new(endpoint, config.api_key.as_deref(), timeout)?;
        info!(endpoint, authenticated = config.api_key.is_some(), "HTTP agent initialized");
        Ok(Self { client })
    }

    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }
}

#[async_trait]
impl PluginAdapter for HttpAgent {
    fn name(&self) -> &str {
        "http-agent"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Agent
    }
}

#[async_trait]
impl AgentProcessor for HttpAgent {
    async fn process(&self, text: &str) -> Result<String, CourierError> {
        debug!(request_len = text.len(), "sending message to agent");
        self.client.send(text).await
    }
}

/// Placeholder used when `agent.endpoint` is not configured.
///
/// Every call fails with a configuration error, so entries processed in
/// agent mode end up `failed` on their first attempt instead of being
/// silently dropped.
#[derive(Debug, Default)]
pub struct UnconfiguredAgent;

#[async_trait]
impl PluginAdapter for UnconfiguredAgent {
    fn name(&self) -> &str {
        "unconfigured-agent"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Agent
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Unhealthy("agent.endpoint is not set".into()))
    }
}

#[async_trait]
impl AgentProcessor for UnconfiguredAgent {
    async fn process(&self, _text: &str) -> Result<String, CourierError> {
        Err(CourierError::Config(
            "no agent endpoint configured; set agent.endpoint or use echo/listen mode".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn missing_endpoint_is_rejected() {
        let result = HttpAgent::new(&AgentConfig::default(), Duration::from_secs(1));
        assert!(matches!(result, Err(CourierError::Config(_))));
    }

    #[test]
    fn http_agent_identifies_as_agent_adapter() {
        let agent = HttpAgent::new(
            &AgentConfig {
                endpoint: Some("http://localhost:8080/chat".into()),
                api_key: None,
            },
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(agent.name(), "http-agent");
        assert_eq!(agent.adapter_type(), AdapterType::Agent);
        assert_eq!(agent.endpoint(), "http://localhost:8080/chat");
    }

    #[tokio::test]
    async fn process_round_trips_through_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "pong"})),
            )
            .mount(&server)
            .await;

        let agent = HttpAgent::new(
            &AgentConfig {
                endpoint: Some(server.uri()),
                api_key: Some("k".into()),
            },
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(agent.process("ping").await.unwrap(), "pong");
    }

    #[tokio::test]
    async fn unconfigured_agent_always_fails() {
        let agent = UnconfiguredAgent;
        let err = agent.process("hello").await.unwrap_err();
        // Retrying cannot help until the configuration changes.
        assert!(!err.is_transient());
        assert!(matches!(err, CourierError::Config(_)));
        assert!(matches!(
            agent.health_check().await.unwrap(),
            HealthStatus::Unhealthy(_)
        ));
    }
}
