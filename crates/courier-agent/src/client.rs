// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the agent endpoint.
//!
//! Provides [`AgentClient`], which POSTs one JSON request per message and
//! parses the reply. It makes exactly one attempt; retries are the queue
//! processor's job.

use std::time::Duration;

use courier_core::CourierError;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use tracing::debug;

use crate::types::{AgentErrorResponse, AgentRequest, AgentResponse};

/// HTTP client for one agent endpoint.
#[derive(Debug, Clone)]
pub struct AgentClient {
    client: reqwest::Client,
    endpoint: String,
}

impl AgentClient {
    /// Creates a client for `endpoint`.
    ///
    /// `api_key`, when set, is sent as a bearer token. `timeout` bounds each
    /// request at the transport level.
    pub fn new(
        endpoint: &str,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, CourierError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}")).map_err(|e| {
                CourierError::Config(format!("invalid agent API key header value: {e}"))
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CourierError::Agent {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends `message` and returns the agent's response text.
    pub async fn send(&self, message: &str) -> Result<String, CourierError> {
        let request = AgentRequest {
            message: message.to_string(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CourierError::Agent {
                message: format!("HTTP request failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, "agent response received");

        let body = response.text().await.map_err(|e| CourierError::Agent {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            let detail = serde_json::from_str::<AgentErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(CourierError::agent(format!("agent returned {status}: {detail}")));
        }

        let parsed: AgentResponse = serde_json::from_str(&body).map_err(|e| CourierError::Agent {
            message: format!("failed to parse agent response: {e}"),
            source: Some(Box::new(e)),
        })?;
        Ok(parsed.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(server: &MockServer, api_key: Option<&str>) -> AgentClient {
        AgentClient::new(
            &format!("{}/chat", server.uri()),
            api_key,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn send_posts_message_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(body_json(serde_json::json!({"message": "Hello"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "Hi there!"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let reply = test_client(&server, None).send("Hello").await.unwrap();
        assert_eq!(reply, "Hi there!");
    }

    #[tokio::test]
    async fn api_key_is_sent_as_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer secret-key"))
            .and(header("content-type", "application/json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"response": "ok"})),
            )
            .mount(&server)
            .await;

        let result = test_client(&server, Some("secret-key")).send("x").await;
        assert!(result.is_ok(), "headers should match: {result:?}");
    }

    #[tokio::test]
    async fn server_error_is_an_agent_error_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(503)
                    .set_body_json(serde_json::json!({"error": "model overloaded"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = test_client(&server, None).send("x").await.unwrap_err();
        assert!(err.is_transient());
        let msg = err.to_string();
        assert!(msg.contains("503"), "got: {msg}");
        assert!(msg.contains("model overloaded"), "got: {msg}");
    }

    #[tokio::test]
    async fn plain_text_error_body_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad input"))
            .mount(&server)
            .await;

        let err = test_client(&server, None).send("x").await.unwrap_err();
        assert!(err.to_string().contains("bad input"));
    }

    #[tokio::test]
    async fn malformed_success_body_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "wrong"})),
            )
            .mount(&server)
            .await;

        let err = test_client(&server, None).send("x").await.unwrap_err();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_agent_error() {
        let client =
            AgentClient::new("http://127.0.0.1:9/chat", None, Duration::from_secs(2)).unwrap();
        let err = client.send("x").await.unwrap_err();
        assert!(matches!(err, CourierError::Agent { .. }));
    }

    #[test]
    fn invalid_api_key_is_a_config_error() {
        let err = AgentClient::new("http://a", Some("bad\nkey"), Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CourierError::Config(_)));
    }
}
