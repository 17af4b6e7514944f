// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock agent processor for deterministic testing.
//!
//! `MockAgent` returns scripted replies or failures in order and records
//! every request it receives.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use courier_core::{AdapterType, AgentProcessor, CourierError, PluginAdapter};

/// One scripted agent outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentReply {
    Text(String),
    Error(String),
    /// A failure retrying cannot fix, reported as a configuration error.
    Rejected(String),
    /// Never answers; the caller's timeout decides.
    Hang,
}

/// What the agent does once the script is exhausted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fallback {
    /// Reply `mock response`.
    Respond,
    /// Always fail with the given message.
    Fail(String),
}

/// An agent processor that plays back a script.
pub struct MockAgent {
    script: Arc<Mutex<VecDeque<AgentReply>>>,
    requests: Arc<Mutex<Vec<String>>>,
    fallback: Fallback,
    latency: Option<Duration>,
}

impl MockAgent {
    /// Replies `mock response` to every request.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            fallback: Fallback::Respond,
            latency: None,
        }
    }

    /// Plays `replies` in order, then falls back to `mock response`.
    pub fn with_replies(replies: Vec<AgentReply>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(replies))),
            ..Self::new()
        }
    }

    /// Fails every request with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fallback: Fallback::Fail(message.to_string()),
            ..Self::new()
        }
    }

    /// Wait `latency` before answering each request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Append a scripted outcome.
    pub async fn push(&self, reply: AgentReply) {
        self.script.lock().await.push_back(reply);
    }

    /// Every request text received so far.
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }

    pub async fn request_count(&self) -> usize {
        self.requests.lock().await.len()
    }
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockAgent {
    fn name(&self) -> &str {
        "mock-agent"
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Agent
    }
}

#[async_trait]
impl AgentProcessor for MockAgent {
    async fn process(&self, text: &str) -> Result<String, CourierError> {
        self.requests.lock().await.push(text.to_string());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let next = self.script.lock().await.pop_front();
        match next {
            Some(AgentReply::Text(reply)) => Ok(reply),
            Some(AgentReply::Error(message)) => Err(CourierError::agent(message)),
            Some(AgentReply::Rejected(message)) => Err(CourierError::Config(message)),
            Some(AgentReply::Hang) => std::future::pending().await,
            None => match &self.fallback {
                Fallback::Respond => Ok("mock response".to_string()),
                Fallback::Fail(message) => Err(CourierError::agent(message.clone())),
            },
        }
    }
}
