// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the Courier binary and the full relay pipeline.
//!
//! Pipeline tests use an isolated TestHarness with temp SQLite and mock
//! adapters. Binary tests run the compiled `courier` executable against
//! temporary config files.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use courier_config::model::StorageConfig;
use courier_core::{
    ConversationKey, MessageMode, NewQueueEntry, QueueStatus, QueueStore, StorageAdapter,
};
use courier_storage::SqliteStorage;
use courier_test_utils::{AgentReply, TestHarness};

fn storage_at(path: &Path) -> SqliteStorage {
    SqliteStorage::new(StorageConfig {
        database_path: path.to_string_lossy().to_string(),
        ..StorageConfig::default()
    })
}

fn courier() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_courier"));
    cmd.env_remove("RUST_LOG");
    cmd
}

// ---- Pipeline ----

#[tokio::test]
async fn conversation_round_trip_through_agent() {
    let harness = TestHarness::builder()
        .with_agent_replies(vec![
            AgentReply::Text("first answer".into()),
            AgentReply::Text("second answer".into()),
        ])
        .build()
        .await
        .unwrap();

    assert_eq!(harness.send_message("question one").await.unwrap(), "first answer");
    assert_eq!(harness.send_message("question two").await.unwrap(), "second answer");
    assert_eq!(
        harness.agent.requests().await,
        vec!["question one", "question two"]
    );

    let stats = harness.wait_for_stats(|s| s.success == 2).await.unwrap();
    assert_eq!(stats.total(), 2);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn transient_agent_failure_is_retried_to_success() {
    let harness = TestHarness::builder()
        .with_agent_replies(vec![
            AgentReply::Error("overloaded".into()),
            AgentReply::Text("recovered".into()),
        ])
        .with_max_retries(3)
        .build()
        .await
        .unwrap();

    assert_eq!(harness.send_message("try again").await.unwrap(), "recovered");

    let sent = harness.platform.sent_messages().await;
    let entry = harness.storage.get(sent[0].entry_id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Success);
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.response.as_deref(), Some("recovered"));
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn users_are_buffered_independently() {
    let harness = TestHarness::builder()
        .with_mode(MessageMode::Echo)
        .build()
        .await
        .unwrap();

    harness.submit("alice", "from alice").await.unwrap();
    harness.submit("bob", "from bob").await.unwrap();

    let sent = harness
        .platform
        .wait_for_sent(2, Duration::from_secs(5))
        .await;
    assert_eq!(sent.len(), 2);
    let mut recipients: Vec<_> = sent
        .iter()
        .map(|m| m.recipient.platform_user_id.clone())
        .collect();
    recipients.sort();
    assert_eq!(recipients, vec!["alice", "bob"]);
    harness.shutdown().await.unwrap();
}

#[tokio::test]
async fn entry_interrupted_mid_processing_is_recovered_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let key = ConversationKey::new("telegram", "7", 3, 1);

    {
        let storage = storage_at(&path);
        storage.initialize().await.unwrap();
        storage
            .enqueue(NewQueueEntry {
                key: key.clone(),
                payload: "half done".into(),
                received_at: "2026-01-01T00:00:00.000Z".into(),
                created_at: "2026-01-01T00:00:01.000Z".into(),
            })
            .await
            .unwrap();
        let claimed = storage.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.status, QueueStatus::Processing);
        storage.close().await.unwrap();
    }

    let storage = Arc::new(storage_at(&path));
    storage.initialize().await.unwrap();
    assert_eq!(storage.recover_stale().await.unwrap(), 1);

    let stats = storage.stats().await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.processing, 0);

    let again = storage.claim_next().await.unwrap().unwrap();
    assert_eq!(again.payload, "half done");
    assert_eq!(again.key, key);
    assert_eq!(again.attempts, 2);
    storage.close().await.unwrap();
}

// ---- Binary ----

#[test]
fn config_check_rejects_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("courier.toml");
    std::fs::write(&config, "[relay]\nmessage_mod = \"echo\"\n").unwrap();

    let output = courier()
        .args(["config", "check", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn config_check_accepts_valid_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("courier.toml");
    std::fs::write(&config, "[relay]\nmessage_mode = \"listen\"\n").unwrap();

    let output = courier()
        .args(["config", "check", "--config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("config OK"));
    assert!(stdout.contains("listen"));
}

#[test]
fn status_json_reports_missing_database() {
    let dir = tempfile::tempdir().unwrap();
    let database = dir.path().join("never-created.db");
    let config = dir.path().join("courier.toml");
    std::fs::write(
        &config,
        format!("[storage]\ndatabase_path = {:?}\n", database.to_string_lossy()),
    )
    .unwrap();

    let output = courier()
        .arg("--config")
        .arg(&config)
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["exists"], false);
    assert_eq!(report["total"], 0);
    assert!(!database.exists());
}
