// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` command implementation.
//!
//! Reads the queue database directly and prints per-status counts plus the
//! most recent failures. Works whether or not `serve` is running.

use std::io::IsTerminal;
use std::path::Path;

use courier_config::model::CourierConfig;
use courier_core::{CourierError, QueueEntry, QueueStats, QueueStatus, QueueStore, StorageAdapter};
use courier_storage::SqliteStorage;
use serde::Serialize;

/// How many failed entries the report lists.
const RECENT_FAILURES: usize = 5;

/// One failed entry as shown in the report.
#[derive(Debug, Serialize)]
pub struct FailureSummary {
    pub id: i64,
    pub platform: String,
    pub platform_user_id: String,
    pub attempts: u32,
    pub updated_at: String,
    pub error: Option<String>,
}

impl From<QueueEntry> for FailureSummary {
    fn from(entry: QueueEntry) -> Self {
        Self {
            id: entry.id,
            platform: entry.key.platform,
            platform_user_id: entry.key.platform_user_id,
            attempts: entry.attempts,
            updated_at: entry.updated_at,
            error: entry.response,
        }
    }
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub database: String,
    pub exists: bool,
    pub stats: QueueStats,
    pub total: u64,
    pub recent_failures: Vec<FailureSummary>,
}

/// Run the `courier status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(config: &CourierConfig, json: bool, plain: bool) -> Result<(), CourierError> {
    let report = build_report(config).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| CourierError::Internal(format!("failed to render status: {e}")))?;
        println!("{rendered}");
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_report(&report, use_color);
    }
    Ok(())
}

/// Collect statistics without creating a database that does not exist yet.
pub async fn build_report(config: &CourierConfig) -> Result<StatusReport, CourierError> {
    let database = config.storage.database_path.clone();
    if !Path::new(&database).exists() {
        return Ok(StatusReport {
            database,
            exists: false,
            stats: QueueStats::default(),
            total: 0,
            recent_failures: Vec::new(),
        });
    }

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let stats = storage.stats().await?;
    let recent_failures = storage
        .recent(QueueStatus::Failed, RECENT_FAILURES)
        .await?
        .into_iter()
        .map(FailureSummary::from)
        .collect();

    Ok(StatusReport {
        database,
        exists: true,
        total: stats.total(),
        stats,
        recent_failures,
    })
}

fn print_report(report: &StatusReport, use_color: bool) {
    println!();
    println!("  courier status");
    println!("  {}", "-".repeat(35));
    println!("    Database:   {}", report.database);

    if !report.exists {
        println!("    Queue:      (no database yet)");
        println!();
        println!("  Start with: courier serve");
        println!();
        return;
    }

    let stats = &report.stats;
    println!("    Pending:    {}", stats.pending);
    println!("    Processing: {}", stats.processing);
    if use_color {
        use colored::Colorize;
        println!("    Success:    {}", stats.success.to_string().green());
        println!("    Failed:     {}", failed_count(stats.failed).red());
    } else {
        println!("    Success:    {}", stats.success);
        println!("    Failed:     {}", failed_count(stats.failed));
    }
    println!("    Total:      {}", report.total);

    if !report.recent_failures.is_empty() {
        println!();
        println!("  Recent failures");
        for failure in &report.recent_failures {
            println!(
                "    #{} {}:{} after {} attempts at {}: {}",
                failure.id,
                failure.platform,
                failure.platform_user_id,
                failure.attempts,
                failure.updated_at,
                failure.error.as_deref().unwrap_or("(no error recorded)")
            );
        }
    }
    println!();
}

fn failed_count(failed: u64) -> String {
    if failed == 0 {
        "0".to_string()
    } else {
        format!("{failed} (see below)")
    }
}
