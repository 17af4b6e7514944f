// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Courier message relay.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and the durable work queue with
//! its delivery log.

pub mod adapter;
pub mod database;
pub mod migrations;
mod models;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
