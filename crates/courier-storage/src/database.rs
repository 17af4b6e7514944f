// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All queries are serialized through tokio-rusqlite's single background
//! thread. The [`Database`] handle is the only writer; query functions take
//! `&Database` and run their SQL inside [`tokio_rusqlite::Connection::call`].

use std::path::Path;

use courier_core::CourierError;
use tracing::{debug, info};

use crate::migrations;

/// Handle to the queue database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Open (or create) the database at `path` in WAL mode and apply migrations.
    pub async fn open(path: &str) -> Result<Self, CourierError> {
        Self::open_with_options(path, true).await
    }

    /// Open the database, choosing the journal mode explicitly.
    pub async fn open_with_options(path: &str, wal_mode: bool) -> Result<Self, CourierError> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CourierError::Storage {
                    source: Box::new(e),
                })?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| CourierError::Storage {
                source: Box::new(e),
            })?;

        let applied = conn
            .call(move |conn| {
                let journal = if wal_mode { "WAL" } else { "DELETE" };
                conn.pragma_update_and_check(None, "journal_mode", journal, |row| {
                    row.get::<_, String>(0)
                })?;
                conn.pragma_update(None, "synchronous", "NORMAL")?;
                conn.pragma_update(None, "foreign_keys", "ON")?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(migrations::run_migrations(conn))
            })
            .await
            .map_err(map_tr_err)?
            .map_err(|e| CourierError::Storage {
                source: Box::new(e),
            })?;

        if applied > 0 {
            info!(path, applied, "applied queue database migrations");
        }
        debug!(path, wal_mode, "database opened");

        Ok(Self {
            conn,
            path: path.to_string(),
        })
    }

    /// The underlying connection, for query modules.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fold the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), CourierError> {
        self.conn
            .call(|conn| conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(())))
            .await
            .map_err(map_tr_err)
    }

    /// Checkpoint and close the connection.
    pub async fn close(self) -> Result<(), CourierError> {
        self.checkpoint().await?;
        self.conn.close().await.map_err(map_tr_err)?;
        debug!(path = %self.path, "database closed");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into `CourierError::Storage`.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> CourierError {
    CourierError::Storage {
        source: Box::new(e),
    }
}
