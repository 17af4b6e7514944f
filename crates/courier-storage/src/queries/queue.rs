// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Queue operations for crash-safe message processing.
//!
//! Every state change runs inside one IMMEDIATE transaction on the single
//! writer thread, so a status check and the update it guards cannot
//! interleave with another caller.

use courier_core::{
    CourierError, DeliveryStatus, NewQueueEntry, QueueEntry, QueueStats, QueueStatus,
};
use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};

use crate::database::{Database, map_tr_err};
use crate::models::{ENTRY_COLUMNS, entry_from_row, parse_status};

/// Insert entries in order inside one transaction. Returns their ids.
pub async fn enqueue_batch(
    db: &Database,
    entries: Vec<NewQueueEntry>,
) -> Result<Vec<i64>, CourierError> {
    if entries.is_empty() {
        return Ok(Vec::new());
    }
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut ids = Vec::with_capacity(entries.len());
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO queue (platform, platform_user_id, internal_user_id, profile_id,
                                        payload, status, attempts, received_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'pending', 0, ?6, ?7, ?7)",
                )?;
                for entry in &entries {
                    stmt.execute(params![
                        entry.key.platform,
                        entry.key.platform_user_id,
                        entry.key.internal_user_id,
                        entry.key.profile_id,
                        entry.payload,
                        entry.received_at,
                        entry.created_at,
                    ])?;
                    ids.push(tx.last_insert_rowid());
                }
            }
            tx.commit()?;
            Ok(ids)
        })
        .await
        .map_err(map_tr_err)
}

/// Claim the oldest pending entry.
///
/// Selects by lowest id, marks it `processing` and increments `attempts`.
/// Returns `None` if nothing is pending.
pub async fn claim_next(db: &Database) -> Result<Option<QueueEntry>, CourierError> {
    db.connection()
        .call(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM queue WHERE status = 'pending' ORDER BY id ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id) = id else {
                tx.commit()?;
                return Ok(None);
            };

            tx.execute(
                "UPDATE queue SET status = 'processing', attempts = attempts + 1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            let entry = select_entry(&tx, id)?;
            tx.commit()?;
            Ok(entry)
        })
        .await
        .map_err(map_tr_err)
}

/// Move a `processing` entry to a terminal status.
pub async fn complete(
    db: &Database,
    id: i64,
    status: QueueStatus,
    response: Option<String>,
) -> Result<(), CourierError> {
    if !status.is_terminal() {
        return Err(CourierError::NotTerminal { id, status });
    }
    let stored = status.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            if let Err(e) = expect_processing(&tx, id)? {
                return Ok(Err(e));
            }
            tx.execute(
                "UPDATE queue SET status = ?1, response = ?2,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?3",
                params![stored, response, id],
            )?;
            tx.commit()?;
            Ok(Ok(()))
        })
        .await
        .map_err(map_tr_err)?
}

/// Record a failed attempt: back to `pending` while retries remain, else `failed`.
pub async fn release(
    db: &Database,
    id: i64,
    error: &str,
    max_retries: u32,
) -> Result<QueueStatus, CourierError> {
    let error = error.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let attempts = match expect_processing(&tx, id)? {
                Ok(attempts) => attempts,
                Err(e) => return Ok(Err(e)),
            };

            let next = if attempts < max_retries {
                tx.execute(
                    "UPDATE queue SET status = 'pending',
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?1",
                    params![id],
                )?;
                QueueStatus::Pending
            } else {
                tx.execute(
                    "UPDATE queue SET status = 'failed', response = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![error, id],
                )?;
                QueueStatus::Failed
            };
            tx.commit()?;
            Ok(Ok(next))
        })
        .await
        .map_err(map_tr_err)?
}

/// Fetch one entry by id.
pub async fn get(db: &Database, id: i64) -> Result<Option<QueueEntry>, CourierError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM queue WHERE id = ?1"),
                params![id],
                entry_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Return every `processing` entry to `pending`, keeping its attempt count.
pub async fn recover_stale(db: &Database) -> Result<u64, CourierError> {
    db.connection()
        .call(|conn| {
            let n = conn.execute(
                "UPDATE queue SET status = 'pending',
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing'",
                [],
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Count entries per status.
pub async fn stats(db: &Database) -> Result<QueueStats, CourierError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM queue GROUP BY status")?;
            let mut rows = stmt.query([])?;
            let mut stats = QueueStats::default();
            while let Some(row) = rows.next()? {
                let status = parse_status(&row.get::<_, String>(0)?)?;
                let count: i64 = row.get(1)?;
                let count = count as u64;
                match status {
                    QueueStatus::Pending => stats.pending = count,
                    QueueStatus::Processing => stats.processing = count,
                    QueueStatus::Success => stats.success = count,
                    QueueStatus::Failed => stats.failed = count,
                }
            }
            Ok(stats)
        })
        .await
        .map_err(map_tr_err)
}

/// The most recently updated entries with `status`, newest first.
pub async fn list_recent(
    db: &Database,
    status: QueueStatus,
    limit: usize,
) -> Result<Vec<QueueEntry>, CourierError> {
    let status = status.to_string();
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM queue WHERE status = ?1
                 ORDER BY updated_at DESC, id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status, limit], entry_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Record the outcome of an outbound delivery. Leaves `status` untouched.
pub async fn record_delivery(
    db: &Database,
    id: i64,
    status: DeliveryStatus,
    detail: Option<&str>,
) -> Result<(), CourierError> {
    let status = status.to_string();
    let detail = detail.map(str::to_string);
    let updated = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE queue SET delivery_status = ?1, delivery_detail = ?2 WHERE id = ?3",
                params![status, detail, id],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if updated == 0 {
        return Err(CourierError::NotFound { id });
    }
    Ok(())
}

fn select_entry(tx: &Transaction<'_>, id: i64) -> rusqlite::Result<Option<QueueEntry>> {
    tx.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM queue WHERE id = ?1"),
        params![id],
        entry_from_row,
    )
    .optional()
}

/// Check that `id` exists and is `processing`; yields its attempt count.
fn expect_processing(
    tx: &Transaction<'_>,
    id: i64,
) -> rusqlite::Result<Result<u32, CourierError>> {
    let row: Option<(String, u32)> = tx
        .query_row(
            "SELECT status, attempts FROM queue WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((status, attempts)) = row else {
        return Ok(Err(CourierError::NotFound { id }));
    };
    let actual = parse_status(&status)?;
    if actual != QueueStatus::Processing {
        return Ok(Err(CourierError::InvalidTransition {
            id,
            expected: QueueStatus::Processing,
            actual,
        }));
    }
    Ok(Ok(attempts))
}
