// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping between `queue` table rows and the core queue types.

use std::str::FromStr;

use courier_core::{ConversationKey, DeliveryStatus, QueueEntry, QueueStatus};
use rusqlite::Row;
use rusqlite::types::Type;

/// Column list matching [`entry_from_row`].
pub(crate) const ENTRY_COLUMNS: &str = "id, platform, platform_user_id, internal_user_id, \
     profile_id, payload, status, attempts, received_at, created_at, updated_at, response, \
     delivery_status, delivery_detail";

pub(crate) fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let delivery_status: Option<String> = row.get(12)?;
    Ok(QueueEntry {
        id: row.get(0)?,
        key: ConversationKey {
            platform: row.get(1)?,
            platform_user_id: row.get(2)?,
            internal_user_id: row.get(3)?,
            profile_id: row.get(4)?,
        },
        payload: row.get(5)?,
        status: parse_column(6, &row.get::<_, String>(6)?)?,
        attempts: row.get(7)?,
        received_at: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
        response: row.get(11)?,
        delivery_status: delivery_status
            .map(|s| parse_column::<DeliveryStatus>(12, &s))
            .transpose()?,
        delivery_detail: row.get(13)?,
    })
}

/// Parse a TEXT column into a strum enum, reporting the column on failure.
pub(crate) fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_status(value: &str) -> rusqlite::Result<QueueStatus> {
    parse_column(0, value)
}
