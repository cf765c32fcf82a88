//! SQLite persistence for task records
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`tasks`] - Task record CRUD and the [`TaskStore`](crate::store::TaskStore) impl

use crate::error::StorageError;
use crate::types::{StatusCode, TaskId, TaskRecord};
use chrono::{TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod migrations;
mod tasks;

/// Task row as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct TaskRow {
    /// UUID in hyphenated text form
    pub id: String,
    /// Source URL
    pub url: String,
    /// Target directory
    pub dir_path: String,
    /// Target filename
    pub file_name: String,
    /// Free-form description
    pub description: Option<String>,
    /// MIME type
    pub mime_type: String,
    /// Numeric status code (see [`StatusCode::to_i32`])
    pub status: i32,
    /// Status detail
    pub status_msg: Option<String>,
    /// Expected digest
    pub checksum: Option<String>,
    /// Automatic retry enabled
    pub retry: bool,
    /// Automatic retries consumed
    pub num_failed: i64,
    /// Only run on unmetered networks
    pub unmetered_only: bool,
    /// Extract after download
    pub uncompress_archive: bool,
    /// Total size in bytes
    pub total_bytes: Option<i64>,
    /// Bytes written so far
    pub downloaded_bytes: i64,
    /// Unix timestamp in milliseconds
    pub date_added: i64,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = StorageError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id: TaskId = row
            .id
            .parse()
            .map_err(|e| StorageError::CorruptRecord(format!("invalid task id {:?}: {}", row.id, e)))?;
        let date_added = Utc
            .timestamp_millis_opt(row.date_added)
            .single()
            .ok_or_else(|| {
                StorageError::CorruptRecord(format!(
                    "invalid date_added {} for task {}",
                    row.date_added, id
                ))
            })?;

        Ok(TaskRecord {
            id,
            url: row.url,
            dir_path: PathBuf::from(row.dir_path),
            file_name: row.file_name,
            description: row.description,
            mime_type: row.mime_type,
            status: StatusCode::from_i32(row.status),
            status_msg: row.status_msg,
            checksum: row.checksum,
            retry: row.retry,
            num_failed: u32::try_from(row.num_failed).unwrap_or(0),
            unmetered_only: row.unmetered_only,
            uncompress_archive: row.uncompress_archive,
            total_bytes: row.total_bytes.map(|b| b.max(0) as u64),
            downloaded_bytes: row.downloaded_bytes.max(0) as u64,
            date_added,
        })
    }
}

/// SQLite-backed task store
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
