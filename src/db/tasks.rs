//! Task record CRUD operations.

use crate::error::StorageError;
use crate::store::{TaskStore, remove_task_file};
use crate::types::{TaskId, TaskRecord};
use crate::{Error, Result};
use async_trait::async_trait;

use super::{Database, TaskRow};

const SELECT_TASK_COLUMNS: &str = r#"
    SELECT
        id, url, dir_path, file_name, description, mime_type, status,
        status_msg, checksum, retry, num_failed, unmetered_only,
        uncompress_archive, total_bytes, downloaded_bytes, date_added
    FROM tasks
"#;

impl Database {
    /// List tasks with a specific status, oldest first
    pub async fn list_tasks_by_status(&self, status: i32) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_TASK_COLUMNS} WHERE status = ? ORDER BY date_added ASC"
        ))
        .bind(status)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to list tasks by status: {}",
                e
            )))
        })?;

        rows_to_records(rows)
    }

    /// Count stored tasks
    pub async fn count_tasks(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "Failed to count tasks: {}",
                    e
                )))
            })
    }
}

fn rows_to_records(rows: Vec<TaskRow>) -> Result<Vec<TaskRecord>> {
    rows.into_iter()
        .map(|row| TaskRecord::try_from(row).map_err(Error::Storage))
        .collect()
}

fn path_text(record: &TaskRecord) -> String {
    record.dir_path.to_string_lossy().into_owned()
}

#[async_trait]
impl TaskStore for Database {
    async fn insert(&self, record: &TaskRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (
                id, url, dir_path, file_name, description, mime_type, status,
                status_msg, checksum, retry, num_failed, unmetered_only,
                uncompress_archive, total_bytes, downloaded_bytes, date_added
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.url)
        .bind(path_text(record))
        .bind(&record.file_name)
        .bind(&record.description)
        .bind(&record.mime_type)
        .bind(record.status.to_i32())
        .bind(&record.status_msg)
        .bind(&record.checksum)
        .bind(record.retry)
        .bind(i64::from(record.num_failed))
        .bind(record.unmetered_only)
        .bind(record.uncompress_archive)
        .bind(record.total_bytes.map(|b| b as i64))
        .bind(record.downloaded_bytes as i64)
        .bind(record.date_added.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to insert task: {}",
                e
            )))
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        let row = sqlx::query_as::<_, TaskRow>(&format!("{SELECT_TASK_COLUMNS} WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "Failed to get task: {}",
                    e
                )))
            })?;

        row.map(|row| TaskRecord::try_from(row).map_err(Error::Storage))
            .transpose()
    }

    async fn update(
        &self,
        record: &TaskRecord,
        status_changed: bool,
        other_changed: bool,
    ) -> Result<()> {
        let result = match (status_changed, other_changed) {
            (false, false) => return Ok(()),
            (true, false) => {
                sqlx::query("UPDATE tasks SET status = ?, status_msg = ? WHERE id = ?")
                    .bind(record.status.to_i32())
                    .bind(&record.status_msg)
                    .bind(record.id.to_string())
                    .execute(&self.pool)
                    .await
            }
            _ => {
                sqlx::query(
                    r#"
                    UPDATE tasks SET
                        url = ?, dir_path = ?, file_name = ?, description = ?,
                        mime_type = ?, status = ?, status_msg = ?, checksum = ?,
                        retry = ?, num_failed = ?, unmetered_only = ?,
                        uncompress_archive = ?, total_bytes = ?, downloaded_bytes = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&record.url)
                .bind(path_text(record))
                .bind(&record.file_name)
                .bind(&record.description)
                .bind(&record.mime_type)
                .bind(record.status.to_i32())
                .bind(&record.status_msg)
                .bind(&record.checksum)
                .bind(record.retry)
                .bind(i64::from(record.num_failed))
                .bind(record.unmetered_only)
                .bind(record.uncompress_archive)
                .bind(record.total_bytes.map(|b| b as i64))
                .bind(record.downloaded_bytes as i64)
                .bind(record.id.to_string())
                .execute(&self.pool)
                .await
            }
        }
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to update task: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Storage(StorageError::NotFound(record.id.to_string())));
        }
        Ok(())
    }

    async fn delete(&self, record: &TaskRecord, with_file: bool) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(record.id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::QueryFailed(format!(
                    "Failed to delete task: {}",
                    e
                )))
            })?;

        if with_file {
            remove_task_file(&record.file_path()).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{SELECT_TASK_COLUMNS} ORDER BY date_added ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Storage(StorageError::QueryFailed(format!(
                "Failed to list tasks: {}",
                e
            )))
        })?;

        rows_to_records(rows)
    }
}
