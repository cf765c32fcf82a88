//! Persistence contract for task records
//!
//! The engine only talks to a [`TaskStore`]. [`MemoryStore`] keeps records in
//! process; [`Database`](crate::db::Database) persists them in SQLite.

use crate::error::{Error, Result, StorageError};
use crate::types::{TaskId, TaskRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

/// Storage backend for [`TaskRecord`]s
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a new record
    async fn insert(&self, record: &TaskRecord) -> Result<()>;

    /// Load a record by id
    async fn get_by_id(&self, id: TaskId) -> Result<Option<TaskRecord>>;

    /// Persist changes to an existing record
    ///
    /// With only `status_changed` set, just the status and status message are
    /// written. With neither flag set the call is a no-op. Fails with
    /// [`StorageError::NotFound`] if the record was deleted meanwhile; records
    /// are never re-created by an update.
    async fn update(
        &self,
        record: &TaskRecord,
        status_changed: bool,
        other_changed: bool,
    ) -> Result<()>;

    /// Remove a record, and its file when `with_file` is set
    async fn delete(&self, record: &TaskRecord, with_file: bool) -> Result<()>;

    /// All records, oldest first
    async fn list(&self) -> Result<Vec<TaskRecord>>;
}

/// Remove a task's file, treating a missing file as success
pub(crate) async fn remove_task_file(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(e)),
    }
}

/// In-process [`TaskStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert(&self, record: &TaskRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(Error::Storage(StorageError::QueryFailed(format!(
                "task {} already exists",
                record.id
            ))));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        record: &TaskRecord,
        status_changed: bool,
        other_changed: bool,
    ) -> Result<()> {
        if !status_changed && !other_changed {
            return Ok(());
        }

        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&record.id)
            .ok_or_else(|| Error::Storage(StorageError::NotFound(record.id.to_string())))?;

        if other_changed {
            *stored = record.clone();
        } else {
            stored.status = record.status;
            stored.status_msg = record.status_msg.clone();
        }
        Ok(())
    }

    async fn delete(&self, record: &TaskRecord, with_file: bool) -> Result<()> {
        self.records.write().await.remove(&record.id);
        if with_file {
            remove_task_file(&record.file_path()).await?;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TaskRecord>> {
        let mut records: Vec<TaskRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.date_added);
        Ok(records)
    }
}
