//! Task removal

use super::DownloadEngine;
use super::state::StopReason;
use crate::error::Result;
use crate::types::{Event, TaskId};
use tokio::task::JoinHandle;

impl DownloadEngine {
    /// Delete tasks in the background
    ///
    /// Each task leaves the wait queue, its worker (if any) is told to exit
    /// without saving, and the record is removed from the store together with
    /// the file when `with_file` is set. Tasks with a pending parameter change
    /// are skipped. Await the returned handle to know when all deletes are done.
    pub fn delete_downloads(&self, ids: Vec<TaskId>, with_file: bool) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            for id in ids {
                if let Err(e) = engine.delete_download(id, with_file).await {
                    tracing::error!(task_id = %id, error = %e, "failed to delete task");
                }
            }
        })
    }

    async fn delete_download(&self, id: TaskId, with_file: bool) -> Result<()> {
        let (was_active, others_active) = {
            let mut state = self.queue_state.state.lock().await;
            if state.pending_changes.contains_key(&id) {
                tracing::debug!(task_id = %id, "parameter change pending, skipping delete");
                return Ok(());
            }
            state.queue.remove(id);
            let was_active = match state.active.get(&id) {
                Some(control) => {
                    control.request(StopReason::Delete { with_file });
                    true
                }
                None => false,
            };
            (was_active, !state.active.is_empty())
        };

        if let Some(record) = self.services.store.get_by_id(id).await? {
            self.services.store.delete(&record, with_file).await?;
        }
        tracing::info!(task_id = %id, with_file, "task deleted");
        self.emit_event(Event::Removed { id });

        if !was_active && !others_active {
            self.notify_idle();
        }
        Ok(())
    }
}
