//! Download control: pause/resume toggling, stop and mass resume

use super::DownloadEngine;
use super::state::StopReason;
use crate::error::{Error, Result};
use crate::types::{Event, StatusCode, TaskId};

impl DownloadEngine {
    /// Toggle a task between paused and running
    ///
    /// A live worker is asked to pause at its next checkpoint. A queued task
    /// leaves the queue and is marked paused. A paused or stopped task is run
    /// again. Tasks with a pending parameter change are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the task is neither live nor stored.
    pub async fn pause_resume(&self, id: TaskId) -> Result<()> {
        let was_queued = {
            let mut state = self.queue_state.state.lock().await;
            if state.pending_changes.contains_key(&id) {
                tracing::debug!(task_id = %id, "parameter change pending, ignoring pause/resume");
                return Ok(());
            }
            if let Some(control) = state.active.get(&id) {
                tracing::debug!(task_id = %id, "requesting pause");
                control.request(StopReason::Pause);
                return Ok(());
            }
            state.queue.remove(id)
        };

        let mut record = self
            .services
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if record.status.is_stopped_or_paused() && !was_queued {
            tracing::info!(task_id = %id, "resuming task");
            self.run(id).await;
            return Ok(());
        }
        if was_queued || !record.status.is_finished() {
            tracing::info!(task_id = %id, status = %record.status, "pausing idle task");
            record.status = StatusCode::Paused;
            record.status_msg = None;
            self.services.store.update(&record, true, false).await?;
            self.emit_event(Event::Paused { id });
        }
        Ok(())
    }

    /// Run a task again if it ended in an error status
    ///
    /// Returns whether a run was requested.
    pub async fn resume_if_error(&self, id: TaskId) -> Result<bool> {
        let record = self
            .services
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !record.status.is_error() {
            return Ok(false);
        }
        tracing::info!(task_id = %id, status = %record.status, "resuming failed task");
        self.run(id).await;
        Ok(true)
    }

    /// Pause every live worker, every queued task and every task in retry backoff
    ///
    /// Does not wait for workers to exit. Tasks with a pending parameter
    /// change are skipped.
    pub async fn pause_all(&self) {
        self.halt_all(StopReason::Pause, StatusCode::Paused).await;
    }

    /// Stop every live worker, every queued task and every task in retry backoff
    ///
    /// Does not wait for workers to exit. Tasks with a pending parameter
    /// change are skipped.
    pub async fn stop_all(&self) {
        self.halt_all(StopReason::Stop, StatusCode::Stopped).await;
    }

    async fn halt_all(&self, reason: StopReason, queued_status: StatusCode) {
        let drained = {
            let mut state = self.queue_state.state.lock().await;
            for (id, control) in &state.active {
                if state.pending_changes.contains_key(id) {
                    continue;
                }
                tracing::debug!(task_id = %id, ?reason, "signaling worker");
                control.request(reason);
            }
            let queued = state.queue.drain();
            let (skipped, mut drained): (Vec<TaskId>, Vec<TaskId>) = queued
                .into_iter()
                .partition(|id| state.pending_changes.contains_key(id));
            for id in skipped {
                state.queue.push(id);
            }
            // Tasks in retry backoff are marked here; their re-run then finds them halted
            drained.extend(
                state
                    .backoff
                    .iter()
                    .filter(|id| !state.pending_changes.contains_key(id))
                    .copied(),
            );
            drained
        };

        for id in drained {
            let mut record = match self.services.store.get_by_id(id).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(task_id = %id, error = %e, "failed to load queued task");
                    continue;
                }
            };
            record.status = queued_status;
            record.status_msg = None;
            self.persist(&record, true, false).await;
            self.emit_event(match reason {
                StopReason::Pause => Event::Paused { id },
                _ => Event::Stopped { id },
            });
        }
    }

    /// Re-run every unfinished task
    ///
    /// Covers queued, stale running, stopped and waiting tasks. Paused tasks
    /// are included unless `ignore_paused` is set.
    pub async fn resume_downloads(&self, ignore_paused: bool) -> Result<()> {
        let records = self.services.store.list().await?;
        let mut resumed = 0usize;

        for record in records {
            let resumable = match record.status {
                StatusCode::Queued
                | StatusCode::Running
                | StatusCode::Stopped
                | StatusCode::WaitingToRetry
                | StatusCode::WaitingForNetwork => true,
                StatusCode::Paused => !ignore_paused,
                _ => false,
            };
            if resumable {
                self.run(record.id).await;
                resumed += 1;
            }
        }

        tracing::debug!(resumed, ignore_paused, "resume pass complete");
        Ok(())
    }
}
