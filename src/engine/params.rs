//! Parameter changes on existing tasks

use super::DownloadEngine;
use super::state::StopReason;
use crate::checksum;
use crate::error::{Error, PostProcessError, Result};
use crate::types::{ChangeableParams, Event, StatusCode, TaskId, TaskRecord};

impl DownloadEngine {
    /// Change parameters of an existing task
    ///
    /// A live worker is stopped first and the change is applied once it has
    /// exited; otherwise the change is applied right away. While a change is
    /// pending, further changes, run requests, pause/resume and deletes for the
    /// task are ignored.
    ///
    /// Listeners see `on_applying_params` now and `on_params_applied` when the
    /// change has been written.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use download_engine::{ChangeableParams, DownloadEngine, TaskId};
    /// # async fn example(engine: DownloadEngine, id: TaskId) -> download_engine::Result<()> {
    /// engine
    ///     .change_params(
    ///         id,
    ///         ChangeableParams {
    ///             file_name: Some("renamed.iso".to_string()),
    ///             ..Default::default()
    ///         },
    ///     )
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn change_params(&self, id: TaskId, params: ChangeableParams) -> Result<()> {
        let (was_active, was_queued) = {
            let mut state = self.queue_state.state.lock().await;
            if state.pending_changes.contains_key(&id) {
                tracing::debug!(task_id = %id, "parameter change already pending, ignoring");
                return Ok(());
            }
            state.pending_changes.insert(id, params.clone());

            let was_queued = state.queue.remove(id);
            let was_active = match state.active.get(&id) {
                Some(control) => {
                    control.request(StopReason::Stop);
                    true
                }
                None => false,
            };
            (was_active, was_queued)
        };

        tracing::info!(task_id = %id, was_active, was_queued, "applying parameter change");
        self.listeners.applying_params(id);
        self.emit_event(Event::ApplyingParams { id });

        // A live worker hands the change to the completion handler on exit
        if !was_active {
            self.apply_params(id, params, was_queued).await;
        }
        Ok(())
    }

    /// Apply a pending change, clear it and notify listeners
    ///
    /// Re-runs the task when `run_after` is set or the URL changed.
    pub(crate) async fn apply_params(
        &self,
        id: TaskId,
        params: ChangeableParams,
        run_after: bool,
    ) {
        let result = self.write_params(id, &params).await;

        {
            let mut state = self.queue_state.state.lock().await;
            state.pending_changes.remove(&id);
        }

        let url_changed = match &result {
            Ok((record, url_changed)) => {
                tracing::info!(task_id = %id, url_changed, "parameter change applied");
                self.listeners.params_applied(id, &record.file_name, None);
                self.emit_event(Event::ParamsApplied { id, error: None });
                *url_changed
            }
            Err(e) => {
                tracing::warn!(
                    task_id = %id,
                    code = e.error_code(),
                    error = %e,
                    "failed to apply parameter change"
                );
                let file_name = params.file_name.as_deref().unwrap_or_default();
                self.listeners.params_applied(id, file_name, Some(e));
                self.emit_event(Event::ParamsApplied {
                    id,
                    error: Some(e.to_string()),
                });
                false
            }
        };

        if run_after || url_changed {
            self.run(id).await;
        }
    }

    /// Patch the stored record; returns it with whether the URL changed
    async fn write_params(
        &self,
        id: TaskId,
        params: &ChangeableParams,
    ) -> Result<(TaskRecord, bool)> {
        let mut record = self
            .services
            .store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let mut status_changed = false;

        if let Some(description) = &params.description {
            record.description = Some(description.clone());
        }
        if let Some(unmetered_only) = params.unmetered_only {
            record.unmetered_only = unmetered_only;
        }
        if let Some(retry) = params.retry {
            record.retry = retry;
        }
        let checksum_changed = params
            .checksum
            .as_ref()
            .is_some_and(|c| record.checksum.as_ref() != Some(c));
        if let Some(checksum) = &params.checksum {
            record.checksum = Some(checksum.clone());
        }

        self.relocate_for_params(&mut record, params).await?;

        let url_changed = params.url.as_ref().is_some_and(|url| *url != record.url);
        if let Some(url) = params.url.as_ref().filter(|_| url_changed) {
            // Bytes from the old source are useless for the new one
            let path = self
                .services
                .fs
                .resolve_path(&record.dir_path, &record.file_name);
            if self.services.fs.file_len(&path).await?.is_some() {
                self.services.fs.delete_file(&path).await?;
            }
            record.url = url.clone();
            record.downloaded_bytes = 0;
            record.total_bytes = None;
            record.num_failed = 0;
            record.status = StatusCode::Queued;
            record.status_msg = None;
            status_changed = true;
        } else if checksum_changed
            && matches!(record.status, StatusCode::Success | StatusCode::ChecksumError)
        {
            status_changed = self.reverify(&mut record).await;
        }

        self.services
            .store
            .update(&record, status_changed, true)
            .await?;
        Ok((record, url_changed))
    }

    /// Move the file to the new name or directory, if either changed
    async fn relocate_for_params(
        &self,
        record: &mut TaskRecord,
        params: &ChangeableParams,
    ) -> Result<()> {
        let new_name = params
            .file_name
            .clone()
            .unwrap_or_else(|| record.file_name.clone());
        let new_dir = params
            .dir_path
            .clone()
            .unwrap_or_else(|| record.dir_path.clone());
        if new_name == record.file_name && new_dir == record.dir_path {
            return Ok(());
        }

        let current = self
            .services
            .fs
            .resolve_path(&record.dir_path, &record.file_name);
        if self.services.fs.file_len(&current).await?.is_some() {
            let moved = self
                .services
                .fs
                .move_file(&record.dir_path, &record.file_name, &new_dir, &new_name, true)
                .await?;
            tracing::debug!(task_id = %record.id, from = ?current, to = ?moved, "moved task file");
        }

        record.file_name = new_name;
        record.dir_path = new_dir;
        Ok(())
    }

    /// Check a finished file against its new checksum; returns whether the status changed
    async fn reverify(&self, record: &mut TaskRecord) -> bool {
        let before = record.status;
        let path = self
            .services
            .fs
            .resolve_path(&record.dir_path, &record.file_name);

        let result = match record.expected_checksum() {
            None => Ok(true),
            Some(expected) => checksum::verify(&path, expected).await,
        };
        match result {
            Ok(true) => {
                record.status = StatusCode::Success;
                record.status_msg = None;
            }
            Ok(false) => {
                record.status = StatusCode::ChecksumError;
                record.status_msg =
                    Some(PostProcessError::ChecksumMismatch { file: path }.to_string());
            }
            Err(e) => {
                record.status = StatusCode::ChecksumError;
                record.status_msg = Some(e.to_string());
            }
        }
        tracing::info!(
            task_id = %record.id,
            status = %record.status,
            "re-verified after checksum change"
        );
        record.status != before
    }
}
