//! Per-task worker: environment gate, transfer, retry backoff and post-processing

use super::DownloadEngine;
use super::environment::{network_forbids_task, power_policy_forbids};
use super::state::{StopReason, TaskControl};
use crate::config::Config;
use crate::error::{Error, TransferError};
use crate::post_processing::failure_status;
use crate::retry::IsRetryable;
use crate::store::remove_task_file;
use crate::transport::{TransferRequest, TransferResponse};
use crate::types::{Event, StatusCode, TaskId, TaskRecord};
use futures::StreamExt;
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// What a worker leaves behind for the completion handler
#[derive(Debug, Default)]
pub(crate) struct WorkerOutcome {
    /// Final record state; `None` when the task is gone (deleted or never loaded)
    pub(crate) record: Option<TaskRecord>,
    /// Error that ended the run, if any
    pub(crate) error: Option<Error>,
}

impl WorkerOutcome {
    fn finished(record: TaskRecord) -> Self {
        Self {
            record: Some(record),
            error: None,
        }
    }

    fn failed(record: TaskRecord, error: Error) -> Self {
        Self {
            record: Some(record),
            error: Some(error),
        }
    }
}

/// How a transfer ended without error
enum TransferEnd {
    Complete,
    Cancelled,
}

fn write_error(path: &Path, e: std::io::Error) -> TransferError {
    TransferError::Write {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl DownloadEngine {
    /// Execute one task until it finishes, fails, parks or is cancelled
    pub(crate) async fn run_worker(&self, id: TaskId, control: TaskControl) -> WorkerOutcome {
        let mut record = match self.services.store.get_by_id(id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!(task_id = %id, "task disappeared before its worker started");
                return WorkerOutcome::default();
            }
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "failed to load task");
                return WorkerOutcome {
                    record: None,
                    error: Some(e),
                };
            }
        };
        let settings = self.settings.read().await.clone();
        let environment = self.services.environment.as_ref();

        if network_forbids_task(environment, &settings.network, &record) {
            return self.park_for_network(record).await;
        }
        if power_policy_forbids(environment, &settings.power) {
            tracing::info!(task_id = %id, "power policy forbids transfers, stopping task");
            record.status = StatusCode::Stopped;
            record.status_msg = None;
            self.persist(&record, true, false).await;
            self.emit_event(Event::Stopped { id });
            return WorkerOutcome::finished(record);
        }

        record.status = StatusCode::Running;
        record.status_msg = None;
        self.persist(&record, true, false).await;
        self.emit_event(Event::Started { id });
        tracing::info!(task_id = %id, url = %record.url, "download started");

        match self.transfer(&mut record, &control, &settings).await {
            Ok(TransferEnd::Complete) => self.finish_transfer(record, &settings).await,
            Ok(TransferEnd::Cancelled) => self.finish_cancelled(record, &control).await,
            Err(_) if control.is_cancelled() => self.finish_cancelled(record, &control).await,
            Err(e) => self.handle_transfer_error(record, e, &settings).await,
        }
    }

    /// Stream the remote resource into the task's file
    ///
    /// Resumes from the bytes already on disk when the transport honours the
    /// offset, and starts over otherwise.
    async fn transfer(
        &self,
        record: &mut TaskRecord,
        control: &TaskControl,
        settings: &Config,
    ) -> Result<TransferEnd, TransferError> {
        let path = self
            .services
            .fs
            .resolve_path(&record.dir_path, &record.file_name);
        tokio::fs::create_dir_all(&record.dir_path)
            .await
            .map_err(|e| write_error(&record.dir_path, e))?;

        let offset = self
            .services
            .fs
            .file_len(&path)
            .await
            .map_err(|e| TransferError::Write {
                path: path.clone(),
                reason: e.to_string(),
            })?
            .unwrap_or(0);

        let response = tokio::select! {
            _ = control.cancelled() => return Ok(TransferEnd::Cancelled),
            response = self.open_transfer(record, offset) => response?,
        };

        if let Some(mime_type) = &response.mime_type {
            record.mime_type = mime_type.clone();
        }
        record.total_bytes = response.total_len;

        let mut file = if response.resumed {
            record.downloaded_bytes = offset;
            OpenOptions::new()
                .append(true)
                .open(&path)
                .await
                .map_err(|e| write_error(&path, e))?
        } else {
            record.downloaded_bytes = 0;
            tokio::fs::File::create(&path)
                .await
                .map_err(|e| write_error(&path, e))?
        };
        self.persist(record, false, true).await;

        let progress_interval = settings.transfer.progress_interval_bytes.max(1);
        let mut since_progress = 0u64;
        let mut body = response.body;

        loop {
            let next = tokio::select! {
                biased;
                _ = control.cancelled() => {
                    file.flush().await.map_err(|e| write_error(&path, e))?;
                    return Ok(TransferEnd::Cancelled);
                }
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;
            let len = chunk.len() as u64;

            self.speed_limiter.acquire(len).await;
            file.write_all(&chunk)
                .await
                .map_err(|e| write_error(&path, e))?;

            record.downloaded_bytes += len;
            since_progress += len;
            if since_progress >= progress_interval {
                since_progress = 0;
                self.emit_event(Event::Progress {
                    id: record.id,
                    downloaded_bytes: record.downloaded_bytes,
                    total_bytes: record.total_bytes,
                });
            }
        }

        file.flush().await.map_err(|e| write_error(&path, e))?;
        self.emit_event(Event::Progress {
            id: record.id,
            downloaded_bytes: record.downloaded_bytes,
            total_bytes: record.total_bytes,
        });

        tracing::debug!(
            task_id = %record.id,
            bytes = record.downloaded_bytes,
            resumed = response.resumed,
            "transfer complete"
        );
        Ok(TransferEnd::Complete)
    }

    /// Open the transfer, starting over if the server rejects the resume range
    async fn open_transfer(
        &self,
        record: &TaskRecord,
        offset: u64,
    ) -> Result<TransferResponse, TransferError> {
        let request = TransferRequest {
            url: record.url.clone(),
            offset,
        };
        match self.services.transport.open(&request).await {
            // 416: the partial file is at least as long as the resource
            Err(TransferError::Http { status: 416, .. }) if offset > 0 => {
                tracing::debug!(
                    task_id = %record.id,
                    offset,
                    "resume range rejected, restarting from zero"
                );
                let request = TransferRequest {
                    url: record.url.clone(),
                    offset: 0,
                };
                self.services.transport.open(&request).await
            }
            other => other,
        }
    }

    async fn finish_transfer(&self, mut record: TaskRecord, settings: &Config) -> WorkerOutcome {
        let id = record.id;
        let result = self
            .services
            .post_processor
            .run(&mut record, &settings.post_process)
            .await;

        match result {
            Ok(()) => {
                record.status = StatusCode::Success;
                record.status_msg = None;
                record.num_failed = 0;
                tracing::info!(task_id = %id, file = %record.file_name, "download finished");
                self.persist(&record, true, true).await;
                WorkerOutcome::finished(record)
            }
            Err(e) => {
                tracing::warn!(task_id = %id, error = %e, "post-processing failed");
                record.status = failure_status(&e);
                record.status_msg = Some(e.to_string());
                self.persist(&record, true, true).await;
                WorkerOutcome::failed(record, Error::PostProcess(e))
            }
        }
    }

    async fn finish_cancelled(
        &self,
        mut record: TaskRecord,
        control: &TaskControl,
    ) -> WorkerOutcome {
        let id = record.id;
        match control.reason() {
            Some(StopReason::Delete { with_file }) => {
                tracing::debug!(task_id = %id, with_file, "worker exiting for delete");
                if with_file && let Err(e) = remove_task_file(&record.file_path()).await {
                    tracing::warn!(task_id = %id, error = %e, "failed to remove partial file");
                }
                return WorkerOutcome::default();
            }
            Some(StopReason::Shutdown) => {
                // Left queued so the next start picks it up again
                record.status = StatusCode::Queued;
                record.status_msg = None;
            }
            Some(StopReason::Pause) => {
                record.status = StatusCode::Paused;
                record.status_msg = None;
                self.emit_event(Event::Paused { id });
            }
            Some(StopReason::Stop) | None => {
                record.status = StatusCode::Stopped;
                record.status_msg = None;
                self.emit_event(Event::Stopped { id });
            }
        }

        tracing::info!(
            task_id = %id,
            status = %record.status,
            downloaded = record.downloaded_bytes,
            "worker stopped on request"
        );
        self.persist(&record, true, true).await;
        WorkerOutcome::finished(record)
    }

    async fn handle_transfer_error(
        &self,
        mut record: TaskRecord,
        error: TransferError,
        settings: &Config,
    ) -> WorkerOutcome {
        let id = record.id;

        if !self.services.environment.is_connected() {
            tracing::info!(task_id = %id, error = %error, "network lost during transfer");
            return self.park_for_network(record).await;
        }

        if error.is_retryable()
            && record.retry
            && record.num_failed < settings.limits.max_download_retries
        {
            record.num_failed += 1;
            record.status = StatusCode::WaitingToRetry;
            record.status_msg = Some(error.to_string());
            self.persist(&record, true, true).await;

            tracing::warn!(
                task_id = %id,
                attempt = record.num_failed,
                max_retries = settings.limits.max_download_retries,
                error = %error,
                "transient failure, retrying after backoff"
            );
            self.emit_event(Event::Retrying {
                id,
                attempt: record.num_failed,
                error: error.to_string(),
            });
            // The slot is released before the backoff starts
            return WorkerOutcome::finished(record);
        }

        record.status = match &error {
            TransferError::Http { status, .. } => StatusCode::from_http(*status),
            _ => StatusCode::Error,
        };
        record.status_msg = Some(error.to_string());
        tracing::error!(
            task_id = %id,
            status = %record.status,
            retries = record.num_failed,
            error = %error,
            "download failed"
        );
        self.persist(&record, true, true).await;
        WorkerOutcome::failed(record, Error::Transfer(error))
    }

    async fn park_for_network(&self, mut record: TaskRecord) -> WorkerOutcome {
        tracing::info!(task_id = %record.id, "waiting for a suitable network");
        record.status = StatusCode::WaitingForNetwork;
        record.status_msg = None;
        self.persist(&record, true, true).await;
        self.emit_event(Event::WaitingForNetwork { id: record.id });
        WorkerOutcome::finished(record)
    }
}
