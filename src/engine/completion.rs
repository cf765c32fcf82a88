//! Worker exit handling: reporting, retry decisions, slot release and pending changes

use super::DownloadEngine;
use super::environment::network_forbids_task;
use super::worker::WorkerOutcome;
use crate::error::{Error, PostProcessError};
use crate::retry::{RetryClassifier, RetryDecision, retry_delay};
use crate::types::{Event, StatusCode, TaskId, TaskRecord};
use std::sync::atomic::Ordering;
use std::time::Duration;

impl DownloadEngine {
    /// Handle a worker's exit
    ///
    /// Runs exactly once per worker. Frees the task's slot and starts waiting
    /// tasks, then re-runs this one when the retry decision says so (after a
    /// backoff for transient failures). A parameter change deferred while the
    /// worker was alive is applied instead of a re-run.
    pub(crate) async fn on_worker_finished(&self, id: TaskId, outcome: WorkerOutcome) {
        let WorkerOutcome { record, error } = outcome;

        let decision = record.as_ref().map(|r| RetryClassifier::classify(r.status));
        if let Some(record) = &record {
            self.report_outcome(record, decision, error.as_ref());
        }

        let rerun = match (&record, decision) {
            (Some(record), Some(RetryDecision::RetryAfterNetwork)) => {
                self.network_allows(record).await
            }
            _ => false,
        };
        // A task stopped to take a parameter change restarts once it is applied
        let restart_after_change = record
            .as_ref()
            .is_some_and(|r| r.status == StatusCode::Stopped);

        let (max_active, backoff) = {
            let settings = self.settings.read().await;
            let backoff = match (&record, decision) {
                (Some(record), Some(RetryDecision::RetryNow)) => {
                    Some(retry_delay(&settings.retry, record.num_failed))
                }
                _ => None,
            };
            (settings.limits.max_active_downloads, backoff)
        };

        let (pending, backoff, idle) = {
            let mut state = self.queue_state.state.lock().await;
            state.active.remove(&id);

            // Tasks already waiting get the freed slot before this one runs again
            self.schedule_waiting(&mut state, max_active);

            let pending = state.pending_changes.get(&id).cloned();
            let backoff = if pending.is_some() {
                None
            } else if rerun {
                tracing::debug!(task_id = %id, ?decision, "re-running task");
                self.admit(&mut state, id, max_active);
                None
            } else {
                if backoff.is_some() {
                    state.backoff.insert(id);
                }
                backoff
            };
            (
                pending,
                backoff,
                state.active.is_empty() && state.backoff.is_empty(),
            )
        };

        if let Some(delay) = backoff {
            self.retry_after(id, delay);
        }
        if let Some(params) = pending {
            tracing::debug!(task_id = %id, "applying deferred parameter change");
            self.apply_params(id, params, restart_after_change).await;
        } else if idle {
            self.notify_idle();
        }
    }

    /// Run `id` again once `delay` has passed, without holding a slot meanwhile
    ///
    /// The task is skipped if it left `WaitingToRetry` during the backoff
    /// (paused, stopped or deleted). Otherwise it joins the back of the wait
    /// queue like any other run request.
    fn retry_after(&self, id: TaskId, delay: Duration) {
        tracing::debug!(
            task_id = %id,
            delay_ms = delay.as_millis() as u64,
            "retry backoff started"
        );
        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.finish_backoff(id).await;
        });
    }

    async fn finish_backoff(&self, id: TaskId) {
        let still_waiting = match self.services.store.get_by_id(id).await {
            Ok(Some(record)) => record.status == StatusCode::WaitingToRetry,
            Ok(None) => false,
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "failed to load task after backoff");
                false
            }
        };
        self.queue_state.state.lock().await.backoff.remove(&id);

        if still_waiting {
            tracing::debug!(task_id = %id, "backoff elapsed, re-running task");
            self.run(id).await;
            return;
        }

        let idle = {
            let state = self.queue_state.state.lock().await;
            state.active.is_empty() && state.backoff.is_empty()
        };
        if idle && self.queue_state.accepting_new.load(Ordering::SeqCst) {
            self.notify_idle();
        }
    }

    pub(crate) fn notify_idle(&self) {
        tracing::debug!("no active downloads left");
        self.listeners.downloads_completed();
        self.emit_event(Event::DownloadsCompleted);
    }

    /// Whether the network currently allows `record` to transfer
    async fn network_allows(&self, record: &TaskRecord) -> bool {
        let settings = self.settings.read().await;
        !network_forbids_task(
            self.services.environment.as_ref(),
            &settings.network,
            record,
        )
    }

    fn report_outcome(
        &self,
        record: &TaskRecord,
        decision: Option<RetryDecision>,
        error: Option<&Error>,
    ) {
        let id = record.id;

        if let Some(Error::PostProcess(e)) = error {
            self.report_post_process_error(record, e);
        }

        match decision {
            Some(RetryDecision::NeedsAuthorization) => {
                tracing::warn!(task_id = %id, url = %record.url, "server requires authorization");
                self.emit_event(Event::AuthorizationRequired { id, proxy: false });
            }
            Some(RetryDecision::NeedsProxyAuthorization) => {
                tracing::warn!(task_id = %id, "proxy requires authorization");
                self.emit_event(Event::AuthorizationRequired { id, proxy: true });
            }
            _ => {}
        }

        if record.status.is_finished() {
            self.emit_event(Event::Finished {
                id,
                status: record.status,
            });
        }
    }

    fn report_post_process_error(&self, record: &TaskRecord, error: &PostProcessError) {
        let id = record.id;
        let file_name = record.file_name.clone();
        let event = match error {
            PostProcessError::MoveAlreadyExists { .. } => Event::MoveAlreadyExists { id, file_name },
            PostProcessError::MoveFailed { .. } => Event::MoveFailed {
                id,
                file_name,
                error: error.to_string(),
            },
            PostProcessError::ExtractUnknownFormat { .. } => {
                Event::ExtractUnknownFormat { id, file_name }
            }
            PostProcessError::ExtractIo { .. } => Event::ExtractFailed {
                id,
                file_name,
                error: error.to_string(),
            },
            // Reported through the terminal checksum status
            PostProcessError::ChecksumMismatch { .. }
            | PostProcessError::UnknownChecksumFormat { .. } => return,
        };
        self.emit_event(event);
    }
}
