//! Admission control and wait-queue scheduling

use super::DownloadEngine;
use super::state::{EngineState, TaskControl};
use crate::error::{Error, Result};
use crate::types::{StatusCode, TaskId, TaskRecord};
use std::sync::atomic::Ordering;

/// Outcome of a run request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A worker was started
    Started,
    /// All slots are busy; the task waits in the queue
    Queued,
    /// The task already has a live worker
    AlreadyActive,
    /// A parameter change is being applied; the request was dropped
    PendingChange,
    /// The engine is shutting down
    ShuttingDown,
}

impl DownloadEngine {
    /// Request execution of a stored task
    ///
    /// Requests for tasks with a pending parameter change or a live worker are
    /// ignored. When every slot is busy the task joins the back of the wait
    /// queue and is stored as `Queued`; otherwise a worker starts immediately. Environment policy is
    /// checked by the worker as it starts, so a task the network does not
    /// allow is parked as waiting-for-network rather than rejected here.
    pub async fn run(&self, id: TaskId) -> Admission {
        let max_active = self.settings.read().await.limits.max_active_downloads;
        let admission = {
            let mut state = self.queue_state.state.lock().await;
            self.admit(&mut state, id, max_active)
        };
        if admission == Admission::Queued {
            self.mark_queued(id).await;
        }
        admission
    }

    /// Record a queued task as `Queued` so a restart picks it up again
    async fn mark_queued(&self, id: TaskId) {
        let mut record = match self.services.store.get_by_id(id).await {
            Ok(Some(record)) if record.status != StatusCode::Queued => record,
            Ok(_) => return,
            Err(e) => {
                tracing::error!(task_id = %id, error = %e, "failed to load queued task");
                return;
            }
        };
        // Held so a worker cannot start the task while the status is written
        let state = self.queue_state.state.lock().await;
        if !state.queue.contains(id) {
            return;
        }
        record.status = StatusCode::Queued;
        record.status_msg = None;
        self.persist(&record, true, false).await;
    }

    /// Save `record` (inserting it if the store does not know it) and run it
    pub async fn run_record(&self, record: &TaskRecord) -> Result<Admission> {
        if self.services.store.get_by_id(record.id).await?.is_some() {
            self.services.store.update(record, true, true).await?;
        } else {
            self.services.store.insert(record).await?;
        }
        Ok(self.run(record.id).await)
    }

    /// Insert a new task and run it
    pub async fn add(&self, record: &TaskRecord) -> Result<Admission> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        self.services.store.insert(record).await?;
        tracing::info!(task_id = %record.id, url = %record.url, "task added");
        Ok(self.run(record.id).await)
    }

    /// Admission decision; caller holds the state lock
    pub(crate) fn admit(
        &self,
        state: &mut EngineState,
        id: TaskId,
        max_active: usize,
    ) -> Admission {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            tracing::debug!(task_id = %id, "rejecting run request during shutdown");
            return Admission::ShuttingDown;
        }
        if state.pending_changes.contains_key(&id) {
            tracing::debug!(task_id = %id, "parameter change pending, ignoring run request");
            return Admission::PendingChange;
        }
        if state.active.contains_key(&id) {
            return Admission::AlreadyActive;
        }
        if state.active.len() >= max_active {
            if state.queue.push(id) {
                tracing::debug!(
                    task_id = %id,
                    queued = state.queue.len(),
                    "all slots busy, task queued"
                );
            }
            return Admission::Queued;
        }

        // A task started directly must not also wait in the queue
        state.queue.remove(id);
        self.start_worker(state, id);
        Admission::Started
    }

    /// Start queued tasks while slots are free; caller holds the state lock
    pub(crate) fn schedule_waiting(&self, state: &mut EngineState, max_active: usize) {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return;
        }
        while state.active.len() < max_active {
            let Some(id) = state.queue.pop() else {
                break;
            };
            self.admit(state, id, max_active);
        }
    }

    /// Start queued tasks after capacity grew or a slot freed up
    pub(crate) async fn schedule_waiting_downloads(&self) {
        let max_active = self.settings.read().await.limits.max_active_downloads;
        let mut state = self.queue_state.state.lock().await;
        self.schedule_waiting(&mut state, max_active);
    }

    fn start_worker(&self, state: &mut EngineState, id: TaskId) {
        let control = TaskControl::new();
        state.active.insert(id, control.clone());
        tracing::debug!(task_id = %id, active = state.active.len(), "starting worker");

        let engine = self.clone();
        tokio::spawn(async move {
            let outcome = engine.run_worker(id, control).await;
            engine.on_worker_finished(id, outcome).await;
        });
    }
}
