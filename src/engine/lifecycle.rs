//! Startup restore and shutdown coordination.

use super::DownloadEngine;
use super::state::StopReason;
use crate::error::Result;
use crate::types::{Event, StatusCode};
use std::sync::atomic::Ordering;

impl DownloadEngine {
    /// Re-run tasks a previous process left unfinished
    ///
    /// Picks up tasks that were running, queued, backing off before a retry or
    /// waiting for the network when the last process ended. Call once after
    /// [`new`](Self::new).
    pub async fn restore_downloads(&self) -> Result<()> {
        let records = self.services.store.list().await?;
        let mut restored = 0usize;

        for record in records {
            if matches!(
                record.status,
                StatusCode::Running
                    | StatusCode::Queued
                    | StatusCode::WaitingToRetry
                    | StatusCode::WaitingForNetwork
            ) {
                self.run(record.id).await;
                restored += 1;
            }
        }

        tracing::info!(restored, "restored unfinished downloads");
        Ok(())
    }

    /// Gracefully shut down the engine
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting run requests
    /// 2. Drops the environment subscriptions
    /// 3. Signals every live worker to exit, leaving its task resumable
    /// 4. Waits for workers to exit, up to the configured shutdown timeout
    /// 5. Emits [`Event::Shutdown`]
    ///
    /// Tasks left in the wait queue keep their stored status and are picked
    /// up by [`restore_downloads`](Self::restore_downloads) on the next start.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new runs
        self.queue_state.accepting_new.store(false, Ordering::SeqCst);

        // 2. Environment changes must not restart anything now
        self.stop_watchers();

        // 3. Signal every live worker
        {
            let mut state = self.queue_state.state.lock().await;
            for (id, control) in &state.active {
                tracing::debug!(task_id = %id, "signaling shutdown");
                control.request(StopReason::Shutdown);
            }
            state.queue.drain();
        }
        let timeout = self.settings.read().await.transfer.shutdown_timeout;

        // 4. Wait for workers with timeout
        match tokio::time::timeout(timeout, self.wait_for_active_downloads()).await {
            Ok(()) => tracing::info!("All workers exited"),
            Err(_) => tracing::warn!(
                timeout_secs = timeout.as_secs(),
                "Timeout waiting for workers to exit, proceeding with shutdown"
            ),
        }

        // 5. Emit shutdown event
        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_downloads(&self) {
        loop {
            let active_count = self.queue_state.state.lock().await.active.len();
            if active_count == 0 {
                return;
            }
            tracing::debug!(active_count, "Waiting for active workers to exit");
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }
}
