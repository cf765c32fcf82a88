//! Download orchestration engine split into focused submodules.
//!
//! The `DownloadEngine` struct and its methods are organized by domain:
//! - [`state`] - Wait queue, worker handles and the shared state they live in
//! - [`admission`] - Admission control and wait-queue scheduling
//! - [`worker`] - Per-task transfer execution
//! - [`completion`] - Worker exit handling and retry decisions
//! - [`control`] - Pause, resume, stop and mass resume
//! - [`params`] - Parameter changes on existing tasks
//! - [`delete`] - Task removal
//! - [`environment`] - Network and power policy reactions
//! - [`settings`] - Runtime settings updates
//! - [`lifecycle`] - Restore on start and graceful shutdown

mod admission;
mod completion;
mod control;
mod delete;
mod environment;
mod lifecycle;
mod params;
mod settings;
mod state;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use admission::Admission;
pub use state::WaitQueue;

use crate::config::Config;
use crate::environment::Environment;
use crate::error::{Error, Result, StorageError};
use crate::extraction::{ArchiveExtractor, DefaultArchiveExtractor};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::listener::{DownloadEngineListener, ListenerId, ListenerRegistry};
use crate::post_processing::PostProcessor;
use crate::speed_limiter::SpeedLimiter;
use crate::store::TaskStore;
use crate::transport::Transport;
use crate::types::{Event, TaskId, TaskRecord};
use state::EngineState;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;

/// Collaborators the engine is built from
///
/// The store, transport and environment are always host-provided. The file
/// system and archive extractor default to the local implementations.
pub struct EngineComponents {
    /// Persistent task storage
    pub store: Arc<dyn TaskStore>,
    /// Byte-stream transport
    pub transport: Arc<dyn Transport>,
    /// Connectivity and power conditions
    pub environment: Arc<dyn Environment>,
    /// File-system primitives
    pub fs: Arc<dyn FileSystem>,
    /// Archive extraction backend
    pub extractor: Arc<dyn ArchiveExtractor>,
}

impl EngineComponents {
    /// Components with the local file system and the default extractor
    pub fn new(
        store: Arc<dyn TaskStore>,
        transport: Arc<dyn Transport>,
        environment: Arc<dyn Environment>,
    ) -> Self {
        Self {
            store,
            transport,
            environment,
            fs: Arc::new(LocalFileSystem::new()),
            extractor: Arc::new(DefaultArchiveExtractor::new()),
        }
    }

    /// Replace the file system
    pub fn with_file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    /// Replace the archive extractor
    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }
}

/// Host-provided services the engine drives
#[derive(Clone)]
pub(crate) struct Services {
    pub(crate) store: Arc<dyn TaskStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) environment: Arc<dyn Environment>,
    pub(crate) post_processor: PostProcessor,
}

/// Admission and worker bookkeeping
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Active map, wait queue and pending changes behind one lock
    pub(crate) state: Arc<Mutex<EngineState>>,
    /// Flag to indicate whether new runs are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// Environment subscriptions that are currently live
#[derive(Debug, Default)]
pub(crate) struct Watchers {
    pub(crate) connection: Option<JoinHandle<()>>,
    pub(crate) power: Option<JoinHandle<()>>,
}

/// Main engine instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct DownloadEngine {
    /// Store, transport, file system, environment and post-processing
    pub(crate) services: Services,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Current settings, replaced wholesale by settings updates
    pub(crate) settings: Arc<RwLock<Config>>,
    /// Global speed limiter shared across all workers (token bucket algorithm)
    pub(crate) speed_limiter: SpeedLimiter,
    /// Registered listeners
    pub(crate) listeners: Arc<ListenerRegistry>,
    /// Admission and worker bookkeeping
    pub(crate) queue_state: QueueState,
    /// Live environment subscriptions
    pub(crate) watchers: Arc<std::sync::Mutex<Watchers>>,
}

impl DownloadEngine {
    /// Create a new engine
    ///
    /// Validates `config` and subscribes to the environment changes the
    /// configured policies care about. Tasks persisted by a previous run are
    /// not started until [`restore_downloads`](Self::restore_downloads) is called.
    pub async fn new(config: Config, components: EngineComponents) -> Result<Self> {
        config.validate()?;

        // Channel buffer of 1000 events - old events are dropped if subscribers are slow
        let (event_tx, _rx) = broadcast::channel(1000);

        let post_processor = PostProcessor::new(components.fs.clone(), components.extractor);
        let speed_limiter = SpeedLimiter::new(config.limits.speed_limit_bps);
        let network_active = config.network.is_active();
        let power_active = config.power.is_active();
        let custom_battery = config.power.custom_battery_control;

        let engine = Self {
            services: Services {
                store: components.store,
                transport: components.transport,
                fs: components.fs,
                environment: components.environment,
                post_processor,
            },
            event_tx,
            settings: Arc::new(RwLock::new(config)),
            speed_limiter,
            listeners: Arc::new(ListenerRegistry::new()),
            queue_state: QueueState {
                state: Arc::new(Mutex::new(EngineState::default())),
                accepting_new: Arc::new(AtomicBool::new(true)),
            },
            watchers: Arc::new(std::sync::Mutex::new(Watchers::default())),
        };

        engine.switch_connection_watcher(network_active);
        engine.switch_power_watcher(power_active, power_active && custom_battery);

        tracing::info!(
            network_watch = network_active,
            power_watch = power_active,
            "download engine created"
        );
        Ok(engine)
    }

    /// Subscribe to engine events
    ///
    /// Returns a receiver that will receive all events emitted after this call.
    /// Multiple subscribers are supported. If a subscriber falls behind by more
    /// than the channel buffer, it receives `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Register a listener; callbacks run on engine tasks and must not block
    pub fn add_listener(&self, listener: Arc<dyn DownloadEngineListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Unregister a listener; returns whether it was registered
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    /// Load a task from the store
    pub async fn get_task(&self, id: TaskId) -> Result<Option<TaskRecord>> {
        self.services.store.get_by_id(id).await
    }

    /// All tasks in the store, oldest first
    pub async fn list_tasks(&self) -> Result<Vec<TaskRecord>> {
        self.services.store.list().await
    }

    /// Ids of tasks that currently have a live worker
    pub async fn active_ids(&self) -> Vec<TaskId> {
        let state = self.queue_state.state.lock().await;
        state.active.keys().copied().collect()
    }

    /// Ids waiting for a slot, in the order they will start
    pub async fn queued_ids(&self) -> Vec<TaskId> {
        let state = self.queue_state.state.lock().await;
        state.queue.iter().copied().collect()
    }

    /// Emit an event to all subscribers
    ///
    /// Silently ignores send errors (which occur when there are no active subscribers).
    pub(crate) fn emit_event(&self, event: Event) {
        // send() returns Err if there are no receivers, which is fine - we just drop the event
        self.event_tx.send(event).ok();
    }

    /// Write a record, logging instead of failing
    ///
    /// Workers and completion handlers have nobody to return a storage error
    /// to. A missing row means the task was deleted meanwhile.
    pub(crate) async fn persist(
        &self,
        record: &TaskRecord,
        status_changed: bool,
        other_changed: bool,
    ) {
        match self
            .services
            .store
            .update(record, status_changed, other_changed)
            .await
        {
            Ok(()) => {}
            Err(Error::Storage(StorageError::NotFound(_))) => {
                tracing::debug!(task_id = %record.id, "task deleted before its state was saved");
            }
            Err(e) => {
                tracing::error!(task_id = %record.id, error = %e, "failed to persist task state");
            }
        }
    }
}
