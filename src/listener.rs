//! Synchronous observers of engine milestones
//!
//! Listeners complement the broadcast [`Event`](crate::types::Event) stream for
//! callers that need a callback on the completion path itself. Callbacks run on
//! the engine's task and must return quickly.

use crate::error::Error;
use crate::types::TaskId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Callbacks fired by [`DownloadEngine`](crate::DownloadEngine)
pub trait DownloadEngineListener: Send + Sync {
    /// The last active task finished
    fn on_downloads_completed(&self) {}

    /// A parameter change was accepted and is being applied
    fn on_applying_params(&self, _id: TaskId) {}

    /// A parameter change finished; `error` is set when applying failed
    fn on_params_applied(&self, _id: TaskId, _file_name: &str, _error: Option<&Error>) {}
}

/// Handle returned by [`ListenerRegistry::add`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Concurrent set of listeners
///
/// Registration may happen at any time, including from inside a callback;
/// dispatch iterates over a snapshot.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn DownloadEngineListener>)>>,
}

impl ListenerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&self, listener: Arc<dyn DownloadEngineListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    /// Unregister a listener; returns false if it was not registered
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn downloads_completed(&self) {
        for listener in self.snapshot() {
            listener.on_downloads_completed();
        }
    }

    pub(crate) fn applying_params(&self, id: TaskId) {
        for listener in self.snapshot() {
            listener.on_applying_params(id);
        }
    }

    pub(crate) fn params_applied(&self, id: TaskId, file_name: &str, error: Option<&Error>) {
        for listener in self.snapshot() {
            listener.on_params_applied(id, file_name, error);
        }
    }

    fn snapshot(&self) -> Vec<Arc<dyn DownloadEngineListener>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }
}
