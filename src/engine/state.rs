//! Shared engine state: the active map, the wait queue and pending changes

use crate::types::{ChangeableParams, TaskId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use tokio_util::sync::CancellationToken;

/// FIFO of task ids waiting for an execution slot
///
/// An id appears at most once; pushing an id that is already queued keeps its
/// original position.
#[derive(Debug, Default)]
pub struct WaitQueue {
    order: VecDeque<TaskId>,
    members: HashSet<TaskId>,
}

impl WaitQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` unless it is already queued; returns whether it was added
    pub fn push(&mut self, id: TaskId) -> bool {
        if !self.members.insert(id) {
            return false;
        }
        self.order.push_back(id);
        true
    }

    /// Take the oldest id
    pub fn pop(&mut self) -> Option<TaskId> {
        let id = self.order.pop_front()?;
        self.members.remove(&id);
        Some(id)
    }

    /// Remove `id` wherever it is; returns whether it was queued
    pub fn remove(&mut self, id: TaskId) -> bool {
        if !self.members.remove(&id) {
            return false;
        }
        self.order.retain(|queued| *queued != id);
        true
    }

    /// Whether `id` is queued
    pub fn contains(&self, id: TaskId) -> bool {
        self.members.contains(&id)
    }

    /// Number of queued ids
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Drain every id in FIFO order
    pub fn drain(&mut self) -> Vec<TaskId> {
        self.members.clear();
        self.order.drain(..).collect()
    }

    /// Queued ids in FIFO order
    pub fn iter(&self) -> impl Iterator<Item = &TaskId> {
        self.order.iter()
    }
}

/// Why a worker was asked to exit early
///
/// Ordered by precedence: a stronger request overrides a weaker one that
/// arrived first (a delete beats a pause).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum StopReason {
    /// Engine shutdown; the task is left resumable for the next start
    Shutdown,
    /// User pause
    Pause,
    /// Engine stop (environment policy, parameter change)
    Stop,
    /// Task is being deleted
    Delete {
        /// Whether the partial file goes too
        with_file: bool,
    },
}

impl StopReason {
    fn to_u8(self) -> u8 {
        match self {
            StopReason::Shutdown => 1,
            StopReason::Pause => 2,
            StopReason::Stop => 3,
            StopReason::Delete { with_file: false } => 4,
            StopReason::Delete { with_file: true } => 5,
        }
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(StopReason::Shutdown),
            2 => Some(StopReason::Pause),
            3 => Some(StopReason::Stop),
            4 => Some(StopReason::Delete { with_file: false }),
            5 => Some(StopReason::Delete { with_file: true }),
            _ => None,
        }
    }
}

/// Handle the engine keeps for each running worker
#[derive(Clone, Debug, Default)]
pub(crate) struct TaskControl {
    cancel: CancellationToken,
    reason: Arc<AtomicU8>,
}

impl TaskControl {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to exit at its next checkpoint
    pub(crate) fn request(&self, reason: StopReason) {
        self.reason.fetch_max(reason.to_u8(), Ordering::SeqCst);
        self.cancel.cancel();
    }

    /// Strongest reason requested so far
    pub(crate) fn reason(&self) -> Option<StopReason> {
        StopReason::from_u8(self.reason.load(Ordering::SeqCst))
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }
}

/// Mutable engine bookkeeping, guarded by a single lock
#[derive(Debug, Default)]
pub(crate) struct EngineState {
    /// Tasks with a live worker
    pub(crate) active: HashMap<TaskId, TaskControl>,
    /// Parameter changes accepted but not yet applied
    pub(crate) pending_changes: HashMap<TaskId, ChangeableParams>,
    /// Tasks waiting for a free slot
    pub(crate) queue: WaitQueue,
    /// Tasks sleeping out a retry backoff; they hold no slot
    pub(crate) backoff: HashSet<TaskId>,
}
