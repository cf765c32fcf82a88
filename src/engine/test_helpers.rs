//! Shared test helpers for creating DownloadEngine instances in tests.

use super::{DownloadEngine, EngineComponents};
use crate::config::Config;
use crate::environment::ManualEnvironment;
use crate::error::{Error, TransferError};
use crate::listener::DownloadEngineListener;
use crate::store::{MemoryStore, TaskStore};
use crate::transport::{ChunkStream, TransferRequest, TransferResponse, Transport};
use crate::types::{Event, StatusCode, TaskId, TaskRecord};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{Semaphore, broadcast};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Scripted response for one transport call
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    /// Serve the body, honouring resume offsets
    Body(Vec<u8>),
    /// Serve the first `split` bytes, then hold the rest until `gate` grants a permit
    Gated {
        body: Vec<u8>,
        split: usize,
        gate: Arc<Semaphore>,
    },
    /// Fail with an HTTP status
    Status(u16),
}

impl Reply {
    /// Body held entirely behind a closed gate
    pub(crate) fn gated(body: &[u8]) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let reply = Reply::Gated {
            body: body.to_vec(),
            split: 0,
            gate: gate.clone(),
        };
        (reply, gate)
    }
}

/// In-memory [`Transport`] answering from per-URL scripts
///
/// Replies for a URL are consumed in order; the last one repeats. URLs without
/// a script answer 404.
#[derive(Default)]
pub(crate) struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<TransferRequest>>,
}

impl MockTransport {
    pub(crate) fn reply(&self, url: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Requests seen for `url`, oldest first
    pub(crate) fn requests_for(&self, url: &str) -> Vec<TransferRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .cloned()
            .collect()
    }

    /// URLs of every request in the order they were opened
    pub(crate) fn request_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let queue = replies.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn range_slice(body: &[u8], request: &TransferRequest) -> Result<(Vec<u8>, bool), TransferError> {
    let offset = usize::try_from(request.offset).unwrap();
    if offset == 0 {
        return Ok((body.to_vec(), false));
    }
    if offset >= body.len() {
        return Err(TransferError::Http {
            status: 416,
            url: request.url.clone(),
        });
    }
    Ok((body[offset..].to_vec(), true))
}

fn chunked(body: Vec<u8>) -> ChunkStream {
    let chunks: Vec<Result<Vec<u8>, TransferError>> =
        body.chunks(4).map(|c| Ok(c.to_vec())).collect();
    stream::iter(chunks).boxed()
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, request: &TransferRequest) -> Result<TransferResponse, TransferError> {
        self.requests.lock().unwrap().push(request.clone());

        let Some(reply) = self.next_reply(&request.url) else {
            return Err(TransferError::Http {
                status: 404,
                url: request.url.clone(),
            });
        };

        match reply {
            Reply::Body(body) => {
                let total = body.len() as u64;
                let (rest, resumed) = range_slice(&body, request)?;
                Ok(TransferResponse {
                    total_len: Some(total),
                    mime_type: None,
                    resumed,
                    body: chunked(rest),
                })
            }
            Reply::Gated { body, split, gate } => {
                let total = body.len() as u64;
                let (rest, resumed) = range_slice(&body, request)?;
                let split = split.min(rest.len());
                let (head, tail) = (rest[..split].to_vec(), rest[split..].to_vec());
                let tail = stream::once(async move {
                    let permit = gate
                        .acquire_owned()
                        .await
                        .map_err(|e| TransferError::Stream(e.to_string()))?;
                    permit.forget();
                    Ok::<_, TransferError>(tail)
                });
                Ok(TransferResponse {
                    total_len: Some(total),
                    mime_type: None,
                    resumed,
                    body: stream::iter(vec![Ok::<_, TransferError>(head)])
                        .chain(tail)
                        .boxed(),
                })
            }
            Reply::Status(status) => Err(TransferError::Http {
                status,
                url: request.url.clone(),
            }),
        }
    }
}

/// Listener that records every callback
#[derive(Default)]
pub(crate) struct RecordingListener {
    pub(crate) completed: Mutex<usize>,
    pub(crate) applying: Mutex<Vec<TaskId>>,
    pub(crate) applied: Mutex<Vec<(TaskId, String, Option<String>)>>,
}

impl DownloadEngineListener for RecordingListener {
    fn on_downloads_completed(&self) {
        *self.completed.lock().unwrap() += 1;
    }

    fn on_applying_params(&self, id: TaskId) {
        self.applying.lock().unwrap().push(id);
    }

    fn on_params_applied(&self, id: TaskId, file_name: &str, error: Option<&Error>) {
        self.applied.lock().unwrap().push((
            id,
            file_name.to_string(),
            error.map(ToString::to_string),
        ));
    }
}

/// Engine wired to in-memory collaborators
pub(crate) struct TestEngine {
    pub(crate) engine: DownloadEngine,
    pub(crate) transport: Arc<MockTransport>,
    pub(crate) store: Arc<MemoryStore>,
    pub(crate) env: ManualEnvironment,
    pub(crate) temp_dir: TempDir,
}

/// Two slots, fast retries, progress on every chunk
pub(crate) fn test_config() -> Config {
    let mut config = Config::default();
    config.limits.max_active_downloads = 2;
    config.retry.initial_delay = Duration::from_millis(10);
    config.retry.max_delay = Duration::from_millis(50);
    config.retry.jitter = false;
    config.transfer.progress_interval_bytes = 1;
    config.transfer.shutdown_timeout = Duration::from_secs(2);
    config
}

/// Helper to create a test engine with the default test config.
/// The returned struct owns the tempdir, which must be kept alive.
pub(crate) async fn create_test_engine() -> TestEngine {
    create_test_engine_with(test_config()).await
}

pub(crate) async fn create_test_engine_with(config: Config) -> TestEngine {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::default());
    let store = Arc::new(MemoryStore::new());
    let env = ManualEnvironment::new();

    let components =
        EngineComponents::new(store.clone(), transport.clone(), Arc::new(env.clone()));
    let engine = DownloadEngine::new(config, components).await.unwrap();

    TestEngine {
        engine,
        transport,
        store,
        env,
        temp_dir,
    }
}

impl TestEngine {
    pub(crate) fn download_dir(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("downloads")
    }

    /// Fresh record for `url` writing into the download dir
    pub(crate) fn record(&self, url: &str, file_name: &str) -> TaskRecord {
        TaskRecord::new(url, self.download_dir(), file_name)
    }

    /// Script `reply` for `url` and add a task for it
    pub(crate) async fn add(&self, url: &str, file_name: &str, reply: Reply) -> TaskId {
        self.transport.reply(url, reply);
        let record = self.record(url, file_name);
        self.engine.add(&record).await.unwrap();
        record.id
    }

    /// Insert a record without running it
    pub(crate) async fn insert(&self, record: &TaskRecord) {
        self.store.insert(record).await.unwrap();
    }

    pub(crate) async fn stored(&self, id: TaskId) -> Option<TaskRecord> {
        self.store.get_by_id(id).await.unwrap()
    }

    /// Poll until the stored status is `status`
    pub(crate) async fn wait_for_status(&self, id: TaskId, status: StatusCode) -> TaskRecord {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            if let Some(record) = self.stored(id).await
                && record.status == status
            {
                return record;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "task {id} never reached {status}, last seen {:?}",
                self.stored(id).await.map(|r| r.status)
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until `id` has a live worker
    pub(crate) async fn wait_for_active(&self, id: TaskId) {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        while !self.engine.active_ids().await.contains(&id) {
            assert!(tokio::time::Instant::now() < deadline, "task {id} never became active");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Poll until no worker is live
    pub(crate) async fn wait_idle(&self) {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        while !self.engine.active_ids().await.is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "workers never went idle");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Receive events until one matches `pred`
pub(crate) async fn wait_for_event<F>(rx: &mut broadcast::Receiver<Event>, pred: F) -> Event
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(WAIT_TIMEOUT, async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}
