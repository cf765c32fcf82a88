//! Core types for download-engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// MIME type assumed when the transport does not report one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Unique identifier for a download task
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a fresh random id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TaskId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Task status
///
/// Codes live in the HTTP-like numeric range so that HTTP failures reported by
/// the transport pass straight through as [`StatusCode::Http`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    /// Waiting for an execution slot
    Queued,
    /// Transfer in progress
    Running,
    /// Paused by the user
    Paused,
    /// Transient failure, will be re-run
    WaitingToRetry,
    /// Parked until the network becomes suitable
    WaitingForNetwork,
    /// Stopped by the engine (environment policy, parameter change)
    Stopped,
    /// Downloaded and post-processed
    Success,
    /// Server requires authorization
    Unauthorized,
    /// Proxy requires authorization
    ProxyAuthRequired,
    /// Downloaded file failed checksum verification
    ChecksumError,
    /// Generic terminal failure
    Error,
    /// Any other HTTP failure status passed through from the transport
    Http(u16),
}

impl StatusCode {
    /// Convert StatusCode enum to its numeric code
    pub fn to_i32(&self) -> i32 {
        match self {
            StatusCode::Queued => 190,
            StatusCode::Running => 192,
            StatusCode::Paused => 193,
            StatusCode::WaitingToRetry => 194,
            StatusCode::WaitingForNetwork => 195,
            StatusCode::Stopped => 197,
            StatusCode::Success => 200,
            StatusCode::Unauthorized => 401,
            StatusCode::ProxyAuthRequired => 407,
            StatusCode::Error => 491,
            StatusCode::ChecksumError => 498,
            StatusCode::Http(code) => i32::from(*code),
        }
    }

    /// Convert a numeric code back to StatusCode
    pub fn from_i32(code: i32) -> Self {
        match code {
            190 => StatusCode::Queued,
            192 => StatusCode::Running,
            193 => StatusCode::Paused,
            194 => StatusCode::WaitingToRetry,
            195 => StatusCode::WaitingForNetwork,
            197 => StatusCode::Stopped,
            200 => StatusCode::Success,
            401 => StatusCode::Unauthorized,
            407 => StatusCode::ProxyAuthRequired,
            491 => StatusCode::Error,
            498 => StatusCode::ChecksumError,
            400..=599 => StatusCode::Http(code as u16),
            _ => StatusCode::Error, // Unknown codes are treated as failures
        }
    }

    /// Map an HTTP failure status onto the closed enumeration
    pub fn from_http(status: u16) -> Self {
        match status {
            401 => StatusCode::Unauthorized,
            407 => StatusCode::ProxyAuthRequired,
            400..=599 => StatusCode::Http(status),
            _ => StatusCode::Error,
        }
    }

    /// Paused or stopped, i.e. resumable by an explicit pause/resume toggle
    pub fn is_stopped_or_paused(&self) -> bool {
        matches!(self, StatusCode::Paused | StatusCode::Stopped)
    }

    /// Any member of the error family
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            StatusCode::Unauthorized
                | StatusCode::ProxyAuthRequired
                | StatusCode::ChecksumError
                | StatusCode::Error
                | StatusCode::Http(_)
        )
    }

    /// Success or any error
    pub fn is_finished(&self) -> bool {
        *self == StatusCode::Success || self.is_error()
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusCode::Queued => write!(f, "queued"),
            StatusCode::Running => write!(f, "running"),
            StatusCode::Paused => write!(f, "paused"),
            StatusCode::WaitingToRetry => write!(f, "waiting_to_retry"),
            StatusCode::WaitingForNetwork => write!(f, "waiting_for_network"),
            StatusCode::Stopped => write!(f, "stopped"),
            StatusCode::Success => write!(f, "success"),
            StatusCode::Unauthorized => write!(f, "unauthorized"),
            StatusCode::ProxyAuthRequired => write!(f, "proxy_auth_required"),
            StatusCode::ChecksumError => write!(f, "checksum_error"),
            StatusCode::Error => write!(f, "error"),
            StatusCode::Http(code) => write!(f, "http_{code}"),
        }
    }
}

/// Persistent record of one download task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Task identifier
    pub id: TaskId,
    /// Source URL
    pub url: String,
    /// Directory the file is written to
    pub dir_path: PathBuf,
    /// Target filename inside `dir_path`
    pub file_name: String,
    /// Free-form description
    pub description: Option<String>,
    /// MIME type, learned from the transport when available
    pub mime_type: String,
    /// Current status
    pub status: StatusCode,
    /// Human-readable detail for the current status (usually an error message)
    pub status_msg: Option<String>,
    /// Expected digest: 32 hex chars for MD5, 64 for SHA-256
    pub checksum: Option<String>,
    /// Whether transient failures are retried automatically
    pub retry: bool,
    /// Automatic retries consumed so far
    pub num_failed: u32,
    /// Only run on unmetered networks
    pub unmetered_only: bool,
    /// Extract the file after download if it is an archive
    pub uncompress_archive: bool,
    /// Total size in bytes, if known
    pub total_bytes: Option<u64>,
    /// Bytes written so far
    pub downloaded_bytes: u64,
    /// When the task was created
    pub date_added: DateTime<Utc>,
}

impl TaskRecord {
    /// Create a queued record with default flags
    pub fn new(
        url: impl Into<String>,
        dir_path: impl Into<PathBuf>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: TaskId::new(),
            url: url.into(),
            dir_path: dir_path.into(),
            file_name: file_name.into(),
            description: None,
            mime_type: DEFAULT_MIME_TYPE.to_string(),
            status: StatusCode::Queued,
            status_msg: None,
            checksum: None,
            retry: true,
            num_failed: 0,
            unmetered_only: false,
            uncompress_archive: false,
            total_bytes: None,
            downloaded_bytes: 0,
            date_added: Utc::now(),
        }
    }

    /// Full path of the target file
    pub fn file_path(&self) -> PathBuf {
        self.dir_path.join(&self.file_name)
    }

    /// Expected digest, treating an empty string as "none"
    pub fn expected_checksum(&self) -> Option<&str> {
        self.checksum.as_deref().filter(|c| !c.trim().is_empty())
    }
}

/// Sparse patch applied by [`DownloadEngine::change_params`](crate::DownloadEngine::change_params)
///
/// `None` means "no change". `Some(String::new())` is a real value (e.g. clears a checksum).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeableParams {
    /// New source URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New unmetered-only flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmetered_only: Option<bool>,
    /// New retry flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<bool>,
    /// New expected checksum (empty string clears it)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// New filename
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// New directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir_path: Option<PathBuf>,
}

impl ChangeableParams {
    /// True when no field is set
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.description.is_none()
            && self.unmetered_only.is_none()
            && self.retry.is_none()
            && self.checksum.is_none()
            && self.file_name.is_none()
            && self.dir_path.is_none()
    }
}

/// Event emitted during the task lifecycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Worker started transferring
    Started {
        /// Task ID
        id: TaskId,
    },

    /// Transfer progress
    Progress {
        /// Task ID
        id: TaskId,
        /// Bytes written so far
        downloaded_bytes: u64,
        /// Total size, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        total_bytes: Option<u64>,
    },

    /// Worker paused on request
    Paused {
        /// Task ID
        id: TaskId,
    },

    /// Worker stopped on request
    Stopped {
        /// Task ID
        id: TaskId,
    },

    /// Transient failure; the task will be re-run
    Retrying {
        /// Task ID
        id: TaskId,
        /// Retry number (1-based)
        attempt: u32,
        /// Error that triggered the retry
        error: String,
    },

    /// Task parked until the network is suitable
    WaitingForNetwork {
        /// Task ID
        id: TaskId,
    },

    /// Task reached a terminal status
    Finished {
        /// Task ID
        id: TaskId,
        /// Final status
        status: StatusCode,
    },

    /// Moving the finished file failed
    MoveFailed {
        /// Task ID
        id: TaskId,
        /// Filename of the task
        file_name: String,
        /// Error message
        error: String,
    },

    /// Moving the finished file failed because the destination exists
    MoveAlreadyExists {
        /// Task ID
        id: TaskId,
        /// Filename of the task
        file_name: String,
    },

    /// The archive format is unknown or unsupported
    ExtractUnknownFormat {
        /// Task ID
        id: TaskId,
        /// Filename of the task
        file_name: String,
    },

    /// Archive extraction failed
    ExtractFailed {
        /// Task ID
        id: TaskId,
        /// Filename of the task
        file_name: String,
        /// Error message
        error: String,
    },

    /// Server or proxy asked for credentials
    AuthorizationRequired {
        /// Task ID
        id: TaskId,
        /// True for HTTP 407
        proxy: bool,
    },

    /// Parameter change accepted and being applied
    ApplyingParams {
        /// Task ID
        id: TaskId,
    },

    /// Parameter change finished
    ParamsApplied {
        /// Task ID
        id: TaskId,
        /// Error message when applying failed
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Task removed
    Removed {
        /// Task ID
        id: TaskId,
    },

    /// The last active task finished
    DownloadsCompleted,

    /// Environment policy stopped all downloads
    QueueStopped,

    /// Environment policy resumed downloads
    QueueResumed,

    /// Global speed limit changed
    SpeedLimitChanged {
        /// New limit in bytes per second (None = unlimited)
        limit_bps: Option<u64>,
    },

    /// Engine shut down
    Shutdown,
}
