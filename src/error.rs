//! Error types for download-engine
//!
//! Errors are grouped by the layer that produces them:
//! - [`StorageError`] for the task store
//! - [`TransferError`] for the network transport and the worker's file writes
//! - [`FsError`] for file-system primitives
//! - [`ExtractError`] for archive decoding
//! - [`PostProcessError`] for the verify, move and extract pipeline
//!
//! Everything folds into [`Error`] through `#[from]` conversions.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for download-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for download-engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_active_downloads")
        key: Option<String>,
    },

    /// Task store operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Network transfer failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// File-system primitive failed
    #[error("file system error: {0}")]
    Fs(#[from] FsError),

    /// Post-processing error (verify, move, extract)
    #[error("post-processing error: {0}")]
    PostProcess(#[from] PostProcessError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Task not found in the store
    #[error("task not found: {0}")]
    NotFound(String),

    /// Shutdown in progress - not accepting new runs
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Task store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to connect to the backing database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Stored row could not be decoded into a task record
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Network transfer errors
///
/// Whether a transfer error is worth retrying is decided by
/// [`IsRetryable`](crate::retry::IsRetryable).
#[derive(Debug, Error)]
pub enum TransferError {
    /// The server answered with a non-success HTTP status
    #[error("HTTP {status} from {url}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// The request or a body read timed out
    #[error("timed out: {0}")]
    Timeout(String),

    /// Could not establish a connection
    #[error("connection failed: {0}")]
    Connect(String),

    /// The response body stream broke off
    #[error("stream interrupted: {0}")]
    Stream(String),

    /// The URL could not be parsed or uses an unsupported scheme
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Writing received bytes to the target file failed
    #[error("failed to write {path}: {reason}")]
    Write {
        /// Target file
        path: PathBuf,
        /// Underlying I/O failure
        reason: String,
    },
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransferError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransferError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            TransferError::Http {
                status: status.as_u16(),
                url: e.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            TransferError::Stream(e.to_string())
        }
    }
}

/// File-system primitive errors
#[derive(Debug, Error)]
pub enum FsError {
    /// Destination already exists and overwriting was not allowed
    #[error("{0} already exists")]
    AlreadyExists(PathBuf),

    /// File does not exist
    #[error("{0} not found")]
    NotFound(PathBuf),

    /// Any other I/O failure
    #[error("I/O error on {path}: {reason}")]
    Io {
        /// Path the operation was applied to
        path: PathBuf,
        /// The reason the operation failed
        reason: String,
    },
}

impl FsError {
    /// Wrap an I/O error for `path`, keeping `NotFound` and `AlreadyExists` distinct
    pub fn from_io(path: &std::path::Path, e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_path_buf()),
            _ => FsError::Io {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        }
    }
}

/// Archive decoding errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The archive format is unknown or unsupported
    #[error("unknown archive format for {archive}: {reason}")]
    UnknownFormat {
        /// The archive that could not be decoded
        archive: PathBuf,
        /// Why the format was rejected
        reason: String,
    },

    /// Reading the archive or writing an entry failed
    #[error("extraction of {archive} failed: {reason}")]
    Io {
        /// The archive being extracted
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },
}

/// Post-processing errors (checksum, move, extract)
#[derive(Debug, Error)]
pub enum PostProcessError {
    /// Computed digest differs from the expected one
    #[error("checksum mismatch for {file}")]
    ChecksumMismatch {
        /// The verified file
        file: PathBuf,
    },

    /// Expected digest is neither 32 nor 64 hex characters
    #[error("unknown checksum format: {checksum:?}")]
    UnknownChecksumFormat {
        /// The rejected digest string
        checksum: String,
    },

    /// Move destination already exists
    #[error("cannot move to {dest_path}: file already exists")]
    MoveAlreadyExists {
        /// The destination that was occupied
        dest_path: PathBuf,
    },

    /// File move/rename failed
    #[error("failed to move {source_path} to {dest_path}: {reason}")]
    MoveFailed {
        /// The source path of the file being moved
        source_path: PathBuf,
        /// The destination path where the file should be moved
        dest_path: PathBuf,
        /// The reason the move failed
        reason: String,
    },

    /// Archive format unknown or unsupported
    #[error("cannot extract {archive}: {reason}")]
    ExtractUnknownFormat {
        /// The archive file
        archive: PathBuf,
        /// The reason the format was rejected
        reason: String,
    },

    /// Archive extraction failed while reading or writing
    #[error("extraction failed for {archive}: {reason}")]
    ExtractIo {
        /// The archive file that failed to extract
        archive: PathBuf,
        /// The reason extraction failed
        reason: String,
    },
}

impl From<ExtractError> for PostProcessError {
    fn from(e: ExtractError) -> Self {
        match e {
            ExtractError::UnknownFormat { archive, reason } => {
                PostProcessError::ExtractUnknownFormat { archive, reason }
            }
            ExtractError::Io { archive, reason } => PostProcessError::ExtractIo { archive, reason },
        }
    }
}

impl Error {
    /// Machine-readable error code, stable across releases
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Storage(_) => "storage_error",
            Error::Transfer(e) => match e {
                TransferError::Http { .. } => "http_error",
                TransferError::Timeout(_) => "timeout",
                TransferError::Connect(_) => "connect_error",
                TransferError::Stream(_) => "stream_error",
                TransferError::InvalidUrl(_) => "invalid_url",
                TransferError::Write { .. } => "write_error",
            },
            Error::Fs(e) => match e {
                FsError::AlreadyExists(_) => "already_exists",
                FsError::NotFound(_) => "file_not_found",
                FsError::Io { .. } => "fs_error",
            },
            Error::PostProcess(e) => match e {
                PostProcessError::ChecksumMismatch { .. } => "checksum_mismatch",
                PostProcessError::UnknownChecksumFormat { .. } => "unknown_checksum_format",
                PostProcessError::MoveAlreadyExists { .. } => "move_already_exists",
                PostProcessError::MoveFailed { .. } => "move_failed",
                PostProcessError::ExtractUnknownFormat { .. } => "extract_unknown_format",
                PostProcessError::ExtractIo { .. } => "extract_failed",
            },
            Error::Io(_) => "io_error",
            Error::NotFound(_) => "not_found",
            Error::ShuttingDown => "shutting_down",
            Error::Serialization(_) => "serialization_error",
            Error::Other(_) => "internal_error",
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn all_error_variants() -> Vec<(Error, &'static str)> {
        vec![
            (
                Error::Config {
                    message: "bad value".into(),
                    key: Some("max_active_downloads".into()),
                },
                "config_error",
            ),
            (
                Error::Storage(StorageError::QueryFailed("locked".into())),
                "storage_error",
            ),
            (
                Error::Transfer(TransferError::Http {
                    status: 404,
                    url: "http://x/a".into(),
                }),
                "http_error",
            ),
            (Error::Transfer(TransferError::Timeout("read".into())), "timeout"),
            (
                Error::Transfer(TransferError::Connect("refused".into())),
                "connect_error",
            ),
            (
                Error::Transfer(TransferError::Stream("eof".into())),
                "stream_error",
            ),
            (
                Error::Transfer(TransferError::InvalidUrl("ftp:".into())),
                "invalid_url",
            ),
            (
                Error::Transfer(TransferError::Write {
                    path: PathBuf::from("/tmp/a"),
                    reason: "disk full".into(),
                }),
                "write_error",
            ),
            (
                Error::Fs(FsError::AlreadyExists(PathBuf::from("/tmp/a"))),
                "already_exists",
            ),
            (
                Error::Fs(FsError::NotFound(PathBuf::from("/tmp/a"))),
                "file_not_found",
            ),
            (
                Error::PostProcess(PostProcessError::ChecksumMismatch {
                    file: PathBuf::from("a.bin"),
                }),
                "checksum_mismatch",
            ),
            (
                Error::PostProcess(PostProcessError::UnknownChecksumFormat {
                    checksum: "xyz".into(),
                }),
                "unknown_checksum_format",
            ),
            (
                Error::PostProcess(PostProcessError::MoveAlreadyExists {
                    dest_path: PathBuf::from("/dest/a.bin"),
                }),
                "move_already_exists",
            ),
            (
                Error::PostProcess(PostProcessError::MoveFailed {
                    source_path: PathBuf::from("/a"),
                    dest_path: PathBuf::from("/b"),
                    reason: "denied".into(),
                }),
                "move_failed",
            ),
            (
                Error::PostProcess(PostProcessError::ExtractUnknownFormat {
                    archive: PathBuf::from("a.rar"),
                    reason: "rar".into(),
                }),
                "extract_unknown_format",
            ),
            (
                Error::PostProcess(PostProcessError::ExtractIo {
                    archive: PathBuf::from("a.zip"),
                    reason: "crc".into(),
                }),
                "extract_failed",
            ),
            (Error::NotFound("task".into()), "not_found"),
            (Error::ShuttingDown, "shutting_down"),
            (Error::Other("boom".into()), "internal_error"),
        ]
    }

    #[test]
    fn every_variant_maps_to_expected_error_code() {
        for (error, expected_code) in all_error_variants() {
            assert_eq!(
                error.error_code(),
                expected_code,
                "{error} should map to {expected_code}"
            );
        }
    }

    #[test]
    fn extract_error_keeps_format_and_io_apart() {
        let unknown: PostProcessError = ExtractError::UnknownFormat {
            archive: PathBuf::from("a.rar"),
            reason: "unsupported".into(),
        }
        .into();
        assert!(matches!(
            unknown,
            PostProcessError::ExtractUnknownFormat { .. }
        ));

        let io: PostProcessError = ExtractError::Io {
            archive: PathBuf::from("a.zip"),
            reason: "truncated".into(),
        }
        .into();
        assert!(matches!(io, PostProcessError::ExtractIo { .. }));
    }

    #[test]
    fn fs_error_from_io_preserves_not_found_and_already_exists() {
        let path = std::path::Path::new("/tmp/x");
        assert!(matches!(
            FsError::from_io(path, std::io::Error::from(std::io::ErrorKind::NotFound)),
            FsError::NotFound(_)
        ));
        assert!(matches!(
            FsError::from_io(path, std::io::Error::from(std::io::ErrorKind::AlreadyExists)),
            FsError::AlreadyExists(_)
        ));
        assert!(matches!(
            FsError::from_io(path, std::io::Error::other("denied")),
            FsError::Io { .. }
        ));
    }

    #[test]
    fn display_includes_context() {
        let err = Error::PostProcess(PostProcessError::MoveFailed {
            source_path: PathBuf::from("/src/file.bin"),
            dest_path: PathBuf::from("/dst/file.bin"),
            reason: "permission denied".into(),
        });
        let msg = err.to_string();
        assert!(msg.contains("/src/file.bin"));
        assert!(msg.contains("permission denied"));
    }
}
