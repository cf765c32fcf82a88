//! Checksum verification for finished downloads
//!
//! The digest kind is inferred from the expected value: 32 hex characters
//! select MD5, 64 select SHA-256. Files are hashed on a blocking thread in
//! fixed-size chunks so large downloads never sit in memory.

use crate::error::PostProcessError;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Read buffer size used while hashing
const HASH_BUFFER_SIZE: usize = 8 * 1024;

/// Supported digest algorithms
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestKind {
    /// 128-bit MD5, 32 hex characters
    Md5,
    /// 256-bit SHA-2, 64 hex characters
    Sha256,
}

impl DigestKind {
    /// Infer the digest kind from an expected checksum string
    pub fn detect(checksum: &str) -> Option<Self> {
        let checksum = checksum.trim();
        if !checksum.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        match checksum.len() {
            32 => Some(DigestKind::Md5),
            64 => Some(DigestKind::Sha256),
            _ => None,
        }
    }
}

/// Verify `path` against `expected`
///
/// Returns `Ok(true)` when the digest matches (case-insensitive) or `expected`
/// is empty, `Ok(false)` on mismatch or when the file cannot be read, and
/// [`PostProcessError::UnknownChecksumFormat`] when `expected` has neither shape.
pub async fn verify(path: &Path, expected: &str) -> Result<bool, PostProcessError> {
    let expected = expected.trim();
    if expected.is_empty() {
        return Ok(true);
    }

    let kind = DigestKind::detect(expected).ok_or_else(|| {
        PostProcessError::UnknownChecksumFormat {
            checksum: expected.to_string(),
        }
    })?;

    match compute(path, kind).await {
        Ok(actual) => {
            let matched = actual.eq_ignore_ascii_case(expected);
            if !matched {
                tracing::debug!(
                    path = %path.display(),
                    ?kind,
                    expected,
                    actual = %actual,
                    "checksum mismatch"
                );
            }
            Ok(matched)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unable to hash file for verification");
            Ok(false)
        }
    }
}

/// Compute the lowercase hex digest of `path`
pub async fn compute(path: &Path, kind: DigestKind) -> std::io::Result<String> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || compute_blocking(&path, kind))
        .await
        .map_err(|e| std::io::Error::other(format!("hashing task failed: {}", e)))?
}

fn compute_blocking(path: &Path, kind: DigestKind) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    match kind {
        DigestKind::Md5 => {
            let mut context = md5::Context::new();
            loop {
                let read = file.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                context.consume(&buffer[..read]);
            }
            Ok(format!("{:x}", context.compute()))
        }
        DigestKind::Sha256 => {
            let mut hasher = Sha256::new();
            loop {
                let read = file.read(&mut buffer)?;
                if read == 0 {
                    break;
                }
                hasher.update(&buffer[..read]);
            }
            Ok(format!("{:x}", hasher.finalize()))
        }
    }
}
