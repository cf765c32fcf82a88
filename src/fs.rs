//! File-system primitives used by the worker and the post-processor

use crate::error::FsError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// File operations the engine needs
///
/// Implementations must be cheap to share; the engine holds one behind an `Arc`.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Path of `name` inside `dir`
    fn resolve_path(&self, dir: &Path, name: &str) -> PathBuf {
        dir.join(name)
    }

    /// Length of the file in bytes, `None` if it does not exist
    async fn file_len(&self, path: &Path) -> Result<Option<u64>, FsError>;

    /// Move `src_dir/src_name` to `dst_dir/dst_name`, creating `dst_dir`
    ///
    /// Fails with [`FsError::AlreadyExists`] when the destination exists and
    /// `overwrite` is false. Returns the destination path.
    async fn move_file(
        &self,
        src_dir: &Path,
        src_name: &str,
        dst_dir: &Path,
        dst_name: &str,
        overwrite: bool,
    ) -> Result<PathBuf, FsError>;

    /// Delete a file; fails with [`FsError::NotFound`] if it is missing
    async fn delete_file(&self, path: &Path) -> Result<(), FsError>;
}

/// [`FileSystem`] backed by the local disk via `tokio::fs`
#[derive(Clone, Debug, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Create a new local file system handle
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn file_len(&self, path: &Path) -> Result<Option<u64>, FsError> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FsError::from_io(path, e)),
        }
    }

    async fn move_file(
        &self,
        src_dir: &Path,
        src_name: &str,
        dst_dir: &Path,
        dst_name: &str,
        overwrite: bool,
    ) -> Result<PathBuf, FsError> {
        let src = self.resolve_path(src_dir, src_name);
        let dst = self.resolve_path(dst_dir, dst_name);

        if src == dst {
            return Ok(dst);
        }
        if !tokio::fs::try_exists(&src)
            .await
            .map_err(|e| FsError::from_io(&src, e))?
        {
            return Err(FsError::NotFound(src));
        }
        if !overwrite
            && tokio::fs::try_exists(&dst)
                .await
                .map_err(|e| FsError::from_io(&dst, e))?
        {
            return Err(FsError::AlreadyExists(dst));
        }

        tokio::fs::create_dir_all(dst_dir)
            .await
            .map_err(|e| FsError::from_io(dst_dir, e))?;

        match tokio::fs::rename(&src, &dst).await {
            Ok(()) => {}
            // rename(2) cannot cross mount points
            Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                tracing::debug!(
                    src = %src.display(),
                    dst = %dst.display(),
                    "cross-device move, falling back to copy"
                );
                tokio::fs::copy(&src, &dst)
                    .await
                    .map_err(|e| FsError::from_io(&dst, e))?;
                tokio::fs::remove_file(&src)
                    .await
                    .map_err(|e| FsError::from_io(&src, e))?;
            }
            Err(e) => return Err(FsError::from_io(&dst, e)),
        }

        Ok(dst)
    }

    async fn delete_file(&self, path: &Path) -> Result<(), FsError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }
}
