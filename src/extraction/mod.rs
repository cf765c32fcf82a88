//! Archive extraction for finished downloads
//!
//! ZIP and 7z are decoded in process. The format is detected from the file's
//! magic bytes first, then from the MIME type and the extension. Anything else
//! fails with [`ExtractError::UnknownFormat`].

mod sevenz;
mod zip;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use sevenz::SevenZipExtractor;
pub use zip::ZipExtractor;

use crate::error::ExtractError;
use async_trait::async_trait;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const SEVEN_ZIP_MAGIC: &[u8] = b"7z\xBC\xAF\x27\x1C";

/// MIME types treated as archives when deciding whether to extract
const ARCHIVE_MIME_TYPES: &[&str] = &[
    "application/zip",
    "application/x-zip-compressed",
    "application/x-7z-compressed",
    "application/x-rar-compressed",
    "application/vnd.rar",
    "application/x-tar",
    "application/gzip",
    "application/x-gzip",
    "application/x-bzip2",
    "application/x-xz",
    "application/java-archive",
];

/// Archive formats that can be extracted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveType {
    /// PKZIP
    Zip,
    /// 7-Zip
    SevenZip,
}

/// Whether `mime_type` names an archive format
pub fn is_archive_mime(mime_type: &str) -> bool {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    ARCHIVE_MIME_TYPES.contains(&mime_type.as_str())
}

/// Detect the archive type of `path`
///
/// Magic bytes win over the MIME type, which wins over the extension.
pub fn detect_archive_type(path: &Path, mime_type: &str) -> Option<ArchiveType> {
    if let Some(kind) = sniff_magic(path) {
        return Some(kind);
    }

    match mime_type.trim().to_ascii_lowercase().as_str() {
        "application/zip" | "application/x-zip-compressed" => return Some(ArchiveType::Zip),
        "application/x-7z-compressed" => return Some(ArchiveType::SevenZip),
        _ => {}
    }

    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "zip" => Some(ArchiveType::Zip),
        "7z" => Some(ArchiveType::SevenZip),
        _ => None,
    }
}

fn sniff_magic(path: &Path) -> Option<ArchiveType> {
    let mut header = [0u8; 6];
    let mut file = std::fs::File::open(path).ok()?;
    let read = file.read(&mut header).ok()?;
    let header = &header[..read];

    if header.starts_with(SEVEN_ZIP_MAGIC) {
        Some(ArchiveType::SevenZip)
    } else if header.starts_with(ZIP_MAGIC) {
        Some(ArchiveType::Zip)
    } else {
        None
    }
}

/// Decodes an archive into a directory
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    /// Extract `archive` into `dest`, returning the extracted files
    async fn extract(
        &self,
        archive: &Path,
        mime_type: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError>;
}

/// [`ArchiveExtractor`] for ZIP and 7z, run on a blocking thread
#[derive(Clone, Debug, Default)]
pub struct DefaultArchiveExtractor;

impl DefaultArchiveExtractor {
    /// Create a new extractor
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ArchiveExtractor for DefaultArchiveExtractor {
    async fn extract(
        &self,
        archive: &Path,
        mime_type: &str,
        dest: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        let archive_type =
            detect_archive_type(archive, mime_type).ok_or_else(|| ExtractError::UnknownFormat {
                archive: archive.to_path_buf(),
                reason: format!("unsupported archive type (mime {})", mime_type),
            })?;

        info!(?archive, ?archive_type, ?dest, "extracting archive");

        let archive_owned = archive.to_path_buf();
        let dest_owned = dest.to_path_buf();
        tokio::task::spawn_blocking(move || match archive_type {
            ArchiveType::Zip => ZipExtractor::extract(&archive_owned, &dest_owned),
            ArchiveType::SevenZip => SevenZipExtractor::extract(&archive_owned, &dest_owned),
        })
        .await
        .map_err(|e| ExtractError::Io {
            archive: archive.to_path_buf(),
            reason: format!("extraction task failed: {}", e),
        })?
    }
}
