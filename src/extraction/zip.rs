use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Archive extractor for ZIP files
pub struct ZipExtractor;

impl ZipExtractor {
    /// Extract every entry of `archive_path` into `dest_path`
    ///
    /// Entries whose names would escape `dest_path` are skipped.
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        debug!(?archive_path, ?dest_path, "attempting ZIP extraction");

        let io_error = |reason: String| ExtractError::Io {
            archive: archive_path.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(dest_path)
            .map_err(|e| io_error(format!("failed to create destination: {}", e)))?;

        let file = std::fs::File::open(archive_path)
            .map_err(|e| io_error(format!("failed to open ZIP archive: {}", e)))?;

        let mut archive = ::zip::ZipArchive::new(file)
            .map_err(|e| Self::map_zip_error(archive_path, "failed to read ZIP archive", e))?;

        let mut extracted_files = Vec::new();

        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| Self::map_zip_error(archive_path, "failed to read ZIP entry", e))?;

            let file_path = match entry.enclosed_name() {
                Some(path) => dest_path.join(path),
                None => {
                    warn!(?archive_path, entry = entry.name(), "skipping entry with unsafe path");
                    continue;
                }
            };

            if entry.is_dir() {
                std::fs::create_dir_all(&file_path)
                    .map_err(|e| io_error(format!("failed to create directory: {}", e)))?;
                continue;
            }

            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| io_error(format!("failed to create parent directories: {}", e)))?;
            }

            let mut outfile = std::fs::File::create(&file_path)
                .map_err(|e| io_error(format!("failed to create output file: {}", e)))?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| io_error(format!("failed to extract {}: {}", file_path.display(), e)))?;

            extracted_files.push(file_path);
        }

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "ZIP extraction successful"
        );

        Ok(extracted_files)
    }

    fn map_zip_error(archive_path: &Path, context: &str, e: ::zip::result::ZipError) -> ExtractError {
        use ::zip::result::ZipError;

        match e {
            ZipError::InvalidArchive(_) | ZipError::UnsupportedArchive(_) => {
                ExtractError::UnknownFormat {
                    archive: archive_path.to_path_buf(),
                    reason: format!("{}: {}", context, e),
                }
            }
            _ => ExtractError::Io {
                archive: archive_path.to_path_buf(),
                reason: format!("{}: {}", context, e),
            },
        }
    }
}
