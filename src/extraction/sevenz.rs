use crate::error::ExtractError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Archive extractor for 7z files
pub struct SevenZipExtractor;

impl SevenZipExtractor {
    /// Extract `archive_path` into `dest_path`
    ///
    /// Returns the files that did not exist in `dest_path` before extraction.
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        debug!(?archive_path, ?dest_path, "attempting 7z extraction");

        std::fs::create_dir_all(dest_path).map_err(|e| ExtractError::Io {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to create destination: {}", e),
        })?;

        let before: HashSet<PathBuf> = Self::collect_files(archive_path, dest_path)?
            .into_iter()
            .collect();

        sevenz_rust::decompress_file(archive_path, dest_path).map_err(|e| {
            let reason = format!("failed to extract 7z archive: {}", e);
            let lower = reason.to_lowercase();
            if lower.contains("unsupported") || lower.contains("signature") {
                ExtractError::UnknownFormat {
                    archive: archive_path.to_path_buf(),
                    reason,
                }
            } else {
                ExtractError::Io {
                    archive: archive_path.to_path_buf(),
                    reason,
                }
            }
        })?;

        Self::validate_extracted_paths(archive_path, dest_path)?;

        let extracted_files: Vec<PathBuf> = Self::collect_files(archive_path, dest_path)?
            .into_iter()
            .filter(|path| !before.contains(path))
            .collect();

        info!(
            ?archive_path,
            extracted_count = extracted_files.len(),
            "7z extraction successful"
        );
        Ok(extracted_files)
    }

    /// Reject extracted entries that resolve outside the destination
    fn validate_extracted_paths(archive_path: &Path, dest_path: &Path) -> Result<(), ExtractError> {
        let io_error = |reason: String| ExtractError::Io {
            archive: archive_path.to_path_buf(),
            reason,
        };
        let canonical_dest = dest_path
            .canonicalize()
            .map_err(|e| io_error(format!("failed to canonicalize destination path: {}", e)))?;

        for path in Self::collect_files(archive_path, dest_path)? {
            let canonical = path
                .canonicalize()
                .map_err(|e| io_error(format!("failed to canonicalize extracted path: {}", e)))?;
            if !canonical.starts_with(&canonical_dest) {
                return Err(io_error(format!(
                    "path traversal detected: extracted file {:?} is outside destination",
                    canonical
                )));
            }
        }
        Ok(())
    }

    /// Recursively collect all files (not directories) below `dir`
    fn collect_files(archive_path: &Path, dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
        fn visit_dir(dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    visit_dir(&path, files)?;
                } else {
                    files.push(path);
                }
            }
            Ok(())
        }

        let mut files = Vec::new();
        visit_dir(dir, &mut files).map_err(|e| ExtractError::Io {
            archive: archive_path.to_path_buf(),
            reason: format!("failed to read directory: {}", e),
        })?;
        Ok(files)
    }
}
