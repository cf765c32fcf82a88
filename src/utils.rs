//! Utility functions for file operations and path manipulation

use crate::config::FileCollisionAction;
use crate::error::FsError;
use std::path::{Path, PathBuf};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Filename used when nothing better can be derived
pub const FALLBACK_FILE_NAME: &str = "download";

/// Get the path a file should be written to, handling an existing file per `action`
///
/// - `Overwrite` returns `path` unchanged.
/// - `Fail` fails with [`FsError::AlreadyExists`] if `path` exists.
/// - `Rename` appends ` (1)`, ` (2)`, ... to the stem until the name is free.
///
/// # Examples
///
/// ```
/// use download_engine::utils::get_unique_path;
/// use download_engine::config::FileCollisionAction;
/// use std::path::Path;
///
/// let path = Path::new("/tmp/does-not-exist/movie.mkv");
/// let unique = get_unique_path(path, FileCollisionAction::Rename).unwrap();
/// assert_eq!(unique, path);
/// ```
pub fn get_unique_path(path: &Path, action: FileCollisionAction) -> Result<PathBuf, FsError> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Fail => {
            if path.exists() {
                return Err(FsError::AlreadyExists(path.to_path_buf()));
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let invalid = |reason: &str| FsError::Io {
                path: path.to_path_buf(),
                reason: reason.to_string(),
            };
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| invalid("cannot extract file stem"))?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path
                .parent()
                .ok_or_else(|| invalid("cannot extract parent directory"))?;

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let new_path = parent.join(new_name);
                if !new_path.exists() {
                    return Ok(new_path);
                }
            }

            Err(FsError::AlreadyExists(path.to_path_buf()))
        }
    }
}

/// Derive a filename from the last path segment of a URL
///
/// Falls back to [`FALLBACK_FILE_NAME`] when the URL has no usable segment.
///
/// ```
/// use download_engine::utils::file_name_from_url;
///
/// assert_eq!(file_name_from_url("https://example.com/files/archive.zip?x=1"), "archive.zip");
/// assert_eq!(file_name_from_url("https://example.com/"), "download");
/// ```
pub fn file_name_from_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url)
        && let Some(mut segments) = parsed.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        return sanitize_file_name(last);
    }
    FALLBACK_FILE_NAME.to_string()
}

/// Replace characters that are not allowed in filenames
fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.trim_matches('.') {
        "" => FALLBACK_FILE_NAME.to_string(),
        _ => cleaned,
    }
}
