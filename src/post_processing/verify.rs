//! Checksum verification stage

use crate::checksum;
use crate::error::PostProcessError;
use crate::fs::FileSystem;
use crate::types::TaskRecord;
use tracing::{debug, warn};

/// Execute the verify stage
///
/// Skipped when the task has no expected digest.
pub(crate) async fn run_verify_stage(
    fs: &dyn FileSystem,
    record: &TaskRecord,
) -> Result<(), PostProcessError> {
    let Some(expected) = record.expected_checksum() else {
        debug!(task_id = %record.id, "no checksum configured, skipping verification");
        return Ok(());
    };

    let path = fs.resolve_path(&record.dir_path, &record.file_name);
    if checksum::verify(&path, expected).await? {
        debug!(task_id = %record.id, ?path, "checksum verified");
        Ok(())
    } else {
        warn!(task_id = %record.id, ?path, "checksum verification failed");
        Err(PostProcessError::ChecksumMismatch { file: path })
    }
}
