//! Archive extraction stage

use crate::error::PostProcessError;
use crate::extraction::{ArchiveExtractor, is_archive_mime};
use crate::fs::FileSystem;
use crate::types::{DEFAULT_MIME_TYPE, TaskRecord};
use tracing::{debug, info, warn};

/// Execute the extract stage
///
/// Runs for tasks flagged for extraction whose MIME type is an archive type or
/// unknown. The archive is deleted after a successful extraction; failing to
/// delete it does not fail the task.
pub(crate) async fn run_extract_stage(
    fs: &dyn FileSystem,
    extractor: &dyn ArchiveExtractor,
    record: &TaskRecord,
) -> Result<(), PostProcessError> {
    if !record.uncompress_archive {
        return Ok(());
    }
    if !is_archive_mime(&record.mime_type) && record.mime_type != DEFAULT_MIME_TYPE {
        debug!(
            task_id = %record.id,
            mime_type = %record.mime_type,
            "not an archive, skipping extraction"
        );
        return Ok(());
    }

    let archive = fs.resolve_path(&record.dir_path, &record.file_name);
    let files = extractor
        .extract(&archive, &record.mime_type, &record.dir_path)
        .await?;

    info!(
        task_id = %record.id,
        ?archive,
        extracted_count = files.len(),
        "archive extracted"
    );

    if let Err(e) = fs.delete_file(&archive).await {
        warn!(task_id = %record.id, ?archive, error = %e, "failed to delete extracted archive");
    }
    Ok(())
}
