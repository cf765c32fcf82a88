//! Move-after-download stage

use crate::config::{FileCollisionAction, PostProcessConfig};
use crate::error::{FsError, PostProcessError};
use crate::fs::FileSystem;
use crate::types::TaskRecord;
use crate::utils::get_unique_path;
use tracing::{debug, info};

/// Execute the move stage
///
/// Skipped when moving is disabled, no target is set, or the file already
/// lives in the target directory.
pub(crate) async fn run_move_stage(
    fs: &dyn FileSystem,
    record: &mut TaskRecord,
    config: &PostProcessConfig,
) -> Result<(), PostProcessError> {
    let Some(target_dir) = config.move_target() else {
        return Ok(());
    };
    if target_dir == record.dir_path {
        debug!(task_id = %record.id, "file already in move target, skipping move");
        return Ok(());
    }

    let source_path = fs.resolve_path(&record.dir_path, &record.file_name);
    let wanted = fs.resolve_path(target_dir, &record.file_name);

    let (dest_name, overwrite) = match config.file_collision {
        FileCollisionAction::Overwrite => (record.file_name.clone(), true),
        FileCollisionAction::Fail => (record.file_name.clone(), false),
        FileCollisionAction::Rename => {
            let unique = get_unique_path(&wanted, FileCollisionAction::Rename).map_err(|e| {
                PostProcessError::MoveFailed {
                    source_path: source_path.clone(),
                    dest_path: wanted.clone(),
                    reason: e.to_string(),
                }
            })?;
            let name = unique
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .unwrap_or_else(|| record.file_name.clone());
            (name, false)
        }
    };

    let moved = fs
        .move_file(
            &record.dir_path,
            &record.file_name,
            target_dir,
            &dest_name,
            overwrite,
        )
        .await
        .map_err(|e| match e {
            FsError::AlreadyExists(dest_path) => PostProcessError::MoveAlreadyExists { dest_path },
            other => PostProcessError::MoveFailed {
                source_path: source_path.clone(),
                dest_path: fs.resolve_path(target_dir, &dest_name),
                reason: other.to_string(),
            },
        })?;

    info!(task_id = %record.id, from = ?source_path, to = ?moved, "moved finished download");

    record.dir_path = target_dir.to_path_buf();
    record.file_name = dest_name;
    Ok(())
}
