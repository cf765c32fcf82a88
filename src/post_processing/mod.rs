//! Post-processing pipeline for completed downloads
//!
//! Runs once per successful transfer, before the task counts as done:
//! 1. Verify - checksum check when the task carries an expected digest
//! 2. Move - relocate the file when moving after download is configured
//! 3. Extract - unpack archives for tasks flagged for extraction
//!
//! Each stage aborts the pipeline on failure; later stages never run after an
//! earlier one failed.

use crate::config::PostProcessConfig;
use crate::error::PostProcessError;
use crate::extraction::ArchiveExtractor;
use crate::fs::FileSystem;
use crate::types::{StatusCode, TaskRecord};
use std::sync::Arc;
use tracing::{debug, info};

mod extract;
mod relocate;
mod verify;

use extract::run_extract_stage;
use relocate::run_move_stage;
use verify::run_verify_stage;

/// Post-processing pipeline executor
#[derive(Clone)]
pub struct PostProcessor {
    fs: Arc<dyn FileSystem>,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl PostProcessor {
    /// Create a pipeline over the given file system and extractor
    pub fn new(fs: Arc<dyn FileSystem>, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        Self { fs, extractor }
    }

    /// Run verify, move and extract for a finished download
    ///
    /// On success `record` reflects the file's final location. On failure the
    /// record keeps its last good location and the error names the failed stage.
    pub async fn run(
        &self,
        record: &mut TaskRecord,
        config: &PostProcessConfig,
    ) -> Result<(), PostProcessError> {
        info!(
            task_id = %record.id,
            file = %record.file_name,
            "starting post-processing pipeline"
        );

        run_verify_stage(self.fs.as_ref(), record).await?;
        run_move_stage(self.fs.as_ref(), record, config).await?;
        run_extract_stage(self.fs.as_ref(), self.extractor.as_ref(), record).await?;

        debug!(task_id = %record.id, "post-processing complete");
        Ok(())
    }
}

/// Terminal status for a pipeline failure
pub fn failure_status(error: &PostProcessError) -> StatusCode {
    match error {
        PostProcessError::ChecksumMismatch { .. }
        | PostProcessError::UnknownChecksumFormat { .. } => StatusCode::ChecksumError,
        PostProcessError::MoveAlreadyExists { .. }
        | PostProcessError::MoveFailed { .. }
        | PostProcessError::ExtractUnknownFormat { .. }
        | PostProcessError::ExtractIo { .. } => StatusCode::Error,
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
