use super::*;
use crate::config::FileCollisionAction;
use crate::error::{ExtractError, FsError};
use crate::extraction::DefaultArchiveExtractor;
use crate::fs::LocalFileSystem;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

const MD5_ABC: &str = "900150983cd24fb0d6963f7d28e17f72";

/// Extractor that counts calls and always succeeds
#[derive(Default)]
struct CountingExtractor {
    calls: AtomicUsize,
}

#[async_trait]
impl ArchiveExtractor for CountingExtractor {
    async fn extract(
        &self,
        _archive: &Path,
        _mime_type: &str,
        _dest: &Path,
    ) -> Result<Vec<PathBuf>, ExtractError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

/// Local file system whose deletes always fail
struct UndeletableFileSystem(LocalFileSystem);

#[async_trait]
impl FileSystem for UndeletableFileSystem {
    async fn file_len(&self, path: &Path) -> Result<Option<u64>, FsError> {
        self.0.file_len(path).await
    }

    async fn move_file(
        &self,
        src_dir: &Path,
        src_name: &str,
        dst_dir: &Path,
        dst_name: &str,
        overwrite: bool,
    ) -> Result<PathBuf, FsError> {
        self.0
            .move_file(src_dir, src_name, dst_dir, dst_name, overwrite)
            .await
    }

    async fn delete_file(&self, path: &Path) -> Result<(), FsError> {
        Err(FsError::Io {
            path: path.to_path_buf(),
            reason: "read-only".into(),
        })
    }
}

fn processor() -> PostProcessor {
    PostProcessor::new(
        Arc::new(LocalFileSystem::new()),
        Arc::new(DefaultArchiveExtractor::new()),
    )
}

fn record_with_file(dir: &Path, name: &str, content: &[u8]) -> TaskRecord {
    std::fs::write(dir.join(name), content).unwrap();
    TaskRecord::new("http://example.com/file", dir, name)
}

fn create_zip_archive(archive_path: &Path, file_name: &str, content: &[u8]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    writer.start_file(file_name, options).unwrap();
    std::io::Write::write_all(&mut writer, content).unwrap();
    writer.finish().unwrap();
}

fn move_config(target: &Path, file_collision: FileCollisionAction) -> PostProcessConfig {
    PostProcessConfig {
        move_after_download: true,
        move_after_download_in: Some(target.to_path_buf()),
        file_collision,
    }
}

#[tokio::test]
async fn test_nothing_configured_is_a_no_op() {
    let temp_dir = TempDir::new().unwrap();
    let mut record = record_with_file(temp_dir.path(), "a.bin", b"abc");
    let before = record.clone();

    processor()
        .run(&mut record, &PostProcessConfig::default())
        .await
        .unwrap();
    assert_eq!(record, before);
}

#[tokio::test]
async fn test_checksum_mismatch_stops_pipeline() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("done");
    let extractor = Arc::new(CountingExtractor::default());
    let processor = PostProcessor::new(Arc::new(LocalFileSystem::new()), extractor.clone());

    let mut record = record_with_file(temp_dir.path(), "a.bin", b"abd");
    record.checksum = Some(MD5_ABC.into());
    record.uncompress_archive = true;

    let err = processor
        .run(&mut record, &move_config(&target, FileCollisionAction::Overwrite))
        .await
        .unwrap_err();

    assert!(matches!(err, PostProcessError::ChecksumMismatch { .. }));
    assert_eq!(failure_status(&err), StatusCode::ChecksumError);
    assert!(!target.join("a.bin").exists(), "no move after failed verification");
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_checksum_format_is_a_checksum_error() {
    let temp_dir = TempDir::new().unwrap();
    let mut record = record_with_file(temp_dir.path(), "a.bin", b"abc");
    record.checksum = Some("abc123".into());

    let err = processor()
        .run(&mut record, &PostProcessConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PostProcessError::UnknownChecksumFormat { .. }));
    assert_eq!(failure_status(&err), StatusCode::ChecksumError);
}

#[tokio::test]
async fn test_verified_file_is_moved() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("done");
    let mut record = record_with_file(temp_dir.path(), "a.bin", b"abc");
    record.checksum = Some(MD5_ABC.to_uppercase());

    processor()
        .run(&mut record, &move_config(&target, FileCollisionAction::Overwrite))
        .await
        .unwrap();

    assert_eq!(record.dir_path, target);
    assert_eq!(std::fs::read(target.join("a.bin")).unwrap(), b"abc");
    assert!(!temp_dir.path().join("a.bin").exists());
}

#[tokio::test]
async fn test_move_fail_collision_reports_already_exists() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("done");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("a.bin"), b"old").unwrap();

    let extractor = Arc::new(CountingExtractor::default());
    let processor = PostProcessor::new(Arc::new(LocalFileSystem::new()), extractor.clone());
    let mut record = record_with_file(temp_dir.path(), "a.bin", b"new");
    record.uncompress_archive = true;

    let err = processor
        .run(&mut record, &move_config(&target, FileCollisionAction::Fail))
        .await
        .unwrap_err();

    assert!(matches!(err, PostProcessError::MoveAlreadyExists { .. }));
    assert_eq!(record.dir_path, temp_dir.path(), "record keeps its last good path");
    assert_eq!(std::fs::read(target.join("a.bin")).unwrap(), b"old");
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0, "no extract after failed move");
}

#[tokio::test]
async fn test_move_rename_collision_picks_free_name() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("done");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join("a.bin"), b"old").unwrap();

    let mut record = record_with_file(temp_dir.path(), "a.bin", b"new");
    processor()
        .run(&mut record, &move_config(&target, FileCollisionAction::Rename))
        .await
        .unwrap();

    assert_eq!(record.file_name, "a (1).bin");
    assert_eq!(std::fs::read(target.join("a (1).bin")).unwrap(), b"new");
    assert_eq!(std::fs::read(target.join("a.bin")).unwrap(), b"old");
}

#[tokio::test]
async fn test_move_missing_file_is_move_failed() {
    let temp_dir = TempDir::new().unwrap();
    let extractor = Arc::new(CountingExtractor::default());
    let processor = PostProcessor::new(Arc::new(LocalFileSystem::new()), extractor.clone());
    let mut record = TaskRecord::new("http://example.com/x.zip", temp_dir.path(), "gone.zip");
    record.uncompress_archive = true;
    record.mime_type = "application/zip".into();

    let err = processor
        .run(
            &mut record,
            &move_config(&temp_dir.path().join("done"), FileCollisionAction::Overwrite),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, PostProcessError::MoveFailed { .. }));
    assert_eq!(failure_status(&err), StatusCode::Error);
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0, "no extract after failed move");
}

#[tokio::test]
async fn test_extract_deletes_archive() {
    let temp_dir = TempDir::new().unwrap();
    create_zip_archive(&temp_dir.path().join("bundle.zip"), "inner.txt", b"payload");

    let mut record = TaskRecord::new("http://example.com/bundle.zip", temp_dir.path(), "bundle.zip");
    record.uncompress_archive = true;
    record.mime_type = "application/zip".into();

    processor()
        .run(&mut record, &PostProcessConfig::default())
        .await
        .unwrap();

    assert_eq!(std::fs::read(temp_dir.path().join("inner.txt")).unwrap(), b"payload");
    assert!(!temp_dir.path().join("bundle.zip").exists());
}

#[tokio::test]
async fn test_archive_delete_failure_is_swallowed() {
    let temp_dir = TempDir::new().unwrap();
    create_zip_archive(&temp_dir.path().join("bundle.zip"), "inner.txt", b"payload");

    let processor = PostProcessor::new(
        Arc::new(UndeletableFileSystem(LocalFileSystem::new())),
        Arc::new(DefaultArchiveExtractor::new()),
    );
    let mut record = TaskRecord::new("http://example.com/bundle.zip", temp_dir.path(), "bundle.zip");
    record.uncompress_archive = true;

    processor
        .run(&mut record, &PostProcessConfig::default())
        .await
        .unwrap();
    assert!(temp_dir.path().join("bundle.zip").exists());
    assert!(temp_dir.path().join("inner.txt").exists());
}

#[tokio::test]
async fn test_non_archive_mime_skips_extraction() {
    let temp_dir = TempDir::new().unwrap();
    let extractor = Arc::new(CountingExtractor::default());
    let processor = PostProcessor::new(Arc::new(LocalFileSystem::new()), extractor.clone());

    let mut record = record_with_file(temp_dir.path(), "page.html", b"<html>");
    record.uncompress_archive = true;
    record.mime_type = "text/html".into();

    processor
        .run(&mut record, &PostProcessConfig::default())
        .await
        .unwrap();
    assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_format_is_extract_error() {
    let temp_dir = TempDir::new().unwrap();
    let mut record = record_with_file(temp_dir.path(), "blob", b"just bytes");
    record.uncompress_archive = true;

    let err = processor()
        .run(&mut record, &PostProcessConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PostProcessError::ExtractUnknownFormat { .. }));
    assert!(temp_dir.path().join("blob").exists(), "failed archive is kept");
}
