use crate::error::ExtractError;
use crate::extraction::*;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Create a valid ZIP archive containing the given files
fn create_zip_archive(archive_path: &Path, files: &[(&str, &[u8])]) {
    let file = std::fs::File::create(archive_path).unwrap();
    let mut writer = ::zip::ZipWriter::new(file);
    let options =
        ::zip::write::FileOptions::default().compression_method(::zip::CompressionMethod::Stored);
    for (name, content) in files {
        writer.start_file(*name, options).unwrap();
        std::io::Write::write_all(&mut writer, content).unwrap();
    }
    writer.finish().unwrap();
}

/// Create a valid 7z archive from a source directory using sevenz_rust
fn create_7z_archive(archive_path: &Path, source_dir: &Path) {
    sevenz_rust::compress_to_path(source_dir, archive_path).unwrap();
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

#[test]
fn test_detect_by_magic_ignores_misleading_extension() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("download.bin");
    create_zip_archive(&path, &[("a.txt", b"a")]);

    assert_eq!(
        detect_archive_type(&path, "application/octet-stream"),
        Some(ArchiveType::Zip)
    );
}

#[test]
fn test_detect_falls_back_to_mime_then_extension() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("plain.data");
    std::fs::write(&path, b"not an archive").unwrap();

    assert_eq!(
        detect_archive_type(&path, "application/x-7z-compressed"),
        Some(ArchiveType::SevenZip)
    );
    assert_eq!(detect_archive_type(&path, "text/plain"), None);
    assert_eq!(
        detect_archive_type(Path::new("/missing/FILE.ZIP"), ""),
        Some(ArchiveType::Zip)
    );
    assert_eq!(detect_archive_type(Path::new("/missing/file.rar"), ""), None);
}

#[test]
fn test_is_archive_mime() {
    assert!(is_archive_mime("application/zip"));
    assert!(is_archive_mime("Application/X-7z-Compressed"));
    assert!(is_archive_mime("application/vnd.rar"));
    assert!(!is_archive_mime("application/octet-stream"));
    assert!(!is_archive_mime("text/html"));
}

// ---------------------------------------------------------------------------
// ZIP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_zip_extract_nested_entries() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("bundle.zip");
    create_zip_archive(
        &archive,
        &[("readme.txt", b"hello"), ("docs/guide.txt", b"guide")],
    );

    let dest = temp_dir.path().join("out");
    let files = DefaultArchiveExtractor::new()
        .extract(&archive, "application/zip", &dest)
        .await
        .unwrap();

    assert_eq!(files.len(), 2);
    assert_eq!(std::fs::read(dest.join("readme.txt")).unwrap(), b"hello");
    assert_eq!(std::fs::read(dest.join("docs/guide.txt")).unwrap(), b"guide");
}

#[tokio::test]
async fn test_zip_skips_entries_escaping_destination() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("evil.zip");
    create_zip_archive(&archive, &[("../escape.txt", b"x"), ("ok.txt", b"y")]);

    let dest = temp_dir.path().join("out");
    let files = ZipExtractor::extract(&archive, &dest).unwrap();

    assert_eq!(files, vec![dest.join("ok.txt")]);
    assert!(!temp_dir.path().join("escape.txt").exists());
}

#[tokio::test]
async fn test_truncated_zip_is_unknown_format() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("broken.zip");
    std::fs::write(&archive, b"PK\x03\x04 truncated").unwrap();

    let err = DefaultArchiveExtractor::new()
        .extract(&archive, "application/zip", temp_dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::UnknownFormat { .. }), "{err:?}");
}

#[tokio::test]
async fn test_unrecognised_file_is_unknown_format() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("movie.rar");
    std::fs::write(&archive, b"Rar!\x1a\x07\x00").unwrap();

    let err = DefaultArchiveExtractor::new()
        .extract(&archive, "application/vnd.rar", temp_dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::UnknownFormat { .. }));
}

#[tokio::test]
async fn test_missing_archive_is_io_error() {
    let temp_dir = TempDir::new().unwrap();
    let err = ZipExtractor::extract(&temp_dir.path().join("gone.zip"), temp_dir.path()).unwrap_err();
    assert!(matches!(err, ExtractError::Io { .. }));
}

// ---------------------------------------------------------------------------
// 7z
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_7z_extract_reports_only_new_files() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("src");
    std::fs::create_dir_all(source.join("sub")).unwrap();
    std::fs::write(source.join("a.txt"), b"alpha").unwrap();
    std::fs::write(source.join("sub/b.txt"), b"beta").unwrap();

    let dest = temp_dir.path().join("dest");
    std::fs::create_dir_all(&dest).unwrap();
    let archive = dest.join("bundle.7z");
    create_7z_archive(&archive, &source);

    let files = DefaultArchiveExtractor::new()
        .extract(&archive, "application/octet-stream", &dest)
        .await
        .unwrap();

    assert!(!files.contains(&archive), "the archive itself is not an extracted file");
    assert_eq!(files.len(), 2);
    assert_eq!(std::fs::read(dest.join("a.txt")).unwrap(), b"alpha");
    assert_eq!(std::fs::read(dest.join("sub/b.txt")).unwrap(), b"beta");
}

#[tokio::test]
async fn test_corrupt_7z_fails() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("broken.7z");
    std::fs::write(&archive, b"7z\xBC\xAF\x27\x1C garbage").unwrap();

    let result = DefaultArchiveExtractor::new()
        .extract(&archive, "application/x-7z-compressed", temp_dir.path())
        .await;
    assert!(result.is_err());
}
