//! Unit tests for output packaging.

use std::fs::{self, File};
use std::io::Read;

use zip::{CompressionMethod, ZipArchive};

use chunker_host::stager::package::package_directory;

/// Files and directories (including empty ones) land in the archive with
/// forward-slash names, deflated.
#[test]
fn packages_tree_with_empty_directories() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("output");
    let out_dir = tmp.path().join("artifacts");
    fs::create_dir_all(src.join("sub")).expect("sub");
    fs::create_dir_all(src.join("empty")).expect("empty");
    fs::create_dir_all(&out_dir).expect("out dir");
    fs::write(src.join("a.txt"), b"alpha alpha alpha").expect("a");
    fs::write(src.join("sub/b.txt"), b"beta").expect("b");

    let archive_path = out_dir.join("world.zip");
    let summary = package_directory(&src, &archive_path).expect("package");

    assert_eq!(summary.archive, archive_path);
    assert_eq!(summary.files, 2);
    assert_eq!(summary.directories, 2);

    let mut archive = ZipArchive::new(File::open(&archive_path).expect("open")).expect("zip");
    let names: Vec<String> = archive.file_names().map(str::to_owned).collect();
    for expected in ["a.txt", "sub/", "sub/b.txt", "empty/"] {
        assert!(names.iter().any(|name| name == expected), "{expected} missing from {names:?}");
    }

    let mut entry = archive.by_name("sub/b.txt").expect("entry");
    assert_eq!(entry.compression(), CompressionMethod::Deflated);
    let mut content = String::new();
    entry.read_to_string(&mut content).expect("read");
    assert_eq!(content, "beta");
}

/// Packaging replaces an existing archive and leaves no temporary files.
#[test]
fn packaging_replaces_existing_archive_atomically() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("output");
    let out_dir = tmp.path().join("artifacts");
    fs::create_dir_all(&src).expect("src");
    fs::create_dir_all(&out_dir).expect("out dir");
    fs::write(src.join("level.dat"), b"level").expect("level");

    let archive_path = out_dir.join("world.mcworld");
    fs::write(&archive_path, b"stale").expect("stale");

    package_directory(&src, &archive_path).expect("package");

    let archive = ZipArchive::new(File::open(&archive_path).expect("open")).expect("zip");
    assert_eq!(archive.len(), 1);
    assert_eq!(fs::read_dir(&out_dir).expect("read").count(), 1);
}

/// A missing source directory fails.
#[test]
fn missing_source_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let result = package_directory(&tmp.path().join("absent"), &tmp.path().join("out.zip"));
    assert!(result.is_err());
}

/// Packaging into a removed directory fails and leaves it removed.
#[test]
fn missing_archive_directory_is_not_recreated() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("output");
    fs::create_dir_all(&src).expect("src");
    fs::write(src.join("level.dat"), b"level").expect("level");
    let gone = tmp.path().join("session");

    let result = package_directory(&src, &gone.join("world.zip"));
    assert!(result.is_err());
    assert!(!gone.exists());
}
