//! Unit tests for directory staging and edit-in-place copies.

use std::fs;
use std::path::Path;

use chunker_host::stager::copy::{
    copy_file_with_progress, copy_for_editing, count_files, is_engine_managed, stage_directory,
};

fn touch(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, content).expect("write");
}

/// Region and entity data are engine-managed at any depth.
#[test]
fn chunk_data_is_engine_managed() {
    assert!(is_engine_managed(Path::new("region")));
    assert!(is_engine_managed(Path::new("region/r.0.0.mca")));
    assert!(is_engine_managed(Path::new("DIM-1/region/r.0.0.mca")));
    assert!(is_engine_managed(Path::new("entities/r.0.0.mca")));
}

/// Map data and the top-level world files are engine-managed.
#[test]
fn map_and_world_files_are_engine_managed() {
    assert!(is_engine_managed(Path::new("data/map_0.dat")));
    assert!(is_engine_managed(Path::new("data/map_12.DAT")));
    assert!(is_engine_managed(Path::new("data/idcounts.dat")));
    assert!(is_engine_managed(Path::new("level.dat")));
    assert!(is_engine_managed(Path::new("session.lock")));
}

/// Everything else is user data.
#[test]
fn user_data_is_not_engine_managed() {
    assert!(!is_engine_managed(Path::new("data/raids.dat")));
    assert!(!is_engine_managed(Path::new("data/map_0.json")));
    assert!(!is_engine_managed(Path::new("playerdata/abc.dat")));
    assert!(!is_engine_managed(Path::new("datapacks/level.dat")));
    assert!(!is_engine_managed(Path::new("icon.png")));
}

/// Editing copies keep user data and leave engine-managed data behind.
#[test]
fn copy_for_editing_filters_engine_managed_data() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = tmp.path().join("input");
    let output = tmp.path().join("output");
    fs::create_dir_all(&output).expect("output");

    touch(&input, "level.dat", b"level");
    touch(&input, "session.lock", b"lock");
    touch(&input, "region/r.0.0.mca", b"r");
    touch(&input, "DIM-1/region/r.0.0.mca", b"r");
    touch(&input, "entities/r.0.0.mca", b"e");
    touch(&input, "data/map_0.dat", b"m");
    touch(&input, "data/idcounts.dat", b"i");
    touch(&input, "data/raids.dat", b"raids");
    touch(&input, "playerdata/p.dat", b"player");
    touch(&input, "icon.png", b"png");

    copy_for_editing(&input, &output).expect("copy");

    assert_eq!(fs::read(output.join("data/raids.dat")).expect("raids"), b"raids");
    assert!(output.join("playerdata/p.dat").is_file());
    assert!(output.join("icon.png").is_file());
    assert!(output.join("DIM-1").is_dir());

    for excluded in [
        "level.dat",
        "session.lock",
        "region",
        "DIM-1/region",
        "entities",
        "data/map_0.dat",
        "data/idcounts.dat",
    ] {
        assert!(!output.join(excluded).exists(), "{excluded} must not be copied");
    }
}

/// Directory staging copies every file and reports rising progress.
#[test]
fn stage_directory_copies_tree_with_progress() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("world");
    let dest = tmp.path().join("input");
    fs::create_dir_all(&dest).expect("dest");

    touch(&src, "level.dat", b"level");
    for i in 0..40 {
        touch(&src, &format!("region/r.{i}.mca"), b"chunk");
    }
    fs::create_dir_all(src.join("empty")).expect("empty dir");

    assert_eq!(count_files(&src).expect("count"), 41);

    let mut reports = Vec::new();
    let summary = stage_directory(&src, &dest, |fraction| reports.push(fraction)).expect("stage");

    assert_eq!(summary.files, 41);
    assert!(dest.join("region/r.39.mca").is_file());
    assert!(dest.join("empty").is_dir());
    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|pair| pair[1] > pair[0]));
}

/// Single-file copies report byte progress and copy every byte.
#[test]
fn copy_file_reports_byte_progress() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let src = tmp.path().join("out.zip");
    let dest = tmp.path().join("saved.zip");
    let content: Vec<u8> = (0..2_000_000u32).map(|i| u8::try_from(i % 251).expect("fits")).collect();
    fs::write(&src, &content).expect("write");

    let mut reports = Vec::new();
    let copied = copy_file_with_progress(&src, &dest, |fraction| reports.push(fraction)).expect("copy");

    assert_eq!(copied, content.len() as u64);
    assert_eq!(fs::read(&dest).expect("read"), content);
    assert!(!reports.is_empty());
    assert!(reports.windows(2).all(|pair| pair[1] > pair[0]));
    assert!(reports.iter().all(|fraction| *fraction <= 1.0));
}

/// Copying a missing file is an error.
#[test]
fn copy_missing_file_fails() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let result = copy_file_with_progress(&tmp.path().join("nope"), &tmp.path().join("dest"), |_| {});
    assert!(result.is_err());
}

/// Copies into a destination that no longer exists fail without recreating
/// it or any of its parents.
#[test]
fn copies_into_removed_destination_fail() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = tmp.path().join("input");
    touch(&input, "playerdata/p.dat", b"player");
    let session = tmp.path().join("session");
    let output = session.join("output");

    let err = copy_for_editing(&input, &output).expect_err("editing copy");
    assert!(err.to_string().contains("does not exist"), "{err}");
    let err = stage_directory(&input, &output, |_| {}).expect_err("staging copy");
    assert!(err.to_string().contains("does not exist"), "{err}");
    assert!(!session.exists());
}
