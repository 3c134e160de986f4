//! Unit tests for path containment.

use std::fs;
use std::path::Path;

use chunker_host::stager::paths::{create_dir_within, join_contained, resolve_existing, session_dir};
use chunker_host::AppError;

/// Inner `..` segments may cancel segments of the relative path.
#[test]
fn inner_parent_segments_are_allowed() {
    let root = Path::new("/stage/s1");
    let joined = join_contained(root, "a/b/../c.txt").expect("join");
    assert_eq!(joined, Path::new("/stage/s1/a/c.txt"));
}

/// Escapes and absolute paths are rejected.
#[test]
fn escapes_are_rejected() {
    let root = Path::new("/stage/s1");
    for bad in ["../s2/out.zip", "a/../../x", "/etc/passwd"] {
        let err = join_contained(root, bad).expect_err(bad);
        assert!(matches!(err, AppError::PathViolation(_)), "{bad}: {err}");
    }
}

/// Existing files resolve; missing ones are not found.
#[test]
fn resolve_existing_requires_presence() {
    let tmp = tempfile::tempdir().expect("tempdir");
    fs::write(tmp.path().join("out.zip"), b"zip").expect("write");

    let resolved = resolve_existing(tmp.path(), "out.zip").expect("resolve");
    assert!(resolved.ends_with("out.zip"));

    let err = resolve_existing(tmp.path(), "missing.zip").expect_err("missing");
    assert!(matches!(err, AppError::NotFound(_)));

    let err = resolve_existing(tmp.path(), "").expect_err("root itself");
    assert!(matches!(err, AppError::PathViolation(_)));
}

/// Symlinks pointing outside the root are rejected.
#[cfg(unix)]
#[test]
fn escaping_symlink_is_rejected() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path().join("s1");
    fs::create_dir(&root).expect("root");
    fs::write(tmp.path().join("secret"), b"secret").expect("secret");
    std::os::unix::fs::symlink(tmp.path().join("secret"), root.join("link")).expect("symlink");

    let err = resolve_existing(&root, "link").expect_err("must fail");
    assert!(matches!(err, AppError::PathViolation(_)));
}

/// Plain ids become one directory under the root.
#[test]
fn session_dir_accepts_plain_ids() {
    let root = Path::new("/stage");
    for id in ["s1", "3f2a-b7c9_x", "user@host"] {
        assert_eq!(session_dir(root, id).expect(id), root.join(id));
    }
}

/// Ids that are empty, long, or carry path syntax are refused.
#[test]
fn session_dir_rejects_path_syntax() {
    let root = Path::new("/stage");
    let long = "a".repeat(128);
    for id in ["", "..", ".", "/", "/x", "a/b", "a/../..", "a\\b", "tab\there", long.as_str()] {
        let err = session_dir(root, id).expect_err(id);
        assert!(matches!(err, AppError::PathViolation(_)), "{id:?}: {err}");
    }
}

/// Nested directories are created below an existing root.
#[test]
fn create_dir_within_builds_nested_directories() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let target = tmp.path().join("a/b/c");
    create_dir_within(tmp.path(), &target).expect("create");
    assert!(target.is_dir());
    create_dir_within(tmp.path(), &target).expect("idempotent");
}

/// A missing root is never recreated, and targets outside it are refused.
#[test]
fn create_dir_within_requires_root() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path().join("session");

    let err = create_dir_within(&root, &root.join("input/region")).expect_err("missing root");
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    assert!(!root.exists());

    let err = create_dir_within(tmp.path(), Path::new("/elsewhere")).expect_err("outside");
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}
