//! Path containment checks for staging directories.
//!
//! Session ids, archive entry names, and download locators are untrusted.
//! All of them are resolved against a root directory and rejected if the
//! result would leave it through `..` segments, absolute components, or
//! symlinks.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::stager::naming::{is_allowed, MAX_NAME_LEN};
use crate::{AppError, Result};

/// Staging directory for `session_id` below `root`.
///
/// Session ids come from the client and become a single directory name, so
/// they are limited to `[A-Za-z0-9_\-@]` and fewer than 128 characters.
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] if the id is empty, too long, or
/// contains any other character.
pub fn session_dir(root: &Path, session_id: &str) -> Result<PathBuf> {
    if session_id.is_empty() || session_id.len() >= MAX_NAME_LEN || !session_id.chars().all(is_allowed) {
        return Err(AppError::PathViolation(format!(
            "session id {session_id:?} is not a valid directory name"
        )));
    }
    join_contained(root, session_id)
}

/// Lexically join `relative` onto `root`, rejecting any escape.
///
/// `..` segments may only cancel segments introduced by `relative` itself,
/// and absolute or prefixed components are rejected outright. The target
/// does not need to exist.
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] if the path would resolve outside
/// `root`.
pub fn join_contained(root: &Path, relative: impl AsRef<Path>) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in relative.as_ref().components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathViolation(
                        "path attempts to escape staging directory".into(),
                    ));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::PathViolation("path must be relative".into()));
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    Ok(root.join(normalized))
}

/// Resolve an existing `relative` path inside `root`, following symlinks.
///
/// # Errors
///
/// Returns [`AppError::PathViolation`] if the path escapes `root` lexically
/// or through a symlink, and [`AppError::NotFound`] if it does not exist.
pub fn resolve_existing(root: &Path, relative: impl AsRef<Path>) -> Result<PathBuf> {
    let canonical_root = root
        .canonicalize()
        .map_err(|err| AppError::PathViolation(format!("staging root invalid: {err}")))?;

    let joined = join_contained(&canonical_root, relative)?;
    if joined == canonical_root {
        return Err(AppError::PathViolation("path names the staging root".into()));
    }

    let canonical = joined
        .canonicalize()
        .map_err(|err| AppError::NotFound(format!("{}: {err}", joined.display())))?;

    if !canonical.starts_with(&canonical_root) {
        return Err(AppError::PathViolation(
            "symlink target escapes staging directory".into(),
        ));
    }

    Ok(canonical)
}

/// Create `dir` and its missing parents, but only below `root`.
///
/// `root` itself is never created, so work that outlives its staging
/// directory fails instead of recreating it.
///
/// # Errors
///
/// Returns [`io::ErrorKind::NotFound`] if `root` does not exist and
/// [`io::ErrorKind::InvalidInput`] if `dir` is not below `root`.
pub fn create_dir_within(root: &Path, dir: &Path) -> io::Result<()> {
    if !root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} no longer exists", root.display()),
        ));
    }
    let relative = dir.strip_prefix(root).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is outside {}", dir.display(), root.display()),
        )
    })?;

    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match fs::create_dir(&current) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists && current.is_dir() => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
