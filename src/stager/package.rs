//! Output packaging.
//!
//! Converted worlds are shipped to the client as a single deflate-compressed
//! archive written next to the staging output. The archive is assembled in a
//! temporary file and renamed into place, so a reader never observes a
//! partially written package.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::{AppError, Result};

/// Deflate level used for packaged worlds.
pub const COMPRESSION_LEVEL: i64 = 9;

/// Entries above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// Summary of a packaged directory.
#[derive(Debug, Clone)]
pub struct PackageSummary {
    /// Path of the written archive.
    pub archive: PathBuf,
    /// Number of file entries.
    pub files: u64,
    /// Number of directory entries.
    pub directories: u64,
    /// Uncompressed bytes packaged.
    pub bytes: u64,
}

/// Zip every file and directory below `src` into `archive_path`.
///
/// Entry names are relative to `src` with `/` separators, and empty
/// directories get explicit entries. The directory holding `archive_path`
/// must already exist; an existing file at `archive_path` is replaced.
///
/// # Errors
///
/// Returns [`AppError::Packaging`] if the tree cannot be walked, the
/// archive directory is missing, the archive cannot be written, or the
/// finished archive cannot be moved into place.
pub fn package_directory(src: &Path, archive_path: &Path) -> Result<PackageSummary> {
    let parent = archive_path
        .parent()
        .ok_or_else(|| AppError::Packaging("archive path has no parent directory".into()))?;
    let tmp = NamedTempFile::new_in(parent)
        .map_err(|err| AppError::Packaging(format!("failed to create temporary archive: {err}")))?;

    let base = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(COMPRESSION_LEVEL));

    let mut writer = ZipWriter::new(tmp.as_file());
    let mut summary = PackageSummary {
        archive: archive_path.to_path_buf(),
        files: 0,
        directories: 0,
        bytes: 0,
    };

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|err| AppError::Packaging(format!("cannot walk output: {err}")))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| AppError::Packaging(format!("unexpected path in walk: {err}")))?;
        let name = entry_name(relative)?;

        if entry.file_type().is_dir() {
            writer
                .add_directory(format!("{name}/"), base)
                .map_err(|err| AppError::Packaging(format!("cannot add directory {name}: {err}")))?;
            summary.directories += 1;
        } else if entry.file_type().is_file() {
            let size = entry
                .metadata()
                .map_err(|err| AppError::Packaging(format!("cannot stat {name}: {err}")))?
                .len();
            writer
                .start_file(name.as_str(), base.large_file(size >= ZIP64_THRESHOLD))
                .map_err(|err| AppError::Packaging(format!("cannot add file {name}: {err}")))?;
            let mut source = File::open(entry.path())
                .map_err(|err| AppError::Packaging(format!("cannot open {name}: {err}")))?;
            summary.bytes += io::copy(&mut source, &mut writer)
                .map_err(|err| AppError::Packaging(format!("cannot compress {name}: {err}")))?;
            summary.files += 1;
        }
    }

    writer
        .finish()
        .map_err(|err| AppError::Packaging(format!("failed to finish archive: {err}")))?;

    tmp.persist(archive_path).map_err(|err| {
        AppError::Packaging(format!(
            "failed to persist archive to {}: {err}",
            archive_path.display()
        ))
    })?;

    info!(
        archive = %archive_path.display(),
        files = summary.files,
        directories = summary.directories,
        bytes = summary.bytes,
        "output packaged"
    );
    Ok(summary)
}

fn entry_name(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                AppError::Packaging(format!("non-UTF-8 file name: {}", relative.display()))
            })?),
            _ => {
                return Err(AppError::Packaging(format!(
                    "unexpected path component in {}",
                    relative.display()
                )))
            }
        }
    }
    Ok(parts.join("/"))
}
