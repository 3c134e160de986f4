//! World archive extraction.
//!
//! A world archive may wrap the world in any number of leading directories.
//! The shallowest `level.dat` entry marks the world root: everything under
//! that entry's directory is extracted with the prefix stripped, everything
//! else is ignored.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use tracing::{debug, info};
use zip::ZipArchive;

use crate::stager::paths::{create_dir_within, join_contained};
use crate::stager::progress::ProgressThrottle;
use crate::stager::StageSummary;
use crate::{AppError, Result};

/// File every world root contains.
pub const WORLD_MARKER: &str = "level.dat";

/// Locate the world root inside an archive listing.
///
/// Returns the prefix (including its trailing `/`, or empty for the archive
/// root) of the shallowest file entry named [`WORLD_MARKER`].
#[must_use]
pub fn find_world_prefix<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    names
        .into_iter()
        .filter(|name| !name.ends_with('/'))
        .filter(|name| name.rsplit('/').next() == Some(WORLD_MARKER))
        .min_by_key(|name| name.matches('/').count())
        .map(|name| name[..name.len() - WORLD_MARKER.len()].to_owned())
}

/// Extract the world inside `archive_path` into `dest`, which must exist.
///
/// `on_progress` receives the completed fraction, throttled to steps of more
/// than 1% of the entries under the world root.
///
/// # Errors
///
/// - [`AppError::ArchiveTooLarge`] if the file is larger than `max_bytes`.
/// - [`AppError::ArchiveFormat`] if no [`WORLD_MARKER`] is present; nothing
///   is extracted in that case.
/// - [`AppError::Staging`] if the archive cannot be read or written out.
pub fn stage_archive(
    archive_path: &Path,
    dest: &Path,
    max_bytes: u64,
    mut on_progress: impl FnMut(f64),
) -> Result<StageSummary> {
    let size = fs::metadata(archive_path)
        .map_err(|err| AppError::Staging(format!("cannot stat archive: {err}")))?
        .len();
    if size > max_bytes {
        return Err(AppError::ArchiveTooLarge(format!(
            "{} is {size} bytes, limit is {max_bytes}",
            archive_path.display()
        )));
    }

    let file = File::open(archive_path)
        .map_err(|err| AppError::Staging(format!("cannot open archive: {err}")))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|err| AppError::Staging(format!("invalid zip archive: {err}")))?;

    let prefix = find_world_prefix(archive.file_names()).ok_or_else(|| {
        AppError::ArchiveFormat(format!("{WORLD_MARKER} not found in archive"))
    })?;

    let total = archive
        .file_names()
        .filter(|name| name.starts_with(prefix.as_str()))
        .count();
    let mut throttle = ProgressThrottle::new(total as u64);
    let mut summary = StageSummary::default();

    debug!(prefix = %prefix, entries = total, "extracting world archive");

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;

        let name = entry.name().to_owned();
        let Some(relative) = name.strip_prefix(prefix.as_str()) else {
            continue;
        };

        if let Some(fraction) = throttle.advance(1) {
            on_progress(fraction);
        }

        if relative.is_empty() {
            continue;
        }

        let outpath = match join_contained(dest, relative) {
            Ok(path) => path,
            Err(err) => {
                debug!(entry = %name, %err, "skipping archive entry outside staging directory");
                summary.skipped += 1;
                continue;
            }
        };

        if entry.is_dir() {
            create_dir_within(dest, &outpath).map_err(|err| staging_io("create directory", &outpath, &err))?;
            summary.directories += 1;
        } else {
            if let Some(parent) = outpath.parent() {
                create_dir_within(dest, parent).map_err(|err| staging_io("create directory", parent, &err))?;
            }
            let mut outfile =
                File::create(&outpath).map_err(|err| staging_io("create file", &outpath, &err))?;
            io::copy(&mut entry, &mut outfile).map_err(|err| staging_io("extract file", &outpath, &err))?;
            summary.files += 1;
        }
    }

    info!(
        files = summary.files,
        directories = summary.directories,
        skipped = summary.skipped,
        "world archive extracted"
    );
    Ok(summary)
}

fn staging_io(action: &str, path: &Path, err: &io::Error) -> AppError {
    AppError::Staging(format!("failed to {action} {}: {err}", path.display()))
}
