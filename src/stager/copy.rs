//! Directory staging and selective copies.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path};

use tracing::info;
use walkdir::WalkDir;

use crate::stager::paths::create_dir_within;
use crate::stager::progress::ProgressThrottle;
use crate::stager::StageSummary;
use crate::{AppError, Result};

/// Buffer size for byte-counted copies.
const COPY_CHUNK: usize = 256 * 1024;

/// Count regular files below `dir`.
///
/// # Errors
///
/// Returns [`AppError::Staging`] if the tree cannot be walked.
pub fn count_files(dir: &Path) -> Result<u64> {
    let mut count = 0;
    for entry in WalkDir::new(dir).min_depth(1) {
        let entry = entry.map_err(|err| AppError::Staging(format!("cannot walk input: {err}")))?;
        if entry.file_type().is_file() {
            count += 1;
        }
    }
    Ok(count)
}

/// Copy the directory tree at `src` into the existing directory `dest`,
/// preserving structure.
///
/// `on_progress` receives the completed fraction of files, throttled to
/// steps of more than 1% of the pre-counted total.
///
/// # Errors
///
/// Returns [`AppError::Staging`] if the source cannot be walked or any file
/// cannot be copied.
pub fn stage_directory(src: &Path, dest: &Path, mut on_progress: impl FnMut(f64)) -> Result<StageSummary> {
    let total = count_files(src)?;
    let mut throttle = ProgressThrottle::new(total);

    let summary = copy_tree(src, dest, |_| true, |_| {
        if let Some(fraction) = throttle.advance(1) {
            on_progress(fraction);
        }
    })?;

    info!(files = summary.files, directories = summary.directories, "input directory staged");
    Ok(summary)
}

/// Whether `relative` (a path inside a world) is data the engine regenerates
/// during conversion and must not be pre-copied when editing in place.
///
/// Excludes `region/` and `entities/` anywhere, map data (`data/map_*.dat`
/// and `data/idcounts.dat`), and the top-level `level.dat` and
/// `session.lock`.
#[must_use]
pub fn is_engine_managed(relative: &Path) -> bool {
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();

    if parts.iter().any(|part| *part == "region" || *part == "entities") {
        return true;
    }

    match parts.as_slice() {
        ["data", file] => {
            *file == "idcounts.dat"
                || (file.starts_with("map_")
                    && Path::new(file)
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("dat")))
        }
        [file] => *file == "level.dat" || *file == "session.lock",
        _ => false,
    }
}

/// Copy `input` into the existing directory `output`, leaving out
/// everything the engine rewrites.
///
/// # Errors
///
/// Returns [`AppError::Staging`] if any file cannot be copied.
pub fn copy_for_editing(input: &Path, output: &Path) -> Result<StageSummary> {
    copy_tree(input, output, |relative| !is_engine_managed(relative), |_| {})
}

/// Copy one file to `dest`, reporting the copied fraction of its bytes
/// through `on_progress` in steps of more than 1%.
///
/// Returns the number of bytes copied.
///
/// # Errors
///
/// Returns [`AppError::Io`] if the source cannot be read or the
/// destination cannot be written.
pub fn copy_file_with_progress(src: &Path, dest: &Path, mut on_progress: impl FnMut(f64)) -> Result<u64> {
    let mut reader = File::open(src)?;
    let total = reader.metadata()?.len();
    let mut writer = File::create(dest)?;

    let mut throttle = ProgressThrottle::new(total);
    let mut buf = vec![0u8; COPY_CHUNK];
    let mut copied = 0u64;

    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buf[..read])?;
        copied += read as u64;
        if let Some(fraction) = throttle.advance(read as u64) {
            on_progress(fraction);
        }
    }

    writer.flush()?;
    info!(src = %src.display(), dest = %dest.display(), bytes = copied, "file copied");
    Ok(copied)
}

fn copy_tree(
    src: &Path,
    dest: &Path,
    include: impl Fn(&Path) -> bool,
    mut on_file: impl FnMut(&Path),
) -> Result<StageSummary> {
    if !dest.is_dir() {
        return Err(AppError::Staging(format!("{} does not exist", dest.display())));
    }

    let mut summary = StageSummary::default();
    let mut walker = WalkDir::new(src).min_depth(1).sort_by_file_name().into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|err| AppError::Staging(format!("cannot walk input: {err}")))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|err| AppError::Staging(format!("unexpected path in walk: {err}")))?;

        if !include(relative) {
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
            summary.skipped += 1;
            continue;
        }

        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            create_dir_within(dest, &target)
                .map_err(|err| AppError::Staging(format!("cannot create {}: {err}", target.display())))?;
            summary.directories += 1;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target).map_err(|err| {
                AppError::Staging(format!("cannot copy {}: {err}", entry.path().display()))
            })?;
            summary.files += 1;
            on_file(relative);
        }
    }

    Ok(summary)
}
