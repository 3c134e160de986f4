//! Engine executable discovery.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use tracing::debug;

use crate::{AppError, Result};

/// File-name prefix shared by every engine build.
pub const ENGINE_PREFIX: &str = "chunker-cli";

/// How the located executable must be launched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineLaunch {
    /// A platform-native binary run directly.
    Native(PathBuf),
    /// A runnable jar started with `java -jar`.
    Jar(PathBuf),
}

impl EngineLaunch {
    fn from_path(path: PathBuf) -> Self {
        if path.extension().is_some_and(|ext| ext == "jar") {
            Self::Jar(path)
        } else {
            Self::Native(path)
        }
    }

    /// Path of the executable or jar.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Native(path) | Self::Jar(path) => path,
        }
    }
}

/// Resolve the engine executable.
///
/// Search order:
/// 1. `override_path` naming a file is used as-is;
/// 2. `override_path` ending in a separator or naming a directory, otherwise
///    `install_dir`, is the directory to search;
/// 3. if that directory is missing but `<dir>.app` exists, search
///    `<dir>.app/Contents/MacOS`;
/// 4. if the directory has a `bin` subdirectory, search that instead.
///
/// Within the directory the first regular file (by name) starting with
/// [`ENGINE_PREFIX`] is chosen, ignoring icons and unshaded jars.
///
/// # Errors
///
/// Returns [`AppError::ExecutableNotFound`] if no candidate exists.
pub async fn locate_engine(override_path: Option<&Path>, install_dir: &Path) -> Result<EngineLaunch> {
    let mut search_dir = install_dir.to_path_buf();

    if let Some(path) = override_path {
        let names_dir = path.to_string_lossy().ends_with(MAIN_SEPARATOR)
            || path.to_string_lossy().ends_with('/')
            || is_dir(path).await;
        if !names_dir {
            if is_file(path).await {
                return Ok(EngineLaunch::from_path(path.to_path_buf()));
            }
            return Err(AppError::ExecutableNotFound(format!(
                "engine override {} does not exist",
                path.display()
            )));
        }
        search_dir = path.to_path_buf();
    }

    if !exists(&search_dir).await {
        let bundle = bundle_dir(&search_dir);
        if exists(&bundle).await {
            search_dir = bundle.join("Contents").join("MacOS");
        }
    }

    let bin = search_dir.join("bin");
    if exists(&bin).await {
        search_dir = bin;
    }

    debug!(dir = %search_dir.display(), "searching for engine executable");

    let mut candidates = Vec::new();
    let mut entries = match tokio::fs::read_dir(&search_dir).await {
        Ok(entries) => entries,
        Err(err) => {
            return Err(AppError::ExecutableNotFound(format!(
                "{ENGINE_PREFIX} executable is missing! cannot read {}: {err}",
                search_dir.display()
            )))
        }
    };

    while let Some(entry) = entries.next_entry().await? {
        let is_regular = entry.file_type().await.is_ok_and(|ty| ty.is_file());
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_regular && is_engine_file_name(&name) {
            candidates.push(entry.path());
        }
    }

    candidates.sort();
    candidates
        .into_iter()
        .next()
        .map(EngineLaunch::from_path)
        .ok_or_else(|| {
            AppError::ExecutableNotFound(format!(
                "{ENGINE_PREFIX} executable is missing! searched {}",
                search_dir.display()
            ))
        })
}

/// Whether `name` looks like an engine executable.
#[must_use]
pub fn is_engine_file_name(name: &str) -> bool {
    name.starts_with(ENGINE_PREFIX)
        && !name.ends_with(".ico")
        && !name.ends_with("-unshaded.jar")
}

fn bundle_dir(dir: &Path) -> PathBuf {
    let trimmed = dir.to_string_lossy();
    let trimmed = trimmed.trim_end_matches(['/', MAIN_SEPARATOR]);
    PathBuf::from(format!("{trimmed}.app"))
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_dir())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|meta| meta.is_file())
}
