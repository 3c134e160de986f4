//! Host configuration parsing and validation.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::session::SessionLimits;
use crate::worker::supervisor::LaunchOptions;
use crate::{AppError, Result};

/// Environment variable that overrides the engine executable location.
///
/// A value ending in a path separator is treated as a directory to search.
pub const ENGINE_OVERRIDE_ENV: &str = "CHUNKER_CLI_EXECUTABLE";

/// Engine discovery and launch settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineConfig {
    /// Explicit engine executable or directory to search.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Directory holding the default engine install layout.
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
    /// JVM options forwarded through `_JAVA_OPTIONS`.
    #[serde(default)]
    pub java_options: String,
}

/// Staging directory settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StagingConfig {
    /// Root under which per-session directories are created.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Largest input archive accepted for extraction, in bytes.
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
}

fn default_max_archive_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            root: None,
            max_archive_bytes: default_max_archive_bytes(),
        }
    }
}

/// Host configuration parsed from an optional `config.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HostConfig {
    /// Engine discovery and launch settings.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Staging directory settings.
    #[serde(default)]
    pub staging: StagingConfig,
}

impl HostConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply the [`ENGINE_OVERRIDE_ENV`] override, if set and non-empty.
    pub fn apply_env_overrides(&mut self) {
        match env::var(ENGINE_OVERRIDE_ENV) {
            Ok(value) if !value.trim().is_empty() => {
                self.engine.executable = Some(PathBuf::from(value));
            }
            Ok(_) => {
                warn!(var = ENGINE_OVERRIDE_ENV, "engine override is empty, ignoring");
            }
            Err(_) => {}
        }
    }

    /// Root under which per-session staging directories live.
    #[must_use]
    pub fn staging_root(&self) -> PathBuf {
        self.staging
            .root
            .clone()
            .unwrap_or_else(|| env::temp_dir().join("chunker-host"))
    }

    /// Directory holding the default engine install layout.
    ///
    /// Defaults to a `chunker-cli` directory beside the directory that holds
    /// the host executable.
    #[must_use]
    pub fn install_dir(&self) -> PathBuf {
        if let Some(dir) = &self.engine.install_dir {
            return dir.clone();
        }

        env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().and_then(Path::parent).map(Path::to_path_buf))
            .unwrap_or_default()
            .join("chunker-cli")
    }

    /// Build the engine launch options, merging JVM options from the CLI.
    #[must_use]
    pub fn launch_options(&self, extra_java_options: &[String]) -> LaunchOptions {
        let java_options = std::iter::once(self.engine.java_options.trim())
            .chain(extra_java_options.iter().map(String::as_str).map(str::trim))
            .filter(|opt| !opt.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        LaunchOptions {
            executable_override: self.engine.executable.clone(),
            install_dir: self.install_dir(),
            java_options,
        }
    }

    /// Limits applied to every session.
    #[must_use]
    pub fn session_limits(&self) -> SessionLimits {
        SessionLimits {
            max_archive_bytes: self.staging.max_archive_bytes,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.staging.max_archive_bytes == 0 {
            return Err(AppError::Config(
                "staging.max_archive_bytes must be greater than zero".into(),
            ));
        }

        if let Some(root) = &self.staging.root {
            if root.as_os_str().is_empty() {
                return Err(AppError::Config("staging.root must not be empty".into()));
            }
        }

        Ok(())
    }
}

/// Strip one pair of matching surrounding quotes from a CLI option value.
#[must_use]
pub fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Host arguments forwarded to the JVM without an explicit `--java-options`.
pub const FORWARDED_JVM_PREFIXES: [&str; 2] = ["-Xmx", "-Xms"];

/// Collect JVM options from the command line: bare heap arguments
/// (see [`FORWARDED_JVM_PREFIXES`]) followed by each `--java-options` value
/// with one layer of quotes removed.
#[must_use]
pub fn collect_java_options(trailing: &[String], explicit: &[String]) -> Vec<String> {
    trailing
        .iter()
        .filter(|arg| FORWARDED_JVM_PREFIXES.iter().any(|prefix| arg.starts_with(prefix)))
        .cloned()
        .chain(explicit.iter().map(|value| unquote(value).to_owned()))
        .collect()
}
