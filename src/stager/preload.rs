//! Preloaded settings shipped alongside a world.
//!
//! A world may carry `<name>.chunker.json` files at its top level holding
//! settings exported by an earlier session. They are handed back to the
//! client with the detected version so it can restore them.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

/// File name suffix of preloaded settings documents.
pub const PRELOAD_SUFFIX: &str = ".chunker.json";

/// A preloaded settings file that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadFailure {
    /// File name of the offending document.
    pub file_name: String,
    /// Underlying read or parse error.
    pub cause: String,
}

/// Read every top-level `*.chunker.json` in `input` into a map keyed by the
/// part of the file name before [`PRELOAD_SUFFIX`].
///
/// A missing `input` directory yields an empty map.
///
/// # Errors
///
/// Returns a [`PreloadFailure`] naming the first document that cannot be
/// read or is not valid JSON.
pub fn read_preloaded_settings(input: &Path) -> std::result::Result<Map<String, Value>, PreloadFailure> {
    let mut preloaded = Map::new();

    let Ok(entries) = fs::read_dir(input) else {
        return Ok(preloaded);
    };

    let mut files: Vec<_> = entries
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(PRELOAD_SUFFIX) && name.len() > PRELOAD_SUFFIX.len())
        .collect();
    files.sort();

    for file_name in files {
        let path = input.join(&file_name);
        let parsed = fs::read_to_string(&path)
            .map_err(|err| err.to_string())
            .and_then(|raw| serde_json::from_str::<Value>(&raw).map_err(|err| err.to_string()));

        match parsed {
            Ok(value) => {
                let key = file_name[..file_name.len() - PRELOAD_SUFFIX.len()].to_owned();
                debug!(file = %file_name, "loaded preloaded settings");
                preloaded.insert(key, value);
            }
            Err(cause) => return Err(PreloadFailure { file_name, cause }),
        }
    }

    Ok(preloaded)
}
