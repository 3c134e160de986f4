//! Unit tests for preloaded settings discovery.

use std::fs;

use serde_json::json;

use chunker_host::stager::preload::read_preloaded_settings;

/// Top-level `*.chunker.json` files are keyed by their stem; other files
/// and nested documents are ignored.
#[test]
fn reads_top_level_documents() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let input = tmp.path();
    fs::write(input.join("settings.chunker.json"), r#"{"nbt":true}"#).expect("settings");
    fs::write(input.join("pruning.chunker.json"), "[1,2]").expect("pruning");
    fs::write(input.join("level.dat"), b"level").expect("level");
    fs::write(input.join(".chunker.json"), "{}").expect("bare suffix");
    fs::create_dir(input.join("nested")).expect("nested");
    fs::write(input.join("nested/other.chunker.json"), "{}").expect("nested doc");

    let preloaded = read_preloaded_settings(input).expect("preload");

    assert_eq!(preloaded.len(), 2);
    assert_eq!(preloaded["settings"], json!({"nbt": true}));
    assert_eq!(preloaded["pruning"], json!([1, 2]));
}

/// A missing directory yields nothing.
#[test]
fn missing_directory_is_empty() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let preloaded = read_preloaded_settings(&tmp.path().join("absent")).expect("preload");
    assert!(preloaded.is_empty());
}

/// Invalid JSON names the offending file.
#[test]
fn invalid_document_names_file() {
    let tmp = tempfile::tempdir().expect("tempdir");
    fs::write(tmp.path().join("broken.chunker.json"), "{oops").expect("broken");

    let failure = read_preloaded_settings(tmp.path()).expect_err("must fail");
    assert_eq!(failure.file_name, "broken.chunker.json");
    assert!(!failure.cause.is_empty());
}
