//! Unit tests for host configuration.

use std::path::PathBuf;

use serial_test::serial;

use chunker_host::config::{collect_java_options, unquote, ENGINE_OVERRIDE_ENV};
use chunker_host::{AppError, HostConfig};

/// An empty document yields the defaults.
#[test]
fn empty_config_uses_defaults() {
    let config = HostConfig::from_toml_str("").expect("parse");
    assert_eq!(config, HostConfig::default());
    assert_eq!(config.session_limits().max_archive_bytes, 2 * 1024 * 1024 * 1024);
    assert!(config.staging_root().ends_with("chunker-host"));
}

/// Every section is read.
#[test]
fn full_config_is_parsed() {
    let config = HostConfig::from_toml_str(
        r#"
[engine]
executable = "/opt/chunker/chunker-cli"
install_dir = "/opt/chunker"
java_options = "-Dfile.encoding=UTF-8"

[staging]
root = "/var/tmp/sessions"
max_archive_bytes = 1048576
"#,
    )
    .expect("parse");

    assert_eq!(config.engine.executable, Some(PathBuf::from("/opt/chunker/chunker-cli")));
    assert_eq!(config.install_dir(), PathBuf::from("/opt/chunker"));
    assert_eq!(config.staging_root(), PathBuf::from("/var/tmp/sessions"));
    assert_eq!(config.session_limits().max_archive_bytes, 1_048_576);
}

/// Invalid values are configuration errors.
#[test]
fn invalid_config_is_rejected() {
    let err = HostConfig::from_toml_str("[staging]\nmax_archive_bytes = 0\n").expect_err("zero");
    assert!(matches!(err, AppError::Config(_)));

    let err = HostConfig::from_toml_str("[staging]\nroot = \"\"\n").expect_err("empty root");
    assert!(matches!(err, AppError::Config(_)));

    let err = HostConfig::from_toml_str("engine = [").expect_err("syntax");
    assert!(matches!(err, AppError::Config(ref msg) if msg.starts_with("invalid config")));
}

/// Launch options merge configured and command-line JVM options.
#[test]
fn launch_options_merge_java_options() {
    let config = HostConfig::from_toml_str(
        "[engine]\ninstall_dir = \"/opt/chunker\"\njava_options = \" -Dfoo=1 \"\n",
    )
    .expect("parse");

    let launch = config.launch_options(&["-Xmx2G".to_owned(), "  ".to_owned()]);
    assert_eq!(launch.java_options, "-Dfoo=1 -Xmx2G");
    assert_eq!(launch.install_dir, PathBuf::from("/opt/chunker"));
    assert_eq!(launch.executable_override, None);
}

/// Only heap arguments are forwarded from trailing arguments; explicit
/// options are unquoted.
#[test]
fn java_options_from_command_line() {
    let trailing = vec!["-Xmx4G".to_owned(), "--verbose".to_owned(), "-Xms1G".to_owned()];
    let explicit = vec!["\"-Dfoo=bar\"".to_owned(), "'-Dbaz=1'".to_owned(), "-Dq".to_owned()];

    assert_eq!(
        collect_java_options(&trailing, &explicit),
        vec!["-Xmx4G", "-Xms1G", "-Dfoo=bar", "-Dbaz=1", "-Dq"]
    );
}

/// Only one matching pair of quotes is removed.
#[test]
fn unquote_strips_one_matching_pair() {
    assert_eq!(unquote("\"a b\""), "a b");
    assert_eq!(unquote("'x'"), "x");
    assert_eq!(unquote("\"mismatch'"), "\"mismatch'");
    assert_eq!(unquote("\""), "\"");
    assert_eq!(unquote("plain"), "plain");
}

/// The environment override replaces the configured executable.
#[test]
#[serial]
fn env_override_replaces_executable() {
    std::env::set_var(ENGINE_OVERRIDE_ENV, "/custom/engines/");
    let mut config = HostConfig::default();
    config.apply_env_overrides();
    std::env::remove_var(ENGINE_OVERRIDE_ENV);

    assert_eq!(config.engine.executable, Some(PathBuf::from("/custom/engines/")));
}

/// An empty override is ignored.
#[test]
#[serial]
fn empty_env_override_is_ignored() {
    std::env::set_var(ENGINE_OVERRIDE_ENV, "  ");
    let mut config = HostConfig::default();
    config.engine.executable = Some(PathBuf::from("/configured"));
    config.apply_env_overrides();
    std::env::remove_var(ENGINE_OVERRIDE_ENV);

    assert_eq!(config.engine.executable, Some(PathBuf::from("/configured")));
}
