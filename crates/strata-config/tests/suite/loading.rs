use std::io::Write;

use pretty_assertions::assert_eq;
use strata_config::{ConfigError, ConsistencyChecks, MetadataConflictPolicy, StrataConfig};
use tempfile::NamedTempFile;

#[test]
fn loads_every_section_from_disk() {
    let mut file = NamedTempFile::new().expect("tempfile");
    write!(
        file,
        r#"
[logging]
level = "debug"
json = true
stderr = false

[storage]
consistency_checks = "strict"
page_size = 32

[metadata]
on_conflict = "first_wins"

[workspace]
rebase_stale_builders = false
slow_listener_ms = 5
"#
    )
    .expect("write config");

    let config = StrataConfig::load_from_path(file.path()).expect("config should load");

    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
    assert!(!config.logging.stderr);
    assert_eq!(config.storage.consistency_checks, ConsistencyChecks::Strict);
    assert_eq!(config.storage.page_size, 32);
    assert_eq!(config.metadata.on_conflict, MetadataConflictPolicy::FirstWins);
    assert!(config.metadata.freeze_on_load);
    assert!(!config.workspace.rebase_stale_builders);
    assert_eq!(config.workspace.slow_listener_ms, 5);
}

#[test]
fn missing_file_reports_the_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("strata.toml");

    let err = StrataConfig::load_from_path(&path).expect_err("file does not exist");

    match err {
        ConfigError::Io { path: reported, .. } => assert_eq!(reported, path.display().to_string()),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn bad_enum_value_is_a_toml_error() {
    let err = StrataConfig::load_from_str_with_diagnostics(
        "[storage]\nconsistency_checks = \"paranoid\"\n",
    )
    .expect_err("unknown variant");

    let message = err.to_string();
    assert!(message.starts_with("failed to parse toml config"), "{message}");
}
