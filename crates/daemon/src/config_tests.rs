// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn clear_env() {
    for key in ["REFL_STATE_DIR", "REFL_CONFIG", "REFL_SYNC_INTERVAL_MS"] {
        std::env::remove_var(key);
    }
}

const FULL: &str = r#"
[manager]
refresh_interval_secs = 30
max_refresh_attempts = 5

[daemon]
state_dir = "/var/lib/refl"
catalog_manifest = "/etc/refl/catalog.toml"
sql_command = "duckdb warehouse.db"
snapshot_interval_secs = 120
"#;

#[test]
#[serial]
fn parses_both_sections() {
    clear_env();
    let config = Config::from_toml_str(FULL).unwrap();

    assert_eq!(config.manager.refresh_interval_secs, 30);
    assert_eq!(config.manager.max_refresh_attempts, 5);
    assert_eq!(config.manager.wakeup_overlap_secs, ManagerConfig::default().wakeup_overlap_secs);
    assert_eq!(config.state_dir, PathBuf::from("/var/lib/refl"));
    assert_eq!(config.lock_path, PathBuf::from("/var/lib/refl/refld.pid"));
    assert_eq!(config.catalog_manifest, PathBuf::from("/etc/refl/catalog.toml"));
    assert_eq!(config.sql_command, "duckdb warehouse.db");
    assert_eq!(config.sync_interval, Duration::from_secs(30));
    assert_eq!(config.snapshot_interval, Duration::from_secs(120));
}

#[test]
#[serial]
fn environment_overrides_file() {
    clear_env();
    std::env::set_var("REFL_STATE_DIR", "/tmp/refl-test");
    std::env::set_var("REFL_SYNC_INTERVAL_MS", "500");
    let config = Config::from_toml_str(FULL).unwrap();
    clear_env();

    assert_eq!(config.state_dir, PathBuf::from("/tmp/refl-test"));
    assert_eq!(config.snapshot_path, PathBuf::from("/tmp/refl-test/snapshot.json.zst"));
    assert_eq!(config.sync_interval, Duration::from_millis(500));
}

#[test]
#[serial]
fn manifest_defaults_into_state_dir() {
    clear_env();
    std::env::set_var("REFL_STATE_DIR", "/srv/refl");
    let config = Config::from_toml_str("").unwrap();
    clear_env();

    assert_eq!(config.catalog_manifest, PathBuf::from("/srv/refl/catalog.toml"));
    assert_eq!(config.manager, ManagerConfig::default());
    assert_eq!(config.sql_command, DaemonSection::default().sql_command);
}

#[yare::parameterized(
    bad_toml       = { "[manager\nrefresh_interval_secs = 1" },
    wrong_type     = { "[manager]\nmax_refresh_attempts = \"three\"" },
    zero_interval  = { "[manager]\nrefresh_interval_secs = 0" },
    empty_root     = { "[manager]\naccelerator_root = \"\"" },
)]
#[serial]
fn rejects_invalid_config(text: &str) {
    clear_env();
    std::env::set_var("REFL_STATE_DIR", "/tmp/refl-test");
    let result = Config::from_toml_str(text);
    clear_env();
    assert!(matches!(result, Err(LifecycleError::Config(_))));
}

#[test]
#[serial]
fn load_reads_file() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refl.toml");
    std::fs::write(&path, FULL).unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.manager.refresh_interval_secs, 30);

    let missing = Config::load(Some(&dir.path().join("missing.toml")));
    assert!(matches!(missing, Err(LifecycleError::ConfigRead(..))));
}
