// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn clear() {
    for key in ["REFL_STATE_DIR", "REFL_CONFIG", "REFL_SYNC_INTERVAL_MS", "XDG_STATE_HOME"] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn state_dir_prefers_explicit_override() {
    clear();
    std::env::set_var("XDG_STATE_HOME", "/xdg");
    std::env::set_var("REFL_STATE_DIR", "/custom");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/custom"));
    clear();
}

#[test]
#[serial]
fn state_dir_falls_back_to_xdg() {
    clear();
    std::env::set_var("XDG_STATE_HOME", "/xdg");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/xdg/refl"));
    clear();
}

#[test]
#[serial]
fn empty_override_is_ignored() {
    clear();
    std::env::set_var("REFL_STATE_DIR", "");
    std::env::set_var("XDG_STATE_HOME", "/xdg");
    assert_eq!(state_dir().unwrap(), PathBuf::from("/xdg/refl"));
    clear();
}

#[yare::parameterized(
    unset    = { None, None },
    millis   = { Some("250"), Some(Duration::from_millis(250)) },
    zero     = { Some("0"), None },
    garbage  = { Some("soon"), None },
)]
#[serial]
fn sync_interval_parses_millis(value: Option<&str>, expected: Option<Duration>) {
    clear();
    if let Some(v) = value {
        std::env::set_var("REFL_SYNC_INTERVAL_MS", v);
    }
    assert_eq!(sync_interval(), expected);
    clear();
}

#[test]
#[serial]
fn config_path_reads_env() {
    clear();
    assert_eq!(config_path(), None);
    std::env::set_var("REFL_CONFIG", "/etc/refl.toml");
    assert_eq!(config_path(), Some(PathBuf::from("/etc/refl.toml")));
    clear();
}
