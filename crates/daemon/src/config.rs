// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon configuration: the `[manager]` and `[daemon]` sections of the
//! config file, resolved against the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use refl_engine::{ConfigError, ManagerConfig};
use serde::Deserialize;

use crate::lifecycle::LifecycleError;

/// The `[daemon]` section
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DaemonSection {
    pub state_dir: Option<PathBuf>,
    /// TOML manifest of `[[dataset]]` tables. Defaults to `catalog.toml` in
    /// the state directory.
    pub catalog_manifest: Option<PathBuf>,
    /// Shell command receiving each job's SQL statement on stdin.
    pub sql_command: String,
    pub snapshot_interval_secs: u64,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            state_dir: None,
            catalog_manifest: None,
            sql_command: "cat > /dev/null".to_string(),
            snapshot_interval_secs: 60,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    manager: ManagerConfig,
    daemon: DaemonSection,
}

/// Resolved daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub manager: ManagerConfig,
    /// Root state directory (e.g. ~/.local/state/refl)
    pub state_dir: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Directory of daily daemon logs
    pub log_dir: PathBuf,
    pub snapshot_path: PathBuf,
    pub catalog_manifest: PathBuf,
    /// Root of the table namespace
    pub tables_path: PathBuf,
    pub sql_command: String,
    pub sync_interval: Duration,
    pub snapshot_interval: Duration,
}

impl Config {
    /// Load from `path` (or `REFL_CONFIG`), falling back to defaults when no
    /// file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, LifecycleError> {
        let path = path.map(Path::to_path_buf).or_else(crate::env::config_path);
        let text = match path {
            Some(ref path) => std::fs::read_to_string(path)
                .map_err(|e| LifecycleError::ConfigRead(path.clone(), e))?,
            None => String::new(),
        };
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, LifecycleError> {
        let file: ConfigFile = toml::from_str(text).map_err(ConfigError::from)?;
        file.manager.validate()?;

        let state_dir = match (crate::env::state_dir_override(), file.daemon.state_dir) {
            (Some(dir), _) | (None, Some(dir)) => dir,
            (None, None) => crate::env::state_dir()?,
        };
        let sync_interval =
            crate::env::sync_interval().unwrap_or_else(|| file.manager.refresh_interval());

        Ok(Self {
            lock_path: state_dir.join("refld.pid"),
            log_dir: state_dir.join("logs"),
            snapshot_path: state_dir.join("snapshot.json.zst"),
            catalog_manifest: file
                .daemon
                .catalog_manifest
                .unwrap_or_else(|| state_dir.join("catalog.toml")),
            tables_path: state_dir.join("tables"),
            sql_command: file.daemon.sql_command,
            sync_interval,
            snapshot_interval: Duration::from_secs(file.daemon.snapshot_interval_secs.max(1)),
            manager: file.manager,
            state_dir,
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
