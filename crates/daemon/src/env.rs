// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: REFL_STATE_DIR > XDG_STATE_HOME/refl > ~/.local/state/refl
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Some(dir) = state_dir_override() {
        return Ok(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("refl"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/refl"))
}

/// Explicit state directory, taking precedence over the config file
pub fn state_dir_override() -> Option<PathBuf> {
    std::env::var("REFL_STATE_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Config file path from `REFL_CONFIG`
pub fn config_path() -> Option<PathBuf> {
    std::env::var("REFL_CONFIG").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Scheduled pass interval override
pub fn sync_interval() -> Option<Duration> {
    std::env::var("REFL_SYNC_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
