// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-dataset acceleration refresh settings, as resolved by the catalog.

use serde::{Deserialize, Serialize};

/// How a reflection's materialization is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMethod {
    /// Recompute the whole reflection into a new series.
    #[default]
    Full,
    /// Append new data to the current series' table.
    Incremental,
}

crate::simple_display! {
    RefreshMethod {
        Full => "full",
        Incremental => "incremental",
    }
}

/// Refresh policy attached to a dataset.
///
/// A reflection inherits the settings of its upstream datasets; when several
/// datasets feed one reflection the most eager values win (see [`RefreshSettings::merge`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSettings {
    /// Interval between scheduled refreshes.
    pub refresh_period_ms: u64,
    /// How long a materialization stays usable after its source snapshot was read.
    pub grace_period_ms: u64,
    pub method: RefreshMethod,
    /// Manual policy: never schedule a refresh automatically.
    pub never_refresh: bool,
    /// Materializations never expire.
    pub never_expire: bool,
    /// Refresh when the upstream table snapshot changes instead of on a timer.
    pub snapshot_based: bool,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            refresh_period_ms: 60 * 60 * 1000,
            grace_period_ms: 3 * 60 * 60 * 1000,
            method: RefreshMethod::Full,
            never_refresh: false,
            never_expire: false,
            snapshot_based: false,
        }
    }
}

impl RefreshSettings {
    /// Combine the settings of two upstream datasets.
    ///
    /// Shortest period and grace win; a reflection only refreshes
    /// incrementally or never refreshes when every upstream agrees.
    pub fn merge(&self, other: &RefreshSettings) -> RefreshSettings {
        let method = if self.method == RefreshMethod::Incremental
            && other.method == RefreshMethod::Incremental
        {
            RefreshMethod::Incremental
        } else {
            RefreshMethod::Full
        };
        RefreshSettings {
            refresh_period_ms: self.refresh_period_ms.min(other.refresh_period_ms),
            grace_period_ms: self.grace_period_ms.min(other.grace_period_ms),
            method,
            never_refresh: self.never_refresh && other.never_refresh,
            never_expire: self.never_expire && other.never_expire,
            snapshot_based: self.snapshot_based || other.snapshot_based,
        }
    }

    /// Expiration for a materialization whose source was read at `refreshed_at_ms`.
    pub fn expiration_from(&self, refreshed_at_ms: u64) -> Option<u64> {
        if self.never_expire {
            None
        } else {
            Some(refreshed_at_ms.saturating_add(self.grace_period_ms))
        }
    }
}

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;
