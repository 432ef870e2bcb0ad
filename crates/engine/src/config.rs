// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reflection manager configuration (`[manager]` section).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors from parsing or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

const SEC: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Period of the scheduled wakeup.
    pub refresh_interval_secs: u64,
    /// Goals modified this long before the previous wakeup are re-read.
    pub wakeup_overlap_secs: u64,
    pub deletion_grace_period_secs: u64,
    /// Extra wait before a DELETED goal is purged.
    pub goal_deletion_wait_secs: u64,
    pub deleted_dataset_sweep_interval_secs: u64,
    pub no_dependency_refresh_period_secs: u64,
    pub refresh_pending_timeout_secs: u64,
    pub max_refresh_attempts: u32,
    pub retry_backoff_base_secs: u64,
    /// Drop jobs (re)submitted per pass for orphaned materializations.
    pub orphan_delete_budget: usize,
    pub job_submission_timeout_ms: u64,
    /// Un-compacted refreshes in a series before an OPTIMIZE is submitted.
    pub compaction_refresh_threshold: usize,
    /// Table snapshots since the last vacuum before another is due.
    pub vacuum_snapshot_threshold: u32,
    pub enable_vacuum: bool,
    pub enable_compaction: bool,
    pub materialization_cache_enabled: bool,
    pub plan_cache_enabled: bool,
    pub cache_refresh_delay_secs: u64,
    pub cache_grace_buffer_secs: u64,
    pub optimistic_retry_attempts: u32,
    /// Root folder of materialization tables.
    pub accelerator_root: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 10,
            wakeup_overlap_secs: 60,
            deletion_grace_period_secs: 4 * 60 * 60,
            goal_deletion_wait_secs: 4 * 60 * 60,
            deleted_dataset_sweep_interval_secs: 60 * 60,
            no_dependency_refresh_period_secs: 30 * 60,
            refresh_pending_timeout_secs: 30 * 60,
            max_refresh_attempts: 3,
            retry_backoff_base_secs: 60,
            orphan_delete_budget: 10,
            job_submission_timeout_ms: 60_000,
            compaction_refresh_threshold: 10,
            vacuum_snapshot_threshold: 10,
            enable_vacuum: true,
            enable_compaction: true,
            materialization_cache_enabled: true,
            plan_cache_enabled: false,
            cache_refresh_delay_secs: 30,
            cache_grace_buffer_secs: 60,
            optimistic_retry_attempts: 2,
            accelerator_root: "__accelerator".to_string(),
        }
    }
}

impl ManagerConfig {
    /// Parse a `[manager]` table body.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ManagerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid("refresh_interval_secs must be positive".into()));
        }
        if self.max_refresh_attempts == 0 {
            return Err(ConfigError::Invalid("max_refresh_attempts must be positive".into()));
        }
        if self.accelerator_root.is_empty() {
            return Err(ConfigError::Invalid("accelerator_root must not be empty".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn job_submission_timeout(&self) -> Duration {
        Duration::from_millis(self.job_submission_timeout_ms)
    }

    /// How long a DEPRECATED materialization is kept before physical deletion.
    ///
    /// With a materialization or plan cache in front of the planner, readers
    /// may hold a descriptor until the cache refreshes, so the grace period is
    /// at least the cache refresh delay plus a buffer.
    pub fn deletion_grace_period_ms(&self) -> u64 {
        let fixed = ms(self.deletion_grace_period_secs);
        if self.materialization_cache_enabled || self.plan_cache_enabled {
            fixed.max(ms(self.cache_refresh_delay_secs.saturating_add(self.cache_grace_buffer_secs)))
        } else {
            fixed
        }
    }

    pub fn goal_deletion_wait_ms(&self) -> u64 {
        ms(self.goal_deletion_wait_secs)
    }

    pub fn wakeup_overlap_ms(&self) -> u64 {
        ms(self.wakeup_overlap_secs)
    }

    pub fn deleted_dataset_sweep_interval_ms(&self) -> u64 {
        ms(self.deleted_dataset_sweep_interval_secs)
    }

    pub fn no_dependency_refresh_period_ms(&self) -> u64 {
        ms(self.no_dependency_refresh_period_secs)
    }

    pub fn refresh_pending_timeout_ms(&self) -> u64 {
        ms(self.refresh_pending_timeout_secs)
    }

    /// Wait after the `num_failures`-th consecutive failure before retrying.
    pub fn retry_backoff_ms(&self, num_failures: u32) -> u64 {
        if num_failures == 0 {
            return 0;
        }
        let exponent = (num_failures - 1).min(10);
        ms(self.retry_backoff_base_secs).saturating_mul(1 << exponent)
    }
}

/// Seconds to milliseconds, saturating on absurd configured values.
fn ms(secs: u64) -> u64 {
    secs.saturating_mul(SEC)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
