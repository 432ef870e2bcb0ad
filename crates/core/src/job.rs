// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jobs submitted to the external job service and what they report back.

use crate::dependency::DependencyEntry;
use crate::id::{JobId, MaterializationId, ReflectionId};
use crate::refresh::RefreshMetrics;
use crate::settings::RefreshMethod;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

crate::simple_display! {
    JobState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Canceled => "canceled",
    }
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Canceled)
    }
}

/// Statement family of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Refresh,
    /// `OPTIMIZE TABLE`
    Compact,
    /// Snapshot expiry of an incremental table.
    Vacuum,
    /// `DROP TABLE` of a deprecated materialization.
    Drop,
    /// Roll a table back to a snapshot after a failed write.
    Rollback,
}

crate::simple_display! {
    JobKind {
        Refresh => "refresh",
        Compact => "compact",
        Vacuum => "vacuum",
        Drop => "drop",
        Rollback => "rollback",
    }
}

/// A statement to run on behalf of a reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub kind: JobKind,
    pub reflection_id: ReflectionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub materialization_id: Option<MaterializationId>,
    pub statement: String,
}

impl JobRequest {
    pub fn refresh(reflection_id: &ReflectionId, materialization_id: &MaterializationId) -> Self {
        Self {
            kind: JobKind::Refresh,
            reflection_id: reflection_id.clone(),
            materialization_id: Some(materialization_id.clone()),
            statement: format!("REFRESH REFLECTION '{reflection_id}' AS '{materialization_id}'"),
        }
    }

    pub fn compact(
        reflection_id: &ReflectionId,
        materialization_id: &MaterializationId,
        table: &[String],
    ) -> Self {
        Self {
            kind: JobKind::Compact,
            reflection_id: reflection_id.clone(),
            materialization_id: Some(materialization_id.clone()),
            statement: format!("OPTIMIZE TABLE {}", quote_path(table)),
        }
    }

    pub fn vacuum(reflection_id: &ReflectionId, table: &[String], older_than_ms: u64) -> Self {
        Self {
            kind: JobKind::Vacuum,
            reflection_id: reflection_id.clone(),
            materialization_id: None,
            statement: format!(
                "VACUUM TABLE {} EXPIRE SNAPSHOTS older_than {older_than_ms}",
                quote_path(table)
            ),
        }
    }

    pub fn drop_table(
        reflection_id: &ReflectionId,
        materialization_id: &MaterializationId,
        table: &[String],
    ) -> Self {
        Self {
            kind: JobKind::Drop,
            reflection_id: reflection_id.clone(),
            materialization_id: Some(materialization_id.clone()),
            statement: format!("DROP TABLE IF EXISTS {}", quote_path(table)),
        }
    }

    pub fn rollback(
        reflection_id: &ReflectionId,
        materialization_id: &MaterializationId,
        table: &[String],
        snapshot_id: i64,
    ) -> Self {
        Self {
            kind: JobKind::Rollback,
            reflection_id: reflection_id.clone(),
            materialization_id: Some(materialization_id.clone()),
            statement: format!("ROLLBACK TABLE {} TO SNAPSHOT '{snapshot_id}'", quote_path(table)),
        }
    }
}

fn quote_path(path: &[String]) -> String {
    path.iter().map(|p| format!("\"{}\"", p.replace('"', "\"\""))).collect::<Vec<_>>().join(".")
}

/// What the refresh planner decided and observed for one refresh job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshDecision {
    pub method: RefreshMethod,
    pub snapshot_based: bool,
    /// Planner chose to rebuild from scratch: the output starts a new series.
    pub initial_refresh: bool,
    pub update_id: Option<u64>,
    pub dependencies: Vec<DependencyEntry>,
    /// Columns to declare as the table's primary key on registration.
    pub primary_key: Vec<String>,
    pub iceberg_snapshot_id: Option<i64>,
    pub metrics: RefreshMetrics,
    /// Upstream datasets have not changed since the previous refresh.
    pub no_op: bool,
}

/// The most recent attempt of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAttempt {
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<RefreshDecision>,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDetails {
    pub job_id: JobId,
    pub kind: JobKind,
    pub completed: bool,
    pub last_attempt: JobAttempt,
}

impl JobDetails {
    pub fn state(&self) -> JobState {
        self.last_attempt.state
    }

    /// Human-readable failure reason for a FAILED/CANCELED attempt.
    pub fn failure_message(&self) -> String {
        match &self.last_attempt.failure {
            Some(message) => message.clone(),
            None => format!("job {} {}", self.job_id, self.last_attempt.state),
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
