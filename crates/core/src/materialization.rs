// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materializations: physical generations of a reflection's output.
//!
//! A series is one physical table. A full refresh starts a new series; each
//! incremental refresh or compaction adds a generation to the current series
//! and shares its table (`base_path`).

use crate::entry::Failure;
use crate::id::{JobId, MaterializationId, ReflectionId};
use crate::settings::RefreshMethod;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationState {
    Running,
    Done,
    Failed,
    Canceled,
    /// No longer served; physically deleted after the grace period.
    Deprecated,
    /// Physical cleanup submitted; the record goes once the drop job completes.
    Deleted,
}

crate::simple_display! {
    MaterializationState {
        Running => "running",
        Done => "done",
        Failed => "failed",
        Canceled => "canceled",
        Deprecated => "deprecated",
        Deleted => "deleted",
    }
}

/// What produced a materialization generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationKind {
    #[default]
    Refresh,
    Compaction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Materialization {
    pub id: MaterializationId,
    #[serde(default)]
    pub tag: u64,
    pub reflection_id: ReflectionId,
    #[serde(default)]
    pub kind: MaterializationKind,
    pub state: MaterializationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_refresh_job_id: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drop_job_id: Option<JobId>,
    pub series_id: u64,
    pub series_ordinal: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_from_pds: Option<u64>,
    /// Table directory under the reflection's folder, shared within a series.
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iceberg_snapshot_id: Option<i64>,
    /// Table snapshot before this generation wrote; rollback target on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_iceberg_snapshot: Option<i64>,
    #[serde(default)]
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub refresh_method: RefreshMethod,
    #[serde(default)]
    pub is_stale: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    pub reflection_goal_version: u64,
    pub created_at: u64,
    pub modified_at: u64,
}

/// Parameters for a new RUNNING generation.
#[derive(Debug, Clone)]
pub struct NewMaterialization {
    pub reflection_id: ReflectionId,
    pub kind: MaterializationKind,
    pub series_id: u64,
    pub series_ordinal: u32,
    /// `None` starts a new table named after the materialization id.
    pub base_path: Option<String>,
    pub previous_iceberg_snapshot: Option<i64>,
    pub refresh_method: RefreshMethod,
    pub reflection_goal_version: u64,
}

impl Materialization {
    pub fn new(params: NewMaterialization, now_ms: u64) -> Self {
        let id = MaterializationId::new();
        let base_path = params.base_path.unwrap_or_else(|| id.to_string());
        Self {
            id,
            tag: 0,
            reflection_id: params.reflection_id,
            kind: params.kind,
            state: MaterializationState::Running,
            init_refresh_job_id: None,
            drop_job_id: None,
            series_id: params.series_id,
            series_ordinal: params.series_ordinal,
            expiration: None,
            last_refresh_from_pds: None,
            base_path,
            iceberg_snapshot_id: None,
            previous_iceberg_snapshot: params.previous_iceberg_snapshot,
            primary_key: Vec::new(),
            refresh_method: params.refresh_method,
            is_stale: false,
            failure: None,
            reflection_goal_version: params.reflection_goal_version,
            created_at: now_ms,
            modified_at: now_ms,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expiration.is_some_and(|e| e <= now_ms)
    }

    /// DONE and not expired: the planner may substitute it.
    pub fn is_usable(&self, now_ms: u64) -> bool {
        self.state == MaterializationState::Done && !self.is_expired(now_ms)
    }

    /// Catalog path of the materialization's table.
    pub fn table_path(&self, accelerator_root: &str) -> Vec<String> {
        vec![accelerator_root.to_string(), self.reflection_id.to_string(), self.base_path.clone()]
    }

    /// Mark failed or canceled with a reason.
    pub fn fail(&mut self, state: MaterializationState, message: impl Into<String>, now_ms: u64) {
        self.state = state;
        self.failure = Some(Failure { message: message.into(), at_ms: now_ms });
    }
}

crate::builder! {
    pub struct MaterializationBuilder => Materialization {
        into {
            id: MaterializationId = "mat-test",
            reflection_id: ReflectionId = "rfl-test",
            base_path: String = "mat-test",
        }
        set {
            tag: u64 = 0,
            kind: MaterializationKind = MaterializationKind::Refresh,
            state: MaterializationState = MaterializationState::Done,
            init_refresh_job_id: Option<JobId> = None,
            drop_job_id: Option<JobId> = None,
            series_id: u64 = 1,
            series_ordinal: u32 = 0,
            expiration: Option<u64> = None,
            last_refresh_from_pds: Option<u64> = None,
            iceberg_snapshot_id: Option<i64> = None,
            previous_iceberg_snapshot: Option<i64> = None,
            primary_key: Vec<String> = Vec::new(),
            refresh_method: RefreshMethod = RefreshMethod::Full,
            is_stale: bool = false,
            failure: Option<Failure> = None,
            reflection_goal_version: u64 = 0,
            created_at: u64 = 0,
            modified_at: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "materialization_tests.rs"]
mod tests;
