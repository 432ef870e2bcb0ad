// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reflection entries: the manager-owned current state of a reflection.

use crate::goal::ReflectionGoal;
use crate::id::{DatasetId, JobId, ReflectionId};
use crate::settings::RefreshMethod;
use serde::{Deserialize, Serialize};

/// State of a reflection entry. See [`crate::transition`] for the edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionState {
    /// Refresh requested; submitted on the next reconciliation.
    Refresh,
    /// Due, but waiting for an upstream reflection to finish refreshing.
    RefreshPending,
    /// A refresh job is running.
    Refreshing,
    /// An OPTIMIZE job is running against the current materialization.
    Compacting,
    /// Up to date; refreshed again when due.
    Active,
    /// Retries exhausted. Left alone until the goal changes or a manual retry.
    Failed,
    /// Goal structure changed; current materializations are obsolete.
    Update,
    /// Goal disabled or deleted; entry and materializations are removed.
    Deprecate,
}

crate::simple_display! {
    ReflectionState {
        Refresh => "refresh",
        RefreshPending => "refresh_pending",
        Refreshing => "refreshing",
        Compacting => "compacting",
        Active => "active",
        Failed => "failed",
        Update => "update",
        Deprecate => "deprecate",
    }
}

impl ReflectionState {
    /// States in which the reflection's data is about to change.
    ///
    /// Downstream reflections wait while an upstream is in one of these.
    pub fn is_refreshing(self) -> bool {
        matches!(
            self,
            ReflectionState::Refresh
                | ReflectionState::RefreshPending
                | ReflectionState::Refreshing
                | ReflectionState::Update
        )
    }

    /// States that own a RUNNING materialization.
    pub fn has_running_job(self) -> bool {
        matches!(self, ReflectionState::Refreshing | ReflectionState::Compacting)
    }
}

/// Last recorded failure of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub message: String,
    pub at_ms: u64,
}

/// Current materialized state of one reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionEntry {
    pub id: ReflectionId,
    #[serde(default)]
    pub tag: u64,
    /// Tag of the goal this entry was last reconciled against.
    pub goal_version: u64,
    /// [`ReflectionGoal::content_hash`] at the last structural reconciliation.
    pub reflection_goal_hash: String,
    pub dataset_id: DatasetId,
    pub name: String,
    pub state: ReflectionState,
    pub num_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<Failure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_job_id: Option<JobId>,
    pub refresh_method: RefreshMethod,
    #[serde(default)]
    pub snapshot_based: bool,
    #[serde(default)]
    pub arrow_caching_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_pending_begin: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_submitted_refresh: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_refresh: Option<u64>,
    pub created_at: u64,
    pub modified_at: u64,
}

impl ReflectionEntry {
    /// Entry for a newly enabled goal. Starts in [`ReflectionState::Refresh`].
    pub fn from_goal(goal: &ReflectionGoal, now_ms: u64) -> Self {
        Self {
            id: goal.id.clone(),
            tag: 0,
            goal_version: goal.tag,
            reflection_goal_hash: goal.content_hash(),
            dataset_id: goal.dataset_id.clone(),
            name: goal.name.clone(),
            state: ReflectionState::Refresh,
            num_failures: 0,
            last_failure: None,
            refresh_job_id: None,
            refresh_method: RefreshMethod::Full,
            snapshot_based: false,
            arrow_caching_enabled: goal.arrow_caching_enabled,
            refresh_pending_begin: None,
            last_submitted_refresh: None,
            last_successful_refresh: None,
            created_at: now_ms,
            modified_at: now_ms,
        }
    }

    /// Whether only non-structural goal metadata differs from this entry.
    pub fn metadata_differs(&self, goal: &ReflectionGoal) -> bool {
        self.name != goal.name || self.arrow_caching_enabled != goal.arrow_caching_enabled
    }

    /// Copy non-structural goal metadata without disturbing materializations.
    pub fn patch_metadata(&mut self, goal: &ReflectionGoal) {
        self.name = goal.name.clone();
        self.arrow_caching_enabled = goal.arrow_caching_enabled;
        self.goal_version = goal.tag;
    }

    /// Move to `state`, clearing pending bookkeeping that no longer applies.
    pub fn set_state(&mut self, state: ReflectionState) {
        if state != ReflectionState::RefreshPending {
            self.refresh_pending_begin = None;
        }
        self.state = state;
    }

    /// Record a successful refresh and reset the retry history.
    pub fn record_success(&mut self, now_ms: u64) {
        self.set_state(ReflectionState::Active);
        self.num_failures = 0;
        self.last_failure = None;
        self.refresh_job_id = None;
        self.last_successful_refresh = Some(now_ms);
    }

    /// Record a failed attempt and apply the retry rule.
    pub fn record_failure(&mut self, message: impl Into<String>, now_ms: u64, max_attempts: u32) {
        self.num_failures = self.num_failures.saturating_add(1);
        self.last_failure = Some(Failure { message: message.into(), at_ms: now_ms });
        self.refresh_job_id = None;
        self.set_state(crate::transition::after_failure(self.num_failures, max_attempts));
    }
}

crate::builder! {
    pub struct ReflectionEntryBuilder => ReflectionEntry {
        into {
            id: ReflectionId = "rfl-test",
            reflection_goal_hash: String = "",
            dataset_id: DatasetId = "dst-test",
            name: String = "test-reflection",
        }
        set {
            tag: u64 = 0,
            goal_version: u64 = 0,
            state: ReflectionState = ReflectionState::Active,
            num_failures: u32 = 0,
            last_failure: Option<Failure> = None,
            refresh_job_id: Option<JobId> = None,
            refresh_method: RefreshMethod = RefreshMethod::Full,
            snapshot_based: bool = false,
            arrow_caching_enabled: bool = false,
            refresh_pending_begin: Option<u64> = None,
            last_submitted_refresh: Option<u64> = None,
            last_successful_refresh: Option<u64> = None,
            created_at: u64 = 0,
            modified_at: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
