// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{
    DependencyEntry, GoalState, JobAttempt, JobDetails, JobId, JobKind, JobState, RefreshDecision,
    RefreshMethod, ReflectionGoal,
};

// ── Proptest strategies ─────────────────────────────────────────────────

/// Proptest strategies for core state machine types.
pub mod strategies {
    use crate::entry::ReflectionState;
    use crate::transition::Observation;
    use proptest::prelude::*;

    pub fn arb_reflection_state() -> impl Strategy<Value = ReflectionState> {
        prop_oneof![
            Just(ReflectionState::Refresh),
            Just(ReflectionState::RefreshPending),
            Just(ReflectionState::Refreshing),
            Just(ReflectionState::Compacting),
            Just(ReflectionState::Active),
            Just(ReflectionState::Failed),
            Just(ReflectionState::Update),
            Just(ReflectionState::Deprecate),
        ]
    }

    pub fn arb_observation() -> impl Strategy<Value = Observation> {
        (any::<bool>(), any::<bool>(), any::<bool>(), any::<bool>()).prop_map(
            |(due, dependency_refreshing, pending_timed_out, vacuum_eligible)| Observation {
                due,
                dependency_refreshing,
                pending_timed_out,
                vacuum_eligible,
            },
        )
    }
}

// ── Record factories ────────────────────────────────────────────────────

/// Enabled raw goal on `dataset` with a fixed id.
pub fn raw_goal(id: &str, dataset: &str) -> ReflectionGoal {
    ReflectionGoal::builder().id(id).dataset_id(dataset).build()
}

pub fn deleted_goal(id: &str, dataset: &str, modified_at: u64) -> ReflectionGoal {
    ReflectionGoal::builder()
        .id(id)
        .dataset_id(dataset)
        .state(GoalState::Deleted)
        .modified_at(modified_at)
        .build()
}

/// Successful full refresh reading `dataset` at `snapshot`.
pub fn completed_refresh(job_id: &JobId, dataset: &str, snapshot: Option<&str>) -> JobDetails {
    refresh_details(
        job_id,
        JobState::Completed,
        None,
        RefreshDecision {
            method: RefreshMethod::Full,
            initial_refresh: true,
            dependencies: vec![DependencyEntry::dataset(dataset, snapshot)],
            ..RefreshDecision::default()
        },
    )
}

pub fn failed_refresh(job_id: &JobId, message: &str) -> JobDetails {
    JobDetails {
        job_id: job_id.clone(),
        kind: JobKind::Refresh,
        completed: true,
        last_attempt: JobAttempt {
            state: JobState::Failed,
            failure: Some(message.to_string()),
            decision: None,
            duration_ms: 10,
        },
    }
}

pub fn refresh_details(
    job_id: &JobId,
    state: JobState,
    failure: Option<&str>,
    decision: RefreshDecision,
) -> JobDetails {
    JobDetails {
        job_id: job_id.clone(),
        kind: JobKind::Refresh,
        completed: state.is_terminal(),
        last_attempt: JobAttempt {
            state,
            failure: failure.map(String::from),
            decision: Some(decision),
            duration_ms: 10,
        },
    }
}

/// Terminal details for a non-refresh job.
pub fn finished_job(job_id: &JobId, kind: JobKind, state: JobState) -> JobDetails {
    JobDetails {
        job_id: job_id.clone(),
        kind,
        completed: state.is_terminal(),
        last_attempt: JobAttempt { state, failure: None, decision: None, duration_ms: 1 },
    }
}
