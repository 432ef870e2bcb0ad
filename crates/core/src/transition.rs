// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reflection entry state machine.
//!
//! [`step`] is pure: given the entry's state and what the manager observed
//! about it this pass, it returns the next state and the [`Action`] the
//! manager must carry out. Job outcomes feed back through
//! [`after_failure`] and [`ReflectionEntry::record_success`](crate::ReflectionEntry::record_success).

use crate::entry::ReflectionState;

/// What the manager observed about an entry before stepping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Observation {
    /// A refresh is due (see the dependency manager's `should_refresh`).
    pub due: bool,
    /// Some direct or transitive upstream reflection is refreshing.
    pub dependency_refreshing: bool,
    /// The entry has waited in REFRESH_PENDING for longer than allowed.
    pub pending_timed_out: bool,
    /// The current materialization's table has accumulated enough snapshots.
    pub vacuum_eligible: bool,
}

/// Work the manager performs for a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Nothing,
    /// Create a RUNNING materialization and submit its refresh job.
    SubmitRefresh,
    /// Poll the entry's running job and apply its outcome.
    PollJob,
    /// Expire old snapshots of the current table.
    Vacuum,
    /// Cancel the in-flight job, deprecate existing materializations, then submit.
    CancelAndRefresh,
    /// Deprecate materializations and delete the entry and its edges.
    Remove,
}

crate::simple_display! {
    Action {
        Nothing => "nothing",
        SubmitRefresh => "submit_refresh",
        PollJob => "poll_job",
        Vacuum => "vacuum",
        CancelAndRefresh => "cancel_and_refresh",
        Remove => "remove",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: ReflectionState,
    pub action: Action,
}

impl Step {
    fn stay(state: ReflectionState) -> Self {
        Step { next: state, action: Action::Nothing }
    }

    fn to(next: ReflectionState, action: Action) -> Self {
        Step { next, action }
    }

    /// REFRESH is a pass-through state: the manager steps again in the same pass.
    pub fn continues(&self) -> bool {
        self.next == ReflectionState::Refresh && self.action == Action::Nothing
    }
}

/// One transition of the entry state machine.
pub fn step(state: ReflectionState, obs: Observation) -> Step {
    match state {
        ReflectionState::Refresh => Step::to(ReflectionState::Refreshing, Action::SubmitRefresh),
        ReflectionState::RefreshPending => {
            if !obs.dependency_refreshing || obs.pending_timed_out {
                Step::stay(ReflectionState::Refresh)
            } else {
                Step::stay(ReflectionState::RefreshPending)
            }
        }
        ReflectionState::Active => {
            if obs.due {
                if obs.dependency_refreshing {
                    Step::stay(ReflectionState::RefreshPending)
                } else {
                    Step::stay(ReflectionState::Refresh)
                }
            } else if obs.vacuum_eligible {
                Step::to(ReflectionState::Active, Action::Vacuum)
            } else {
                Step::stay(ReflectionState::Active)
            }
        }
        ReflectionState::Refreshing | ReflectionState::Compacting => {
            Step::to(state, Action::PollJob)
        }
        ReflectionState::Update => {
            Step::to(ReflectionState::Refreshing, Action::CancelAndRefresh)
        }
        ReflectionState::Deprecate => Step::to(ReflectionState::Deprecate, Action::Remove),
        ReflectionState::Failed => Step::stay(ReflectionState::Failed),
    }
}

/// State after a failed refresh attempt: retry from ACTIVE until the
/// attempt budget is spent, then FAILED.
pub fn after_failure(num_failures: u32, max_attempts: u32) -> ReflectionState {
    if num_failures >= max_attempts {
        ReflectionState::Failed
    } else {
        ReflectionState::Active
    }
}

/// Whether an entry pending since `begin_ms` has waited out `timeout_ms`.
pub fn pending_timed_out(begin_ms: Option<u64>, now_ms: u64, timeout_ms: u64) -> bool {
    begin_ms.is_some_and(|begin| now_ms.saturating_sub(begin) >= timeout_ms)
}

#[cfg(test)]
#[path = "transition_tests.rs"]
mod tests;
