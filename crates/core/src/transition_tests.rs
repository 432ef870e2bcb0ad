// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::strategies::{arb_observation, arb_reflection_state};
use proptest::prelude::*;

fn obs(due: bool, dependency_refreshing: bool, pending_timed_out: bool) -> Observation {
    Observation { due, dependency_refreshing, pending_timed_out, vacuum_eligible: false }
}

#[yare::parameterized(
    refresh_submits      = { ReflectionState::Refresh, obs(false, false, false), ReflectionState::Refreshing, Action::SubmitRefresh },
    pending_blocked      = { ReflectionState::RefreshPending, obs(true, true, false), ReflectionState::RefreshPending, Action::Nothing },
    pending_unblocked    = { ReflectionState::RefreshPending, obs(true, false, false), ReflectionState::Refresh, Action::Nothing },
    pending_timed_out    = { ReflectionState::RefreshPending, obs(true, true, true), ReflectionState::Refresh, Action::Nothing },
    active_idle          = { ReflectionState::Active, obs(false, false, false), ReflectionState::Active, Action::Nothing },
    active_due           = { ReflectionState::Active, obs(true, false, false), ReflectionState::Refresh, Action::Nothing },
    active_due_blocked   = { ReflectionState::Active, obs(true, true, false), ReflectionState::RefreshPending, Action::Nothing },
    refreshing_polls     = { ReflectionState::Refreshing, obs(true, true, true), ReflectionState::Refreshing, Action::PollJob },
    compacting_polls     = { ReflectionState::Compacting, obs(false, false, false), ReflectionState::Compacting, Action::PollJob },
    update_resubmits     = { ReflectionState::Update, obs(false, false, false), ReflectionState::Refreshing, Action::CancelAndRefresh },
    deprecate_removes    = { ReflectionState::Deprecate, obs(true, false, false), ReflectionState::Deprecate, Action::Remove },
    failed_is_absorbing  = { ReflectionState::Failed, obs(true, false, true), ReflectionState::Failed, Action::Nothing },
)]
fn transitions(state: ReflectionState, o: Observation, next: ReflectionState, action: Action) {
    assert_eq!(step(state, o), Step { next, action });
}

#[test]
fn active_vacuums_only_when_not_due() {
    let eligible = Observation { vacuum_eligible: true, ..Observation::default() };
    assert_eq!(step(ReflectionState::Active, eligible).action, Action::Vacuum);

    let due = Observation { due: true, vacuum_eligible: true, ..Observation::default() };
    assert_eq!(step(ReflectionState::Active, due).next, ReflectionState::Refresh);
}

#[test]
fn refresh_is_pass_through() {
    let s = step(ReflectionState::Active, obs(true, false, false));
    assert!(s.continues());
    let s = step(s.next, Observation::default());
    assert_eq!(s.action, Action::SubmitRefresh);
    assert!(!s.continues());
}

#[yare::parameterized(
    first_failure = { 1, 3, ReflectionState::Active },
    below_max     = { 2, 3, ReflectionState::Active },
    at_max        = { 3, 3, ReflectionState::Failed },
    over_max      = { 9, 3, ReflectionState::Failed },
    zero_budget   = { 1, 0, ReflectionState::Failed },
)]
fn failure_budget(num_failures: u32, max: u32, expected: ReflectionState) {
    assert_eq!(after_failure(num_failures, max), expected);
}

#[yare::parameterized(
    never_pending = { None, 100, 10, false },
    waiting       = { Some(95), 100, 10, false },
    exact         = { Some(90), 100, 10, true },
    clock_skew    = { Some(200), 100, 10, false },
)]
fn pending_timeout(begin: Option<u64>, now: u64, timeout: u64, expected: bool) {
    assert_eq!(pending_timed_out(begin, now, timeout), expected);
}

proptest! {
    #[test]
    fn pending_leaves_once_unblocked_or_timed_out(o in arb_observation()) {
        let s = step(ReflectionState::RefreshPending, o);
        if !o.dependency_refreshing || o.pending_timed_out {
            prop_assert_eq!(s.next, ReflectionState::Refresh);
        } else {
            prop_assert_eq!(s.next, ReflectionState::RefreshPending);
        }
    }

    #[test]
    fn only_refresh_and_update_submit(state in arb_reflection_state(), o in arb_observation()) {
        let s = step(state, o);
        let submits = matches!(s.action, Action::SubmitRefresh | Action::CancelAndRefresh);
        prop_assert_eq!(
            submits,
            matches!(state, ReflectionState::Refresh | ReflectionState::Update)
        );
        if submits {
            prop_assert_eq!(s.next, ReflectionState::Refreshing);
        }
    }

    #[test]
    fn failed_never_moves(o in arb_observation()) {
        prop_assert_eq!(step(ReflectionState::Failed, o).next, ReflectionState::Failed);
    }

    #[test]
    fn failures_below_budget_retry(max in 1u32..10, n in 0u32..20) {
        let state = after_failure(n, max);
        prop_assert_eq!(state == ReflectionState::Failed, n >= max);
    }
}
