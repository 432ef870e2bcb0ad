// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use proptest::prelude::*;

#[test]
fn from_goal_starts_in_refresh() {
    let goal = ReflectionGoal::builder().dataset_id("dst-d").tag(4).build();
    let entry = ReflectionEntry::from_goal(&goal, 77);
    assert_eq!(entry.state, ReflectionState::Refresh);
    assert_eq!(entry.dataset_id, "dst-d");
    assert_eq!(entry.num_failures, 0);
    assert_eq!(entry.goal_version, 4);
    assert_eq!(entry.reflection_goal_hash, goal.content_hash());
    assert_eq!(entry.created_at, 77);
}

#[yare::parameterized(
    refresh         = { ReflectionState::Refresh, true, false },
    refresh_pending = { ReflectionState::RefreshPending, true, false },
    refreshing      = { ReflectionState::Refreshing, true, true },
    compacting      = { ReflectionState::Compacting, false, true },
    active          = { ReflectionState::Active, false, false },
    failed          = { ReflectionState::Failed, false, false },
    update          = { ReflectionState::Update, true, false },
    deprecate       = { ReflectionState::Deprecate, false, false },
)]
fn state_predicates(state: ReflectionState, refreshing: bool, running: bool) {
    assert_eq!(state.is_refreshing(), refreshing);
    assert_eq!(state.has_running_job(), running);
}

#[test]
fn metadata_patch_keeps_structure() {
    let goal = ReflectionGoal::builder().build();
    let mut entry = ReflectionEntry::from_goal(&goal, 0);
    let renamed = ReflectionGoal::builder().name("better").arrow_caching_enabled(true).tag(2).build();

    assert!(entry.metadata_differs(&renamed));
    entry.patch_metadata(&renamed);
    assert!(!entry.metadata_differs(&renamed));
    assert_eq!(entry.goal_version, 2);
    assert_eq!(entry.reflection_goal_hash, goal.content_hash());
}

#[test]
fn leaving_pending_clears_begin() {
    let mut entry = ReflectionEntry::builder()
        .state(ReflectionState::RefreshPending)
        .refresh_pending_begin(Some(5))
        .build();
    entry.set_state(ReflectionState::RefreshPending);
    assert_eq!(entry.refresh_pending_begin, Some(5));
    entry.set_state(ReflectionState::Refresh);
    assert_eq!(entry.refresh_pending_begin, None);
}

#[test]
fn failures_then_success() {
    let mut entry = ReflectionEntry::builder()
        .state(ReflectionState::Refreshing)
        .refresh_job_id(Some(JobId::from_string("job-1")))
        .build();

    entry.record_failure("boom", 10, 3);
    assert_eq!(entry.state, ReflectionState::Active);
    assert_eq!(entry.num_failures, 1);
    assert_eq!(entry.refresh_job_id, None);
    assert_eq!(entry.last_failure, Some(Failure { message: "boom".into(), at_ms: 10 }));

    entry.record_success(20);
    assert_eq!(entry.state, ReflectionState::Active);
    assert_eq!(entry.num_failures, 0);
    assert_eq!(entry.last_failure, None);
    assert_eq!(entry.last_successful_refresh, Some(20));
}

#[test]
fn exhausting_retries_fails_entry() {
    let mut entry = ReflectionEntry::builder().state(ReflectionState::Refreshing).build();
    for i in 0..3 {
        entry.set_state(ReflectionState::Refreshing);
        entry.record_failure("boom", i, 3);
    }
    assert_eq!(entry.state, ReflectionState::Failed);
    assert_eq!(entry.num_failures, 3);
}

proptest! {
    #[test]
    fn failure_count_is_monotonic(attempts in 1usize..20, max in 1u32..10) {
        let mut entry = ReflectionEntry::builder().build();
        let mut previous = entry.num_failures;
        for i in 0..attempts {
            entry.record_failure("boom", i as u64, max);
            prop_assert!(entry.num_failures > previous);
            previous = entry.num_failures;
        }
        entry.record_success(1_000);
        prop_assert_eq!(entry.num_failures, 0);
    }
}
