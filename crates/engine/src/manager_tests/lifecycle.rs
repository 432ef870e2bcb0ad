// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::ManagerConfig;
use crate::test_helpers::setup_with_stores;
use proptest::prelude::*;
use refl_core::test_support::refresh_details;
use refl_core::{DependencyEntry, JobKind, JobState, RefreshDecision, RefreshMethod};

async fn request(ctx: &mut TestContext, dataset: &str) {
    ctx.advance(SEC);
    ctx.admin().request_refresh(&dataset.into()).unwrap();
    ctx.pass().await;
}

#[tokio::test]
async fn exhausted_retries_fail_and_unlink() {
    let config = ManagerConfig { max_refresh_attempts: 1, ..ManagerConfig::default() };
    let mut ctx = setup_with_config(config);
    active(&mut ctx, "rfl-1", "dst-1").await;
    assert!(!ctx.manager.dependencies().get_dependencies(&"rfl-1".into()).is_empty());

    request(&mut ctx, "dst-1").await;
    ctx.fail_refresh("rfl-1", "disk full").unwrap();
    ctx.pass().await;

    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.state, ReflectionState::Failed);
    assert_eq!(entry.num_failures, 1);
    assert!(ctx.manager.dependencies().get_dependencies(&"rfl-1".into()).is_empty());
    assert!(ctx.stores.dependencies.fetch(&"rfl-1".into()).is_none());

    let submitted = ctx.jobs.submitted().len();
    ctx.advance(HOUR);
    ctx.pass().await;
    assert_eq!(ctx.jobs.submitted().len(), submitted);

    ctx.admin().retry_failed(&"rfl-1".into()).unwrap();
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Refreshing);
}

#[tokio::test]
async fn failed_attempt_waits_for_backoff() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;
    ctx.fail_refresh("rfl-1", "boom").unwrap();
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Active);

    ctx.advance(30 * SEC);
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Active);

    ctx.advance(30 * SEC);
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Refreshing);
}

/// Drive one refresh per outcome, checking the failure counter after each.
async fn run_outcomes(outcomes: Vec<bool>) {
    let config = ManagerConfig { max_refresh_attempts: 10, ..ManagerConfig::default() };
    let mut ctx = setup_with_config(config);
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;

    let mut consecutive = 0;
    for success in outcomes {
        assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Refreshing);
        if success {
            ctx.complete_refresh("rfl-1", "dst-1", Some("s1")).unwrap();
            consecutive = 0;
        } else {
            ctx.fail_refresh("rfl-1", "boom").unwrap();
            consecutive += 1;
        }
        ctx.pass().await;
        let entry = ctx.entry("rfl-1").unwrap();
        assert_eq!(entry.num_failures, consecutive);
        assert_eq!(entry.state, ReflectionState::Active);
        assert_eq!(running(&ctx, "rfl-1"), 0);

        ctx.advance(2 * HOUR);
        ctx.pass().await;
        assert_eq!(running(&ctx, "rfl-1"), 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn failures_count_consecutive_attempts(outcomes in prop::collection::vec(any::<bool>(), 1..6)) {
        tokio::runtime::Runtime::new().unwrap().block_on(run_outcomes(outcomes));
    }
}

#[tokio::test]
async fn restart_restores_cache_and_graph() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;
    let done = ctx.materializations_in("rfl-1", MaterializationState::Done).remove(0);

    let restarted = setup_with_stores(ManagerConfig::default(), ctx.stores.clone());
    let cached = restarted.manager.cache().get(&"rfl-1".into(), restarted.now()).unwrap();
    assert_eq!(cached.materialization_id, done.id);
    assert_eq!(
        restarted.manager.dependencies().get_dependencies(&"rfl-1".into()),
        vec![DependencyEntry::dataset("dst-1", Some("s1"))]
    );
}

#[tokio::test]
async fn changed_dataset_marks_materialization_stale() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;

    ctx.catalog.set_snapshot("dst-1", "s2");
    ctx.pass().await;

    let done = ctx.materializations_in("rfl-1", MaterializationState::Done);
    assert!(done[0].is_stale);
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Active);
}

#[tokio::test]
async fn snapshot_based_reflection_refreshes_on_write() {
    let mut ctx = setup();
    let settings = RefreshSettings { snapshot_based: true, ..quiet_settings() };
    active_with(&mut ctx, "rfl-1", "dst-1", settings).await;

    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Active);

    ctx.catalog.set_snapshot("dst-1", "s2");
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Refreshing);
}

#[tokio::test]
async fn settings_change_recomputes_expiration() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;
    let done = ctx.materializations_in("rfl-1", MaterializationState::Done).remove(0);
    assert_eq!(done.expiration, Some(done.created_at + 3 * HOUR.as_millis() as u64));

    let shorter = RefreshSettings { grace_period_ms: HOUR.as_millis() as u64, ..RefreshSettings::default() };
    ctx.catalog.add_dataset_with("dst-1", Some("s1"), shorter);
    ctx.pass().await;

    let done = ctx.stores.materializations.fetch(&done.id).unwrap();
    assert_eq!(done.expiration, Some(done.created_at + HOUR.as_millis() as u64));
}

#[tokio::test]
async fn incremental_snapshots_trigger_vacuum() {
    let config = ManagerConfig {
        vacuum_snapshot_threshold: 1,
        enable_compaction: false,
        ..ManagerConfig::default()
    };
    let mut ctx = setup_with_config(config);
    let complete_incremental = |ctx: &TestContext| {
        let job = ctx.job_of("rfl-1").unwrap();
        ctx.jobs.set_details(refresh_details(
            &job,
            JobState::Completed,
            None,
            RefreshDecision {
                method: RefreshMethod::Incremental,
                dependencies: vec![DependencyEntry::dataset("dst-1", Some("s1"))],
                iceberg_snapshot_id: Some(1),
                ..RefreshDecision::default()
            },
        ));
    };

    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;
    complete_incremental(&ctx);
    ctx.pass().await;

    request(&mut ctx, "dst-1").await;
    let second = ctx.materializations_in("rfl-1", MaterializationState::Running).remove(0);
    assert_eq!(second.series_ordinal, 1);
    complete_incremental(&ctx);
    ctx.pass().await;
    assert!(ctx.jobs.submitted_of(JobKind::Vacuum).is_empty());

    ctx.pass().await;
    assert_eq!(ctx.jobs.submitted_of(JobKind::Vacuum).len(), 1);
    ctx.pass().await;
    assert_eq!(ctx.jobs.submitted_of(JobKind::Vacuum).len(), 1);
}

#[tokio::test]
async fn at_most_one_running_materialization() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    for round in 0..4 {
        ctx.pass().await;
        assert!(running(&ctx, "rfl-1") <= 1);
        let mut goal = ctx.stores.goals.fetch(&"rfl-1".into()).unwrap();
        goal.details.display_fields.push(format!("f{round}"));
        ctx.save_goal(goal).unwrap();
    }
    ctx.pass().await;
    assert_eq!(running(&ctx, "rfl-1"), 1);
}

#[tokio::test]
async fn catalog_outage_keeps_settings_policy() {
    let mut ctx = setup();
    let settings = RefreshSettings { never_refresh: true, never_expire: true, ..RefreshSettings::default() };
    active_with(&mut ctx, "rfl-1", "dst-1", settings).await;
    let refreshes = ctx.jobs.submitted_of(JobKind::Refresh).len();

    ctx.advance(4 * HOUR);
    ctx.catalog.set_unavailable(true);
    ctx.pass().await;
    ctx.catalog.set_unavailable(false);
    ctx.pass().await;

    let done = ctx.materializations_in("rfl-1", MaterializationState::Done);
    assert_eq!(done.len(), 1);
    assert_eq!(done[0].expiration, None);
    assert!(ctx.materializations_in("rfl-1", MaterializationState::Deprecated).is_empty());
    assert_eq!(ctx.jobs.submitted_of(JobKind::Refresh).len(), refreshes);
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Active);
    assert!(ctx.manager.cache().get(&"rfl-1".into(), ctx.now()).is_some());
}

#[tokio::test]
async fn completion_waits_for_catalog() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.catalog.add_dataset_with("dst-1", Some("s1"), quiet_settings());
    ctx.pass().await;
    ctx.complete_refresh("rfl-1", "dst-1", Some("s1")).unwrap();

    ctx.catalog.set_unavailable(true);
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Refreshing);
    assert_eq!(running(&ctx, "rfl-1"), 1);

    ctx.catalog.set_unavailable(false);
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Active);
    let done = ctx.materializations_in("rfl-1", MaterializationState::Done);
    assert_eq!(done[0].expiration, None);
}

#[tokio::test]
async fn job_service_errors_count_as_failures() {
    let config = ManagerConfig { max_refresh_attempts: 2, ..ManagerConfig::default() };
    let mut ctx = setup_with_config(config);
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;

    ctx.jobs.set_unavailable(Some("maintenance"));
    let mut goal = ctx.stores.goals.fetch(&"rfl-1".into()).unwrap();
    goal.details.display_fields.push("c".to_string());
    ctx.save_goal(goal).unwrap();
    ctx.pass().await;

    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.state, ReflectionState::Active);
    assert_eq!(entry.num_failures, 1);
    assert!(entry.last_failure.unwrap().message.contains("maintenance"));

    ctx.pass().await;
    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.state, ReflectionState::Failed);
    assert_eq!(entry.num_failures, 2);

    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-1").unwrap().num_failures, 2);
}
