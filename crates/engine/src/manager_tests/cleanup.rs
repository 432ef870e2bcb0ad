// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::ManagerConfig;
use refl_core::test_support::finished_job;
use refl_core::{GoalState, JobKind, JobState, Materialization};

/// Refresh an ACTIVE entry a second time: the first generation ends
/// DEPRECATED and is returned.
async fn superseded(ctx: &mut TestContext) -> Materialization {
    active_with(ctx, "rfl-1", "dst-1", quiet_settings()).await;
    let first = ctx.materializations_in("rfl-1", MaterializationState::Done).remove(0);

    ctx.advance(SEC);
    ctx.admin().request_refresh(&"dst-1".into()).unwrap();
    ctx.pass().await;
    ctx.complete_refresh("rfl-1", "dst-1", Some("s1")).unwrap();
    ctx.pass().await;

    let first = ctx.stores.materializations.fetch(&first.id).unwrap();
    assert_eq!(first.state, MaterializationState::Deprecated);
    first
}

fn drop_job(m: &Materialization) -> JobId {
    m.drop_job_id.clone().unwrap()
}

#[tokio::test]
async fn expired_materialization_is_deprecated_and_evicted() {
    let mut ctx = setup();
    let settings = RefreshSettings {
        never_refresh: true,
        grace_period_ms: HOUR.as_millis() as u64,
        ..RefreshSettings::default()
    };
    active_with(&mut ctx, "rfl-1", "dst-1", settings).await;
    assert_eq!(ctx.manager.cache().len(), 1);

    ctx.advance(2 * HOUR);
    ctx.pass().await;

    assert_eq!(ctx.materializations_in("rfl-1", MaterializationState::Deprecated).len(), 1);
    assert!(ctx.manager.cache().is_empty());
    assert_eq!(ctx.jobs.submitted_of(JobKind::Refresh).len(), 1);
}

#[tokio::test]
async fn deprecated_materialization_dropped_after_grace() {
    let mut ctx = setup();
    let old = superseded(&mut ctx).await;

    ctx.advance(4 * HOUR - SEC);
    ctx.pass().await;
    let m = ctx.stores.materializations.fetch(&old.id).unwrap();
    assert_eq!(m.state, MaterializationState::Deprecated);
    assert!(ctx.jobs.submitted_of(JobKind::Drop).is_empty());

    ctx.advance(2 * SEC);
    ctx.pass().await;
    let m = ctx.stores.materializations.fetch(&old.id).unwrap();
    assert_eq!(m.state, MaterializationState::Deleted);
    assert_eq!(ctx.jobs.submitted_of(JobKind::Drop).len(), 1);

    ctx.pass().await;
    assert!(ctx.stores.materializations.fetch(&old.id).is_some());

    ctx.jobs.set_details(finished_job(&drop_job(&m), JobKind::Drop, JobState::Completed));
    ctx.pass().await;
    assert!(ctx.stores.materializations.fetch(&old.id).is_none());
    assert!(ctx.stores.refreshes.filter(|r| r.series_id == old.series_id).is_empty());
    assert!(!ctx.stores.refreshes.is_empty());
}

/// Fail the first drop job and count drop submissions after the next pass.
async fn drops_after_failed_drop(budget: usize) -> usize {
    let config = ManagerConfig { orphan_delete_budget: budget, ..ManagerConfig::default() };
    let mut ctx = setup_with_config(config);
    let old = superseded(&mut ctx).await;
    ctx.advance(5 * HOUR);
    ctx.pass().await;
    let m = ctx.stores.materializations.fetch(&old.id).unwrap();

    ctx.jobs.set_details(finished_job(&drop_job(&m), JobKind::Drop, JobState::Failed));
    ctx.pass().await;

    let m = ctx.stores.materializations.fetch(&old.id).unwrap();
    assert_eq!(m.state, MaterializationState::Deleted);
    ctx.jobs.submitted_of(JobKind::Drop).len()
}

#[tokio::test]
async fn failed_drop_is_resubmitted() {
    assert_eq!(drops_after_failed_drop(10).await, 2);
}

#[tokio::test]
async fn failed_drop_waits_for_budget() {
    assert_eq!(drops_after_failed_drop(0).await, 1);
}

#[tokio::test]
async fn deleted_goal_purged_after_grace_and_wait() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;
    ctx.admin().remove_goal(&"rfl-1".into()).unwrap();
    ctx.pass().await;
    assert!(ctx.entry("rfl-1").is_none());

    ctx.advance(8 * HOUR - SEC);
    ctx.pass().await;
    let goal = ctx.stores.goals.fetch(&"rfl-1".into()).unwrap();
    assert_eq!(goal.state, GoalState::Deleted);
    assert!(ctx.namespace.deleted().is_empty());

    ctx.advance(SEC);
    ctx.pass().await;
    assert!(ctx.stores.goals.fetch(&"rfl-1".into()).is_none());
    assert_eq!(
        ctx.namespace.deleted(),
        vec![vec!["__accelerator".to_string(), "rfl-1".to_string()]]
    );
}

#[tokio::test]
async fn materialization_of_missing_entry_is_deprecated() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;
    // past the ingest overlap, so the goal is not read again
    ctx.advance(2 * MIN);
    ctx.pass().await;
    ctx.stores.entries.remove(&"rfl-1".into());

    ctx.pass().await;

    assert_eq!(ctx.materializations_in("rfl-1", MaterializationState::Deprecated).len(), 1);
    assert!(ctx.manager.cache().is_empty());
}
