// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use refl_core::{GoalState, JobKind, ReflectionGoal};

fn edit(ctx: &TestContext, id: &str, f: impl FnOnce(&mut ReflectionGoal)) {
    let mut goal = ctx.stores.goals.fetch(&id.into()).unwrap();
    f(&mut goal);
    ctx.save_goal(goal).unwrap();
}

#[tokio::test]
async fn new_goal_creates_entry_and_submits() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;

    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.state, ReflectionState::Refreshing);
    assert_eq!(entry.dataset_id, "dst-1");
    assert_eq!(entry.num_failures, 0);
    assert_eq!(ctx.jobs.submitted_of(JobKind::Refresh).len(), 1);
    assert_eq!(running(&ctx, "rfl-1"), 1);
}

#[tokio::test]
async fn disabled_goal_creates_no_entry() {
    let mut ctx = setup();
    ctx.catalog.add_dataset("dst-1", None);
    let mut goal = refl_core::test_support::raw_goal("rfl-1", "dst-1");
    goal.state = GoalState::Disabled;
    ctx.save_goal(goal).unwrap();
    ctx.pass().await;

    assert!(ctx.entry("rfl-1").is_none());
    assert!(ctx.jobs.submitted().is_empty());
}

#[tokio::test]
async fn structural_change_replaces_materialization() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;
    let old = ctx.materializations("rfl-1").remove(0);

    edit(&ctx, "rfl-1", |g| g.details.display_fields.push("c".to_string()));
    ctx.pass().await;

    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.state, ReflectionState::Refreshing);
    assert_eq!(entry.goal_version, ctx.stores.goals.fetch(&"rfl-1".into()).unwrap().tag);
    let old = ctx.stores.materializations.fetch(&old.id).unwrap();
    assert_eq!(old.state, MaterializationState::Deprecated);
    assert_eq!(running(&ctx, "rfl-1"), 1);
    assert!(ctx.manager.cache().is_empty());
}

#[tokio::test]
async fn goal_change_cancels_running_job() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;
    let first = ctx.job_of("rfl-1").unwrap();

    edit(&ctx, "rfl-1", |g| g.details.display_fields.push("c".to_string()));
    ctx.pass().await;

    assert!(ctx.jobs.canceled().contains(&first));
    assert_eq!(running(&ctx, "rfl-1"), 1);
    assert_ne!(ctx.job_of("rfl-1").unwrap(), first);
    // canceled generations are deprecated for cleanup in the same pass
    assert_eq!(ctx.materializations_in("rfl-1", MaterializationState::Deprecated).len(), 1);
}

#[tokio::test]
async fn metadata_change_does_not_refresh() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;
    let submitted = ctx.jobs.submitted().len();

    edit(&ctx, "rfl-1", |g| g.name = "renamed".to_string());
    ctx.pass().await;

    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.name, "renamed");
    assert_eq!(entry.state, ReflectionState::Active);
    assert_eq!(ctx.jobs.submitted().len(), submitted);
}

#[tokio::test]
async fn disabling_goal_removes_entry() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;

    edit(&ctx, "rfl-1", |g| g.state = GoalState::Disabled);
    ctx.pass().await;

    assert!(ctx.entry("rfl-1").is_none());
    assert!(ctx.manager.dependencies().get_dependencies(&"rfl-1".into()).is_empty());
    assert_eq!(ctx.materializations_in("rfl-1", MaterializationState::Deprecated).len(), 1);
    assert!(ctx.manager.cache().is_empty());
}

#[tokio::test]
async fn deleted_dataset_marks_only_its_goal() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.add_goal("rfl-2", "dst-2").unwrap();
    ctx.pass().await;

    ctx.catalog.remove_dataset("dst-1");
    ctx.advance(HOUR);
    ctx.pass().await;

    let goal = |id: &str| ctx.stores.goals.fetch(&id.into()).unwrap();
    assert_eq!(goal("rfl-1").state, GoalState::Deleted);
    assert_eq!(goal("rfl-1").modified_at, ctx.now());
    assert_eq!(goal("rfl-2").state, GoalState::Enabled);
}

#[tokio::test]
async fn dataset_sweep_is_throttled() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;

    ctx.catalog.remove_dataset("dst-1");
    ctx.advance(30 * MIN);
    ctx.pass().await;
    assert_eq!(ctx.stores.goals.fetch(&"rfl-1".into()).unwrap().state, GoalState::Enabled);

    ctx.advance(30 * MIN);
    ctx.pass().await;
    assert_eq!(ctx.stores.goals.fetch(&"rfl-1".into()).unwrap().state, GoalState::Deleted);
}

#[tokio::test]
async fn unreachable_catalog_deletes_nothing() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;

    ctx.catalog.set_unavailable(true);
    ctx.advance(HOUR);
    ctx.pass().await;
    assert_eq!(ctx.stores.goals.fetch(&"rfl-1".into()).unwrap().state, GoalState::Enabled);
}

#[tokio::test]
async fn external_reflection_dropped_with_its_target() {
    let mut ctx = setup();
    ctx.catalog.add_dataset("dst-q", None);
    ctx.catalog.add_dataset("dst-t", None);
    let admin = ctx.admin();
    let ext = admin.create_external("ext", "dst-q".into(), "dst-t".into()).unwrap();
    ctx.pass().await;
    assert!(ctx.stores.externals.fetch(&ext.id).is_some());

    ctx.catalog.remove_dataset("dst-t");
    ctx.advance(HOUR);
    ctx.pass().await;
    assert!(ctx.stores.externals.fetch(&ext.id).is_none());
}
