// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn force_state(ctx: &TestContext, id: &str, state: ReflectionState) {
    let mut entry = ctx.entry(id).unwrap();
    entry.state = state;
    ctx.stores.entries.put(entry).unwrap();
}

#[tokio::test]
async fn idle_entry_with_running_materialization_cancels_it() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;
    let job = ctx.job_of("rfl-1").unwrap();
    let stray = ctx.materializations_in("rfl-1", MaterializationState::Running).remove(0);

    force_state(&ctx, "rfl-1", ReflectionState::Active);
    ctx.pass().await;

    assert!(ctx.jobs.canceled().contains(&job));
    let stray = ctx.stores.materializations.fetch(&stray.id).unwrap();
    assert_eq!(stray.state, MaterializationState::Deprecated);
    // the entry was never refreshed, so it starts over
    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Refreshing);
    assert_eq!(running(&ctx, "rfl-1"), 1);
}

#[tokio::test]
async fn refreshing_entry_without_materialization_records_failure() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;
    let lost = ctx.materializations_in("rfl-1", MaterializationState::Running).remove(0);
    ctx.stores.materializations.remove(&lost.id);

    ctx.pass().await;

    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.state, ReflectionState::Active);
    assert_eq!(entry.num_failures, 1);
    assert!(entry.last_failure.is_some());
}

#[tokio::test]
async fn compacting_entry_without_materialization_returns_to_active() {
    let mut ctx = setup();
    active(&mut ctx, "rfl-1", "dst-1").await;
    force_state(&ctx, "rfl-1", ReflectionState::Compacting);

    ctx.pass().await;

    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.state, ReflectionState::Active);
    assert_eq!(entry.num_failures, 0);
    assert!(entry.refresh_job_id.is_none());
}

#[tokio::test]
async fn consistent_entry_is_left_alone() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;
    let job = ctx.job_of("rfl-1").unwrap();

    ctx.pass().await;

    assert!(ctx.jobs.canceled().is_empty());
    assert_eq!(ctx.job_of("rfl-1"), Some(job));
    assert_eq!(running(&ctx, "rfl-1"), 1);
}
