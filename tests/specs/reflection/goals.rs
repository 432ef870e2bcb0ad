//! Goal ingestion and deletion specs

use crate::prelude::*;

#[tokio::test]
async fn new_goal_gets_an_entry_and_a_refresh() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;

    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.dataset_id, "dst-1");
    assert_eq!(entry.num_failures, 0);
    assert_eq!(entry.state, ReflectionState::Refreshing);
    assert_eq!(ctx.jobs.submitted_of(JobKind::Refresh).len(), 1);
}

#[tokio::test]
async fn deleted_dataset_only_deletes_its_goals() {
    let mut ctx = setup();
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.add_goal("rfl-2", "dst-2").unwrap();
    ctx.pass().await;

    ctx.catalog.remove_dataset("dst-1");
    ctx.advance(HOUR);
    ctx.pass().await;

    let state = |id: &str| ctx.stores.goals.fetch(&id.into()).unwrap().state;
    assert_eq!(state("rfl-1"), GoalState::Deleted);
    assert_eq!(state("rfl-2"), GoalState::Enabled);
}

#[tokio::test]
async fn deleted_goal_is_purged_only_after_grace_and_wait() {
    let mut ctx = setup();
    refreshed(&mut ctx, "rfl-1", "dst-1").await;
    let config = ManagerConfig::default();
    let deadline = ctx.now() + config.deletion_grace_period_ms() + config.goal_deletion_wait_ms();

    ctx.admin().remove_goal(&"rfl-1".into()).unwrap();
    ctx.pass().await;
    ctx.advance(Duration::from_millis(deadline - ctx.now() - 1));
    ctx.pass().await;
    assert!(ctx.stores.goals.fetch(&"rfl-1".into()).is_some());

    ctx.advance(Duration::from_millis(1));
    ctx.pass().await;
    assert!(ctx.stores.goals.fetch(&"rfl-1".into()).is_none());
    assert_eq!(ctx.namespace.deleted().len(), 1);
}

#[tokio::test]
async fn pending_entry_refreshes_after_upstream() {
    let mut ctx = setup();
    refreshed(&mut ctx, "rfl-a", "dst-a").await;
    ctx.add_goal("rfl-b", "dst-b").unwrap();
    ctx.pass().await;
    let job = ctx.job_of("rfl-b").unwrap();
    let mut details = completed_refresh(&job, "dst-b", Some("s1"));
    if let Some(decision) = details.last_attempt.decision.as_mut() {
        decision.dependencies.push(refl_core::DependencyEntry::reflection("rfl-a"));
    }
    ctx.jobs.set_details(details);
    ctx.pass().await;

    ctx.advance(SEC);
    let admin = ctx.admin();
    admin.request_refresh(&"dst-a".into()).unwrap();
    admin.request_refresh(&"dst-b".into()).unwrap();
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-b").unwrap().state, ReflectionState::RefreshPending);

    ctx.complete_refresh("rfl-a", "dst-a", Some("s2")).unwrap();
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-b").unwrap().state, ReflectionState::Refreshing);
}
