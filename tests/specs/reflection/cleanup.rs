//! Expiration and deletion specs

use crate::prelude::*;

#[tokio::test]
async fn expired_materialization_leaves_the_cache() {
    let mut ctx = setup();
    let settings = RefreshSettings {
        never_refresh: true,
        grace_period_ms: HOUR.as_millis() as u64,
        ..RefreshSettings::default()
    };
    ctx.catalog.add_dataset_with("dst-1", Some("s1"), settings);
    ctx.save_goal(refl_core::test_support::raw_goal("rfl-1", "dst-1")).unwrap();
    ctx.pass().await;
    ctx.complete_refresh("rfl-1", "dst-1", Some("s1")).unwrap();
    ctx.pass().await;
    assert!(ctx.admin().usable_materialization(&"rfl-1".into()).is_some());

    ctx.advance(2 * HOUR);
    ctx.pass().await;

    let deprecated = ctx.materializations_in("rfl-1", MaterializationState::Deprecated);
    assert_eq!(deprecated.len(), 1);
    assert!(ctx.admin().usable_materialization(&"rfl-1".into()).is_none());
}

#[tokio::test]
async fn deprecated_materialization_is_never_served_and_later_dropped() {
    let mut ctx = setup();
    refreshed(&mut ctx, "rfl-1", "dst-1").await;
    let first = ctx.materializations_in("rfl-1", MaterializationState::Done).remove(0);

    request(&mut ctx, "dst-1").await;
    ctx.complete_refresh("rfl-1", "dst-1", Some("s1")).unwrap();
    ctx.pass().await;

    let served = ctx.admin().usable_materialization(&"rfl-1".into()).unwrap();
    assert_ne!(served.materialization_id, first.id);

    ctx.advance(Duration::from_millis(ManagerConfig::default().deletion_grace_period_ms()));
    ctx.pass().await;
    let first = ctx.stores.materializations.fetch(&first.id).unwrap();
    assert_eq!(first.state, MaterializationState::Deleted);
    assert_eq!(ctx.jobs.submitted_of(JobKind::Drop).len(), 1);
}
