//! Refresh failure specs

use crate::prelude::*;

#[tokio::test]
async fn failures_accumulate_then_reset_on_success() {
    let config = ManagerConfig { max_refresh_attempts: 5, ..ManagerConfig::default() };
    let mut ctx = setup_with_config(config);
    ctx.add_goal("rfl-1", "dst-1").unwrap();
    ctx.pass().await;

    for expected in 1..=3 {
        let job = ctx.job_of("rfl-1").unwrap();
        ctx.jobs.set_details(failed_refresh(&job, "out of memory"));
        ctx.pass().await;
        assert_eq!(ctx.entry("rfl-1").unwrap().num_failures, expected);
        ctx.advance(HOUR);
        ctx.pass().await;
    }

    ctx.complete_refresh("rfl-1", "dst-1", Some("s1")).unwrap();
    ctx.pass().await;
    let entry = ctx.entry("rfl-1").unwrap();
    assert_eq!(entry.num_failures, 0);
    assert_eq!(entry.state, ReflectionState::Active);
}

#[tokio::test]
async fn exhausted_retries_fail_the_reflection() {
    let config = ManagerConfig { max_refresh_attempts: 1, ..ManagerConfig::default() };
    let mut ctx = setup_with_config(config);
    refreshed(&mut ctx, "rfl-1", "dst-1").await;

    request(&mut ctx, "dst-1").await;
    ctx.fail_refresh("rfl-1", "syntax error").unwrap();
    ctx.pass().await;

    assert_eq!(ctx.entry("rfl-1").unwrap().state, ReflectionState::Failed);
    assert!(ctx.manager.dependencies().get_dependencies(&"rfl-1".into()).is_empty());
}

#[tokio::test]
async fn one_running_materialization_per_reflection() {
    let mut ctx = setup();
    refreshed(&mut ctx, "rfl-1", "dst-1").await;
    for _ in 0..3 {
        request(&mut ctx, "dst-1").await;
        let running = ctx.materializations_in("rfl-1", MaterializationState::Running);
        assert_eq!(running.len(), 1);
    }
}
