// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::ManagerConfig;
use refl_core::test_support::refresh_details;
use refl_core::{DependencyEntry, JobState, RefreshDecision};

/// rfl-b reads rfl-a. Both end ACTIVE, then both are asked to refresh:
/// rfl-a starts, rfl-b waits in REFRESH_PENDING.
async fn chained(config: ManagerConfig) -> TestContext {
    let mut ctx = setup_with_config(config);
    ctx.add_goal("rfl-a", "dst-a").unwrap();
    ctx.add_goal("rfl-b", "dst-b").unwrap();
    ctx.pass().await;

    ctx.complete_refresh("rfl-a", "dst-a", Some("s1")).unwrap();
    let job_b = ctx.job_of("rfl-b").unwrap();
    ctx.jobs.set_details(refresh_details(
        &job_b,
        JobState::Completed,
        None,
        RefreshDecision {
            dependencies: vec![
                DependencyEntry::reflection("rfl-a"),
                DependencyEntry::dataset("dst-b", Some("s1")),
            ],
            ..RefreshDecision::default()
        },
    ));
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-b").unwrap().state, ReflectionState::Active);

    ctx.advance(SEC);
    let admin = ctx.admin();
    admin.request_refresh(&"dst-a".into()).unwrap();
    admin.request_refresh(&"dst-b".into()).unwrap();
    ctx.pass().await;

    assert_eq!(ctx.entry("rfl-a").unwrap().state, ReflectionState::Refreshing);
    let b = ctx.entry("rfl-b").unwrap();
    assert_eq!(b.state, ReflectionState::RefreshPending);
    assert_eq!(b.refresh_pending_begin, Some(ctx.now()));
    ctx
}

#[tokio::test]
async fn downstream_waits_while_upstream_refreshes() {
    let mut ctx = chained(ManagerConfig::default()).await;

    ctx.advance(MIN);
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-b").unwrap().state, ReflectionState::RefreshPending);
    assert_eq!(running(&ctx, "rfl-b"), 0);
}

#[tokio::test]
async fn downstream_refreshes_once_upstream_finishes() {
    let mut ctx = chained(ManagerConfig::default()).await;

    ctx.complete_refresh("rfl-a", "dst-a", Some("s2")).unwrap();
    ctx.pass().await;

    assert_eq!(ctx.entry("rfl-a").unwrap().state, ReflectionState::Active);
    let b = ctx.entry("rfl-b").unwrap();
    assert_eq!(b.state, ReflectionState::Refreshing);
    assert_eq!(b.refresh_pending_begin, None);
    assert_eq!(running(&ctx, "rfl-b"), 1);
}

#[tokio::test]
async fn pending_times_out() {
    let config = ManagerConfig {
        refresh_pending_timeout_secs: 600,
        no_dependency_refresh_period_secs: 3 * 3600,
        ..ManagerConfig::default()
    };
    let mut ctx = chained(config).await;

    ctx.advance(9 * MIN);
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-b").unwrap().state, ReflectionState::RefreshPending);

    ctx.advance(MIN);
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-a").unwrap().state, ReflectionState::Refreshing);
    assert_eq!(ctx.entry("rfl-b").unwrap().state, ReflectionState::Refreshing);
}

#[tokio::test]
async fn long_running_upstream_stops_blocking() {
    let config = ManagerConfig {
        refresh_pending_timeout_secs: 3 * 3600,
        no_dependency_refresh_period_secs: 600,
        ..ManagerConfig::default()
    };
    let mut ctx = chained(config).await;

    ctx.advance(10 * MIN);
    ctx.pass().await;
    assert_eq!(ctx.entry("rfl-b").unwrap().state, ReflectionState::Refreshing);
}
