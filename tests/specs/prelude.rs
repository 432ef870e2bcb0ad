//! Shared imports and helpers for scenario specs.

pub use refl_core::test_support::{completed_refresh, failed_refresh};
pub use refl_core::{GoalState, JobKind, MaterializationState, ReflectionState, RefreshSettings};
pub use refl_engine::test_helpers::{setup, setup_with_config, TestContext};
pub use refl_engine::ManagerConfig;
pub use std::time::Duration;

pub const SEC: Duration = Duration::from_secs(1);
pub const HOUR: Duration = Duration::from_secs(3600);

/// Goal on `dataset`, refreshed once from snapshot "s1".
pub async fn refreshed(ctx: &mut TestContext, id: &str, dataset: &str) {
    ctx.add_goal(id, dataset).unwrap();
    ctx.pass().await;
    ctx.complete_refresh(id, dataset, Some("s1")).unwrap();
    ctx.pass().await;
    assert_eq!(ctx.entry(id).unwrap().state, ReflectionState::Active);
}

/// Ask for a refresh of `dataset` one second from now and run a pass.
pub async fn request(ctx: &mut TestContext, dataset: &str) {
    ctx.advance(SEC);
    ctx.admin().request_refresh(&dataset.into()).unwrap();
    ctx.pass().await;
}
