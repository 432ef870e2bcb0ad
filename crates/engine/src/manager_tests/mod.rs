// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconciliation pass tests

mod cleanup;
mod heal;
mod ingest;
mod lifecycle;
mod pending;

use super::*;
use crate::test_helpers::{setup, setup_with_config, TestContext};
use refl_core::{JobId, MaterializationState, RefreshSettings};
use std::time::Duration;

const SEC: Duration = Duration::from_secs(1);
const MIN: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// Goal on `dataset`, refreshed once: the entry ends ACTIVE with one DONE
/// materialization.
async fn active(ctx: &mut TestContext, id: &str, dataset: &str) -> JobId {
    active_with(ctx, id, dataset, RefreshSettings::default()).await
}

async fn active_with(
    ctx: &mut TestContext,
    id: &str,
    dataset: &str,
    settings: RefreshSettings,
) -> JobId {
    ctx.add_goal(id, dataset).unwrap();
    ctx.catalog.add_dataset_with(dataset, Some("s1"), settings);
    ctx.pass().await;
    let job = ctx.complete_refresh(id, dataset, Some("s1")).unwrap();
    ctx.pass().await;
    assert_eq!(ctx.entry(id).unwrap().state, ReflectionState::Active);
    job
}

/// Settings that keep the schedule out of the way of a test
fn quiet_settings() -> RefreshSettings {
    RefreshSettings {
        refresh_period_ms: 100 * HOUR.as_millis() as u64,
        never_expire: true,
        ..RefreshSettings::default()
    }
}

fn running(ctx: &TestContext, id: &str) -> usize {
    ctx.materializations_in(id, MaterializationState::Running).len()
}
