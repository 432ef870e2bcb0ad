// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn params(base_path: Option<&str>) -> NewMaterialization {
    NewMaterialization {
        reflection_id: ReflectionId::from_string("rfl-1"),
        kind: MaterializationKind::Refresh,
        series_id: 7,
        series_ordinal: 0,
        base_path: base_path.map(String::from),
        previous_iceberg_snapshot: None,
        refresh_method: RefreshMethod::Full,
        reflection_goal_version: 3,
    }
}

#[test]
fn new_series_uses_own_id_as_base_path() {
    let m = Materialization::new(params(None), 5);
    assert_eq!(m.state, MaterializationState::Running);
    assert_eq!(m.base_path, m.id.to_string());
    assert_eq!(m.created_at, 5);
}

#[test]
fn continued_series_shares_base_path() {
    let m = Materialization::new(params(Some("mat-first")), 5);
    assert_eq!(m.base_path, "mat-first");
}

#[yare::parameterized(
    no_expiration = { None, 100, false },
    future        = { Some(101), 100, false },
    exact         = { Some(100), 100, true },
    past          = { Some(50), 100, true },
)]
fn expiry(expiration: Option<u64>, now: u64, expired: bool) {
    let m = Materialization::builder().expiration(expiration).build();
    assert_eq!(m.is_expired(now), expired);
    assert_eq!(m.is_usable(now), !expired);
}

#[test]
fn only_done_is_usable() {
    let m = Materialization::builder().state(MaterializationState::Deprecated).build();
    assert!(!m.is_usable(0));
}

#[test]
fn table_path_is_root_reflection_base() {
    let m = Materialization::builder().reflection_id("rfl-9").base_path("mat-1").build();
    assert_eq!(m.table_path("__accelerator"), vec!["__accelerator", "rfl-9", "mat-1"]);
}

#[test]
fn fail_records_reason() {
    let mut m = Materialization::builder().state(MaterializationState::Running).build();
    m.fail(MaterializationState::Canceled, "definition changed", 12);
    assert_eq!(m.state, MaterializationState::Canceled);
    assert_eq!(m.failure.as_ref().map(|f| f.message.as_str()), Some("definition changed"));
}
