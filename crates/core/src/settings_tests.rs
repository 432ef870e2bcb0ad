// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn settings(period: u64, method: RefreshMethod, never_refresh: bool) -> RefreshSettings {
    RefreshSettings {
        refresh_period_ms: period,
        method,
        never_refresh,
        ..RefreshSettings::default()
    }
}

#[test]
fn merge_takes_shortest_period() {
    let a = settings(10_000, RefreshMethod::Full, false);
    let b = settings(4_000, RefreshMethod::Full, false);
    assert_eq!(a.merge(&b).refresh_period_ms, 4_000);
}

#[yare::parameterized(
    both_incremental = { RefreshMethod::Incremental, RefreshMethod::Incremental, RefreshMethod::Incremental },
    mixed            = { RefreshMethod::Incremental, RefreshMethod::Full, RefreshMethod::Full },
    both_full        = { RefreshMethod::Full, RefreshMethod::Full, RefreshMethod::Full },
)]
fn merge_method(a: RefreshMethod, b: RefreshMethod, expected: RefreshMethod) {
    let merged = settings(1, a, false).merge(&settings(1, b, false));
    assert_eq!(merged.method, expected);
}

#[test]
fn never_refresh_requires_every_upstream() {
    let manual = settings(1, RefreshMethod::Full, true);
    let scheduled = settings(1, RefreshMethod::Full, false);
    assert!(manual.merge(&manual).never_refresh);
    assert!(!manual.merge(&scheduled).never_refresh);
}

#[test]
fn expiration_honors_never_expire() {
    let mut s = RefreshSettings { grace_period_ms: 500, ..RefreshSettings::default() };
    assert_eq!(s.expiration_from(1_000), Some(1_500));
    s.never_expire = true;
    assert_eq!(s.expiration_from(1_000), None);
}

#[test]
fn settings_deserialize_with_defaults() {
    let s: RefreshSettings = serde_json::from_str(r#"{"method":"incremental"}"#).unwrap();
    assert_eq!(s.method, RefreshMethod::Incremental);
    assert_eq!(s.refresh_period_ms, RefreshSettings::default().refresh_period_ms);
}
