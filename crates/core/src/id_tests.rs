// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_ids_carry_prefix_and_fit_inline() {
    let id = ReflectionId::new();
    assert!(id.as_str().starts_with("rfl-"));
    assert_eq!(id.as_str().len(), 23);

    let mat = MaterializationId::new();
    assert!(mat.as_str().starts_with("mat-"));
}

#[test]
fn new_ids_are_unique() {
    let a = MaterializationId::new();
    let b = MaterializationId::new();
    assert_ne!(a, b);
}

#[test]
fn from_string_keeps_foreign_ids_verbatim() {
    let id = DatasetId::from_string("space.folder.table");
    assert_eq!(id, "space.folder.table");
    assert_eq!(id.to_string(), "space.folder.table");
}

#[test]
fn serde_is_transparent() {
    let id = JobId::from_string("job-abc");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"job-abc\"");
    let parsed: JobId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[yare::parameterized(
    shorter_than_n = { "abc", 5, "abc" },
    exact          = { "abcde", 5, "abcde" },
    truncated      = { "abcdefgh", 3, "abc" },
    multibyte      = { "héllo", 2, "hé" },
)]
fn short_truncates(input: &str, n: usize, expected: &str) {
    assert_eq!(short(input, n), expected);
}

#[test]
fn id_short_strips_prefix() {
    let id = ReflectionId::from_string("rfl-0123456789");
    assert_eq!(id.short(4), "0123");
}
