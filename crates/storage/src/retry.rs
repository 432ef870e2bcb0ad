// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry of read-modify-write operations.

use crate::error::Conflict;

/// Run `op` until it succeeds, fails with a non-conflict error, or
/// `max_attempts` attempts have lost a concurrency race.
///
/// `op` must re-read whatever it modifies; a retry with stale input
/// conflicts again.
pub fn with_optimistic_retry<T, E, F>(max_attempts: u32, mut op: F) -> Result<T, E>
where
    E: Conflict + std::fmt::Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if e.is_conflict() && attempt < max_attempts.max(1) => {
                tracing::debug!(attempt, error = %e, "optimistic write conflicted, retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}
