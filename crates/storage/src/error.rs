// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

/// Errors that can occur in store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record's tag no longer matches the stored one.
    #[error("concurrent modification of {kind} {id}: expected tag {expected}, found {actual:?}")]
    ConcurrentModification { kind: &'static str, id: String, expected: u64, actual: Option<u64> },
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("snapshot version {0} is newer than supported")]
    SnapshotVersion(u32),
}

/// Errors that signal a lost optimistic-concurrency race.
pub trait Conflict {
    fn is_conflict(&self) -> bool;
}

impl Conflict for StoreError {
    fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrentModification { .. })
    }
}
