// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Refresh records and manual refresh requests.

use crate::id::{DatasetId, JobId, MaterializationId, RefreshId, ReflectionId};
use serde::{Deserialize, Serialize};

/// Size and cost of one applied update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshMetrics {
    pub record_count: u64,
    pub footprint_bytes: u64,
    pub duration_ms: u64,
}

/// Append-only record of one completed update to a series' table.
///
/// Removed only when the table itself is physically dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refresh {
    pub id: RefreshId,
    #[serde(default)]
    pub tag: u64,
    pub reflection_id: ReflectionId,
    pub materialization_id: MaterializationId,
    pub series_id: u64,
    pub series_ordinal: u32,
    /// Watermark of source data read by this update (incremental refreshes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_id: Option<u64>,
    #[serde(default)]
    pub metrics: RefreshMetrics,
    /// Written by an OPTIMIZE rather than a refresh job.
    #[serde(default)]
    pub compacted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    pub path: String,
    pub created_at: u64,
}

/// A manual "refresh now" for everything built on a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub dataset_id: DatasetId,
    #[serde(default)]
    pub tag: u64,
    pub requested_at: u64,
}

/// Number of trailing refresh records written since the last compaction.
///
/// `refreshes` must be in series order.
pub fn uncompacted_since_last_compaction(refreshes: &[Refresh]) -> usize {
    refreshes.iter().rev().take_while(|r| !r.compacted).count()
}

crate::builder! {
    pub struct RefreshBuilder => Refresh {
        into {
            id: RefreshId = "rfr-test",
            reflection_id: ReflectionId = "rfl-test",
            materialization_id: MaterializationId = "mat-test",
            path: String = "mat-test",
        }
        set {
            tag: u64 = 0,
            series_id: u64 = 1,
            series_ordinal: u32 = 0,
            update_id: Option<u64> = None,
            metrics: RefreshMetrics = RefreshMetrics::default(),
            compacted: bool = false,
            job_id: Option<JobId> = None,
            created_at: u64 = 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        empty          = { &[], 0 },
        none_compacted = { &[false, false, false], 3 },
        compacted_last = { &[false, false, true], 0 },
        after_compact  = { &[false, true, false, false], 2 },
    )]
    fn counts_trailing_uncompacted(flags: &[bool], expected: usize) {
        let refreshes: Vec<Refresh> = flags
            .iter()
            .enumerate()
            .map(|(i, c)| Refresh::builder().series_ordinal(i as u32).compacted(*c).build())
            .collect();
        assert_eq!(uncompacted_since_last_compaction(&refreshes), expected);
    }
}
