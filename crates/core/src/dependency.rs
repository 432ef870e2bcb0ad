// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency edges between a reflection and what it reads.

use crate::id::{DatasetId, MaterializationId, ReflectionId};
use serde::{Deserialize, Serialize};

/// One upstream of a reflection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DependencyEntry {
    /// A base table or view, with the snapshot the last refresh read.
    Dataset {
        dataset_id: DatasetId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<String>,
    },
    /// Another reflection this one was planned against.
    Reflection { reflection_id: ReflectionId },
}

impl DependencyEntry {
    pub fn dataset(dataset_id: impl Into<DatasetId>, snapshot: Option<&str>) -> Self {
        DependencyEntry::Dataset {
            dataset_id: dataset_id.into(),
            snapshot: snapshot.map(String::from),
        }
    }

    pub fn reflection(reflection_id: impl Into<ReflectionId>) -> Self {
        DependencyEntry::Reflection { reflection_id: reflection_id.into() }
    }

    pub fn as_reflection(&self) -> Option<&ReflectionId> {
        match self {
            DependencyEntry::Reflection { reflection_id } => Some(reflection_id),
            DependencyEntry::Dataset { .. } => None,
        }
    }

    pub fn as_dataset(&self) -> Option<&DatasetId> {
        match self {
            DependencyEntry::Dataset { dataset_id, .. } => Some(dataset_id),
            DependencyEntry::Reflection { .. } => None,
        }
    }
}

/// Persisted upstream list of one reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionDependencies {
    pub reflection_id: ReflectionId,
    #[serde(default)]
    pub tag: u64,
    pub entries: Vec<DependencyEntry>,
    pub modified_at: u64,
}

/// Cached physical state of a reflection's current materialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializationInfo {
    pub materialization_id: MaterializationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iceberg_snapshot_id: Option<i64>,
    #[serde(default)]
    pub needs_vacuum: bool,
    /// Table snapshots written since the last vacuum.
    #[serde(default)]
    pub snapshots_since_vacuum: u32,
}
