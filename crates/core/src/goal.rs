// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reflection goals: the user-declared desired state of a reflection.

use crate::id::{DatasetId, ReflectionId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Shape of a reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReflectionType {
    Raw,
    Aggregate,
}

crate::simple_display! {
    ReflectionType {
        Raw => "raw",
        Aggregate => "aggregate",
    }
}

/// User-controlled lifecycle of a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalState {
    Enabled,
    Disabled,
    /// Soft-deleted; hard-deleted by the manager after a wait window.
    Deleted,
}

crate::simple_display! {
    GoalState {
        Enabled => "enabled",
        Disabled => "disabled",
        Deleted => "deleted",
    }
}

/// How partitions are laid out across writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionDistribution {
    #[default]
    Consolidated,
    Striped,
}

/// Structural definition of a reflection. Any change here invalidates
/// existing materializations.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionDetails {
    pub display_fields: Vec<String>,
    pub dimension_fields: Vec<String>,
    pub measure_fields: Vec<String>,
    pub partition_fields: Vec<String>,
    pub sort_fields: Vec<String>,
    pub distribution_fields: Vec<String>,
    pub partition_distribution: PartitionDistribution,
}

impl ReflectionDetails {
    /// Raw reflection displaying the given columns.
    pub fn raw<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self { display_fields: fields.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    pub fn is_sorted(&self) -> bool {
        !self.sort_fields.is_empty()
    }
}

/// Desired definition of a reflection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionGoal {
    pub id: ReflectionId,
    /// Optimistic-concurrency version, bumped by the store on every save.
    #[serde(default)]
    pub tag: u64,
    pub dataset_id: DatasetId,
    pub name: String,
    pub reflection_type: ReflectionType,
    pub state: GoalState,
    #[serde(default)]
    pub details: ReflectionDetails,
    #[serde(default)]
    pub arrow_caching_enabled: bool,
    pub created_at: u64,
    pub modified_at: u64,
}

/// Canonical form of the fields that define a reflection's output.
#[derive(Serialize)]
struct StructuralView<'a> {
    dataset_id: &'a DatasetId,
    reflection_type: ReflectionType,
    enabled: bool,
    details: &'a ReflectionDetails,
}

impl ReflectionGoal {
    pub fn new(
        dataset_id: DatasetId,
        name: impl Into<String>,
        reflection_type: ReflectionType,
        details: ReflectionDetails,
        now_ms: u64,
    ) -> Self {
        Self {
            id: ReflectionId::new(),
            tag: 0,
            dataset_id,
            name: name.into(),
            reflection_type,
            state: GoalState::Enabled,
            details,
            arrow_caching_enabled: false,
            created_at: now_ms,
            modified_at: now_ms,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state == GoalState::Enabled
    }

    /// Hex SHA-256 over the structural definition plus enablement.
    ///
    /// Name, arrow caching, tag and timestamps are excluded: they can change
    /// without touching materializations.
    pub fn content_hash(&self) -> String {
        let view = StructuralView {
            dataset_id: &self.dataset_id,
            reflection_type: self.reflection_type,
            enabled: self.is_enabled(),
            details: &self.details,
        };
        let canonical = serde_json::to_string(&view).unwrap_or_default();
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }
}

crate::builder! {
    pub struct ReflectionGoalBuilder => ReflectionGoal {
        into {
            id: ReflectionId = "rfl-test",
            dataset_id: DatasetId = "dst-test",
            name: String = "test-reflection",
        }
        set {
            tag: u64 = 0,
            reflection_type: ReflectionType = ReflectionType::Raw,
            state: GoalState = GoalState::Enabled,
            details: ReflectionDetails = ReflectionDetails::raw(["a", "b"]),
            arrow_caching_enabled: bool = false,
            created_at: u64 = 0,
            modified_at: u64 = 0,
        }
    }
}

#[cfg(test)]
#[path = "goal_tests.rs"]
mod tests;
