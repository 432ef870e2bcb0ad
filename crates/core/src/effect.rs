// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effects represent side effects on collaborators outside the stores

use crate::id::{JobId, MaterializationId, ReflectionId};
use crate::job::JobRequest;
use serde::{Deserialize, Serialize};

/// Effects that need to be executed by the engine's executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    // === Job service ===
    /// Submit a statement; the executor returns the new job id
    SubmitJob { request: JobRequest },

    /// Cancel a running job
    CancelJob { job_id: JobId, reason: String },

    // === Catalog ===
    /// Register a finished materialization's table so the planner can read it
    RegisterTable {
        reflection_id: ReflectionId,
        path: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        primary_key: Vec<String>,
    },

    // === Materialization cache ===
    /// Drop every cached descriptor of a reflection
    InvalidateReflection { reflection_id: ReflectionId },

    /// Drop one cached descriptor
    EvictMaterialization { materialization_id: MaterializationId },

    // === Namespace ===
    /// Delete a reflection's folder
    DeleteFolder { path: Vec<String> },
}

impl Effect {
    /// Effect name for log spans (e.g., "submit_job", "delete_folder")
    pub fn name(&self) -> &'static str {
        match self {
            Effect::SubmitJob { .. } => "submit_job",
            Effect::CancelJob { .. } => "cancel_job",
            Effect::RegisterTable { .. } => "register_table",
            Effect::InvalidateReflection { .. } => "invalidate_reflection",
            Effect::EvictMaterialization { .. } => "evict_materialization",
            Effect::DeleteFolder { .. } => "delete_folder",
        }
    }

    /// Key-value pairs for structured logging
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Effect::SubmitJob { request } => {
                let mut fields = vec![
                    ("kind", request.kind.to_string()),
                    ("reflection_id", request.reflection_id.to_string()),
                ];
                if let Some(ref m) = request.materialization_id {
                    fields.push(("materialization_id", m.to_string()));
                }
                fields
            }
            Effect::CancelJob { job_id, reason } => {
                vec![("job_id", job_id.to_string()), ("reason", reason.clone())]
            }
            Effect::RegisterTable { reflection_id, path, .. } => {
                vec![("reflection_id", reflection_id.to_string()), ("path", path.join("."))]
            }
            Effect::InvalidateReflection { reflection_id } => {
                vec![("reflection_id", reflection_id.to_string())]
            }
            Effect::EvictMaterialization { materialization_id } => {
                vec![("materialization_id", materialization_id.to_string())]
            }
            Effect::DeleteFolder { path } => vec![("path", path.join("."))],
        }
    }

    /// Whether to show both 'started' and 'completed' or just 'executed',
    /// to control the verbosity for frequent effects.
    pub fn verbose(&self) -> bool {
        match self {
            Effect::InvalidateReflection { .. } => false,
            Effect::EvictMaterialization { .. } => false,
            _ => true,
        }
    }
}

#[cfg(test)]
#[path = "effect_tests.rs"]
mod tests;
