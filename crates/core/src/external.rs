// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! External reflections: user-maintained tables declared as a query's accelerator.

use crate::id::{DatasetId, ExternalReflectionId};
use serde::{Deserialize, Serialize};

/// The manager never refreshes these; it only drops them when either
/// side stops resolving in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReflection {
    pub id: ExternalReflectionId,
    #[serde(default)]
    pub tag: u64,
    pub name: String,
    pub query_dataset_id: DatasetId,
    pub target_dataset_id: DatasetId,
    pub created_at: u64,
}

impl ExternalReflection {
    pub fn new(
        name: impl Into<String>,
        query_dataset_id: DatasetId,
        target_dataset_id: DatasetId,
        now_ms: u64,
    ) -> Self {
        Self {
            id: ExternalReflectionId::new(),
            tag: 0,
            name: name.into(),
            query_dataset_id,
            target_dataset_id,
            created_at: now_ms,
        }
    }
}
