// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read cache of usable materializations for the planner.
//!
//! The manager pushes updates and invalidations; readers only call
//! [`MaterializationCache::get`].

use parking_lot::RwLock;
use refl_core::{Materialization, MaterializationId, MaterializationState, ReflectionId};
use std::collections::HashMap;

/// What the planner needs to substitute a reflection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMaterialization {
    pub materialization_id: MaterializationId,
    pub reflection_id: ReflectionId,
    pub path: Vec<String>,
    pub expiration: Option<u64>,
    pub series_id: u64,
    pub iceberg_snapshot_id: Option<i64>,
}

pub struct MaterializationCache {
    accelerator_root: String,
    entries: RwLock<HashMap<ReflectionId, CachedMaterialization>>,
}

impl MaterializationCache {
    pub fn new(accelerator_root: impl Into<String>) -> Self {
        Self { accelerator_root: accelerator_root.into(), entries: RwLock::new(HashMap::new()) }
    }

    /// Current usable materialization of a reflection, if not expired.
    pub fn get(&self, reflection_id: &ReflectionId, now_ms: u64) -> Option<CachedMaterialization> {
        self.entries
            .read()
            .get(reflection_id)
            .filter(|c| c.expiration.map_or(true, |e| e > now_ms))
            .cloned()
    }

    /// Cache a materialization. Anything but a DONE one is evicted instead.
    pub fn update(&self, m: &Materialization) {
        if m.state != MaterializationState::Done {
            self.evict(&m.id);
            return;
        }
        let cached = CachedMaterialization {
            materialization_id: m.id.clone(),
            reflection_id: m.reflection_id.clone(),
            path: m.table_path(&self.accelerator_root),
            expiration: m.expiration,
            series_id: m.series_id,
            iceberg_snapshot_id: m.iceberg_snapshot_id,
        };
        self.entries.write().insert(m.reflection_id.clone(), cached);
    }

    pub fn invalidate(&self, reflection_id: &ReflectionId) -> bool {
        self.entries.write().remove(reflection_id).is_some()
    }

    pub fn evict(&self, materialization_id: &MaterializationId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, c| &c.materialization_id != materialization_id);
        entries.len() != before
    }

    /// Rebuild from the store: the newest usable materialization per reflection.
    pub fn rebuild(&self, materializations: &[Materialization], now_ms: u64) {
        let mut newest: HashMap<&ReflectionId, &Materialization> = HashMap::new();
        for m in materializations.iter().filter(|m| m.is_usable(now_ms)) {
            let slot = newest.entry(&m.reflection_id).or_insert(m);
            if (m.series_id, m.series_ordinal) > (slot.series_id, slot.series_ordinal) {
                *slot = m;
            }
        }
        let fresh: Vec<&Materialization> = newest.into_values().collect();
        self.entries.write().clear();
        for m in fresh {
            self.update(m);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
