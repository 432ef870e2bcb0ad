// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory repositories with tag-checked writes.

use crate::error::StoreError;
use crate::store::{
    DependencyStore, EntryStore, ExternalReflectionStore, GoalStore, MaterializationStore,
    RefreshRequestStore, RefreshStore, Stores,
};
use parking_lot::RwLock;
use refl_core::{
    DatasetId, ExternalReflection, ExternalReflectionId, Materialization, MaterializationId,
    MaterializationState, Refresh, RefreshId, RefreshRequest, ReflectionDependencies,
    ReflectionEntry, ReflectionGoal, ReflectionId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

/// A record kept in a [`MemoryTable`].
pub trait Record: Clone + Send + Sync + 'static {
    type Key: Clone + Ord + Display + Send + Sync;
    const KIND: &'static str;

    fn key(&self) -> Self::Key;
    fn tag(&self) -> u64;
    fn set_tag(&mut self, tag: u64);
}

macro_rules! record {
    ($ty:ty, $key:ty, $kind:literal, |$r:ident| $key_expr:expr) => {
        impl Record for $ty {
            type Key = $key;
            const KIND: &'static str = $kind;

            fn key(&self) -> $key {
                let $r = self;
                $key_expr.clone()
            }

            fn tag(&self) -> u64 {
                self.tag
            }

            fn set_tag(&mut self, tag: u64) {
                self.tag = tag;
            }
        }
    };
}

record!(ReflectionGoal, ReflectionId, "goal", |r| r.id);
record!(ReflectionEntry, ReflectionId, "entry", |r| r.id);
record!(Materialization, MaterializationId, "materialization", |r| r.id);
record!(Refresh, RefreshId, "refresh", |r| r.id);
record!(RefreshRequest, DatasetId, "refresh request", |r| r.dataset_id);
record!(ReflectionDependencies, ReflectionId, "dependencies", |r| r.reflection_id);
record!(ExternalReflection, ExternalReflectionId, "external reflection", |r| r.id);

/// One keyed table of records.
pub struct MemoryTable<R: Record> {
    rows: RwLock<BTreeMap<R::Key, R>>,
}

impl<R: Record> Default for MemoryTable<R> {
    fn default() -> Self {
        Self { rows: RwLock::new(BTreeMap::new()) }
    }
}

impl<R: Record> MemoryTable<R> {
    pub fn fetch(&self, key: &R::Key) -> Option<R> {
        self.rows.read().get(key).cloned()
    }

    /// Tag-checked upsert. Returns the stored record with its new tag.
    pub fn put(&self, mut record: R) -> Result<R, StoreError> {
        let key = record.key();
        let mut rows = self.rows.write();
        let actual = rows.get(&key).map(R::tag);
        let matches = match actual {
            Some(tag) => tag == record.tag(),
            None => record.tag() == 0,
        };
        if !matches {
            return Err(StoreError::ConcurrentModification {
                kind: R::KIND,
                id: key.to_string(),
                expected: record.tag(),
                actual,
            });
        }
        record.set_tag(record.tag() + 1);
        rows.insert(key, record.clone());
        Ok(record)
    }

    pub fn remove(&self, key: &R::Key) -> bool {
        self.rows.write().remove(key).is_some()
    }

    pub fn rows(&self) -> Vec<R> {
        self.rows.read().values().cloned().collect()
    }

    pub fn filter(&self, pred: impl Fn(&R) -> bool) -> Vec<R> {
        self.rows.read().values().filter(|r| pred(r)).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Replace the whole table, keeping each record's tag as-is.
    pub fn load(&self, records: Vec<R>) {
        let mut rows = self.rows.write();
        rows.clear();
        for r in records {
            rows.insert(r.key(), r);
        }
    }
}

impl GoalStore for MemoryTable<ReflectionGoal> {
    fn get(&self, id: &ReflectionId) -> Option<ReflectionGoal> {
        self.fetch(id)
    }

    fn save(&self, goal: ReflectionGoal) -> Result<ReflectionGoal, StoreError> {
        self.put(goal)
    }

    fn delete(&self, id: &ReflectionId) -> bool {
        self.remove(id)
    }

    fn all(&self) -> Vec<ReflectionGoal> {
        self.rows()
    }

    fn modified_since(&self, since_ms: u64) -> Vec<ReflectionGoal> {
        self.filter(|g| g.modified_at >= since_ms)
    }
}

impl EntryStore for MemoryTable<ReflectionEntry> {
    fn get(&self, id: &ReflectionId) -> Option<ReflectionEntry> {
        self.fetch(id)
    }

    fn save(&self, entry: ReflectionEntry) -> Result<ReflectionEntry, StoreError> {
        self.put(entry)
    }

    fn delete(&self, id: &ReflectionId) -> bool {
        self.remove(id)
    }

    fn all(&self) -> Vec<ReflectionEntry> {
        self.rows()
    }
}

impl MaterializationStore for MemoryTable<Materialization> {
    fn get(&self, id: &MaterializationId) -> Option<Materialization> {
        self.fetch(id)
    }

    fn save(&self, materialization: Materialization) -> Result<Materialization, StoreError> {
        self.put(materialization)
    }

    fn delete(&self, id: &MaterializationId) -> bool {
        self.remove(id)
    }

    fn all(&self) -> Vec<Materialization> {
        self.rows()
    }

    fn by_reflection(&self, reflection_id: &ReflectionId) -> Vec<Materialization> {
        let mut found = self.filter(|m| &m.reflection_id == reflection_id);
        found.sort_by_key(|m| (m.created_at, m.series_id, m.series_ordinal));
        found
    }

    fn by_state(&self, state: MaterializationState) -> Vec<Materialization> {
        self.filter(|m| m.state == state)
    }

    fn expired_before(&self, now_ms: u64) -> Vec<Materialization> {
        self.filter(|m| m.state == MaterializationState::Done && m.is_expired(now_ms))
    }
}

impl RefreshStore for MemoryTable<Refresh> {
    fn save(&self, refresh: Refresh) -> Result<Refresh, StoreError> {
        self.put(refresh)
    }

    fn delete(&self, id: &RefreshId) -> bool {
        self.remove(id)
    }

    fn all(&self) -> Vec<Refresh> {
        self.rows()
    }

    fn by_series(&self, reflection_id: &ReflectionId, series_id: u64) -> Vec<Refresh> {
        let mut found =
            self.filter(|r| &r.reflection_id == reflection_id && r.series_id == series_id);
        found.sort_by_key(|r| (r.series_ordinal, r.created_at));
        found
    }
}

impl RefreshRequestStore for MemoryTable<RefreshRequest> {
    fn get(&self, dataset_id: &DatasetId) -> Option<RefreshRequest> {
        self.fetch(dataset_id)
    }

    fn save(&self, request: RefreshRequest) -> Result<RefreshRequest, StoreError> {
        self.put(request)
    }

    fn all(&self) -> Vec<RefreshRequest> {
        self.rows()
    }
}

impl DependencyStore for MemoryTable<ReflectionDependencies> {
    fn get(&self, reflection_id: &ReflectionId) -> Option<ReflectionDependencies> {
        self.fetch(reflection_id)
    }

    fn save(&self, deps: ReflectionDependencies) -> Result<ReflectionDependencies, StoreError> {
        self.put(deps)
    }

    fn delete(&self, reflection_id: &ReflectionId) -> bool {
        self.remove(reflection_id)
    }

    fn all(&self) -> Vec<ReflectionDependencies> {
        self.rows()
    }
}

impl ExternalReflectionStore for MemoryTable<ExternalReflection> {
    fn get(&self, id: &ExternalReflectionId) -> Option<ExternalReflection> {
        self.fetch(id)
    }

    fn save(&self, external: ExternalReflection) -> Result<ExternalReflection, StoreError> {
        self.put(external)
    }

    fn delete(&self, id: &ExternalReflectionId) -> bool {
        self.remove(id)
    }

    fn all(&self) -> Vec<ExternalReflection> {
        self.rows()
    }
}

/// Serializable contents of every table.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default)]
    pub goals: Vec<ReflectionGoal>,
    #[serde(default)]
    pub entries: Vec<ReflectionEntry>,
    #[serde(default)]
    pub materializations: Vec<Materialization>,
    #[serde(default)]
    pub refreshes: Vec<Refresh>,
    #[serde(default)]
    pub requests: Vec<RefreshRequest>,
    #[serde(default)]
    pub dependencies: Vec<ReflectionDependencies>,
    #[serde(default)]
    pub externals: Vec<ExternalReflection>,
}

/// In-memory backing for all repositories.
#[derive(Clone, Default)]
pub struct MemoryStores {
    pub goals: Arc<MemoryTable<ReflectionGoal>>,
    pub entries: Arc<MemoryTable<ReflectionEntry>>,
    pub materializations: Arc<MemoryTable<Materialization>>,
    pub refreshes: Arc<MemoryTable<Refresh>>,
    pub requests: Arc<MemoryTable<RefreshRequest>>,
    pub dependencies: Arc<MemoryTable<ReflectionDependencies>>,
    pub externals: Arc<MemoryTable<ExternalReflection>>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trait-object handles sharing these tables.
    pub fn stores(&self) -> Stores {
        Stores {
            goals: self.goals.clone(),
            entries: self.entries.clone(),
            materializations: self.materializations.clone(),
            refreshes: self.refreshes.clone(),
            requests: self.requests.clone(),
            dependencies: self.dependencies.clone(),
            externals: self.externals.clone(),
        }
    }

    pub fn state(&self) -> StoreState {
        StoreState {
            goals: self.goals.rows(),
            entries: self.entries.rows(),
            materializations: self.materializations.rows(),
            refreshes: self.refreshes.rows(),
            requests: self.requests.rows(),
            dependencies: self.dependencies.rows(),
            externals: self.externals.rows(),
        }
    }

    pub fn restore(&self, state: StoreState) {
        self.goals.load(state.goals);
        self.entries.load(state.entries);
        self.materializations.load(state.materializations);
        self.refreshes.load(state.refreshes);
        self.requests.load(state.requests);
        self.dependencies.load(state.dependencies);
        self.externals.load(state.externals);
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
