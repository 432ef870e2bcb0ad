// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository contracts consumed by the reflection manager.
//!
//! Every record carries a `tag`. `save` succeeds only when the record's tag
//! equals the stored one (0 for a new record) and returns the record with
//! its new tag; otherwise it fails with [`StoreError::ConcurrentModification`].

use crate::error::StoreError;
use refl_core::{
    DatasetId, ExternalReflection, ExternalReflectionId, Materialization, MaterializationId,
    MaterializationState, Refresh, RefreshId, RefreshRequest, ReflectionDependencies,
    ReflectionEntry, ReflectionGoal, ReflectionId,
};
use std::sync::Arc;

pub trait GoalStore: Send + Sync {
    fn get(&self, id: &ReflectionId) -> Option<ReflectionGoal>;
    fn save(&self, goal: ReflectionGoal) -> Result<ReflectionGoal, StoreError>;
    fn delete(&self, id: &ReflectionId) -> bool;
    fn all(&self) -> Vec<ReflectionGoal>;
    /// Goals with `modified_at >= since_ms`.
    fn modified_since(&self, since_ms: u64) -> Vec<ReflectionGoal>;
}

pub trait EntryStore: Send + Sync {
    fn get(&self, id: &ReflectionId) -> Option<ReflectionEntry>;
    fn save(&self, entry: ReflectionEntry) -> Result<ReflectionEntry, StoreError>;
    fn delete(&self, id: &ReflectionId) -> bool;
    fn all(&self) -> Vec<ReflectionEntry>;
}

pub trait MaterializationStore: Send + Sync {
    fn get(&self, id: &MaterializationId) -> Option<Materialization>;
    fn save(&self, materialization: Materialization) -> Result<Materialization, StoreError>;
    fn delete(&self, id: &MaterializationId) -> bool;
    fn all(&self) -> Vec<Materialization>;
    /// A reflection's materializations, oldest first.
    fn by_reflection(&self, reflection_id: &ReflectionId) -> Vec<Materialization>;
    fn by_state(&self, state: MaterializationState) -> Vec<Materialization>;
    /// DONE materializations whose expiration is at or before `now_ms`.
    fn expired_before(&self, now_ms: u64) -> Vec<Materialization>;
}

pub trait RefreshStore: Send + Sync {
    fn save(&self, refresh: Refresh) -> Result<Refresh, StoreError>;
    fn delete(&self, id: &RefreshId) -> bool;
    fn all(&self) -> Vec<Refresh>;
    /// Refresh records of one series, in ordinal order.
    fn by_series(&self, reflection_id: &ReflectionId, series_id: u64) -> Vec<Refresh>;
}

pub trait RefreshRequestStore: Send + Sync {
    fn get(&self, dataset_id: &DatasetId) -> Option<RefreshRequest>;
    fn save(&self, request: RefreshRequest) -> Result<RefreshRequest, StoreError>;
    fn all(&self) -> Vec<RefreshRequest>;
}

pub trait DependencyStore: Send + Sync {
    fn get(&self, reflection_id: &ReflectionId) -> Option<ReflectionDependencies>;
    fn save(&self, deps: ReflectionDependencies) -> Result<ReflectionDependencies, StoreError>;
    fn delete(&self, reflection_id: &ReflectionId) -> bool;
    fn all(&self) -> Vec<ReflectionDependencies>;
}

pub trait ExternalReflectionStore: Send + Sync {
    fn get(&self, id: &ExternalReflectionId) -> Option<ExternalReflection>;
    fn save(&self, external: ExternalReflection) -> Result<ExternalReflection, StoreError>;
    fn delete(&self, id: &ExternalReflectionId) -> bool;
    fn all(&self) -> Vec<ExternalReflection>;
}

/// The repositories the manager works against.
#[derive(Clone)]
pub struct Stores {
    pub goals: Arc<dyn GoalStore>,
    pub entries: Arc<dyn EntryStore>,
    pub materializations: Arc<dyn MaterializationStore>,
    pub refreshes: Arc<dyn RefreshStore>,
    pub requests: Arc<dyn RefreshRequestStore>,
    pub dependencies: Arc<dyn DependencyStore>,
    pub externals: Arc<dyn ExternalReflectionStore>,
}
