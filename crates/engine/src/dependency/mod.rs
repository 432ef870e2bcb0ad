// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dependency DAG between reflections and the datasets they read.

mod context;
mod lineage;

pub use context::DependencyResolutionContext;
pub use lineage::Lineage;

use crate::config::ManagerConfig;
use parking_lot::RwLock;
use refl_core::{
    DependencyEntry, Materialization, MaterializationInfo, RefreshMethod, ReflectionDependencies,
    ReflectionEntry, ReflectionId, ReflectionState,
};
use refl_storage::{with_optimistic_retry, Conflict, DependencyStore, StoreError};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("reflection {0} cannot depend on itself")]
    SelfReference(ReflectionId),
    #[error("dependency of {reflection_id} on {upstream_id} would create a cycle")]
    Cycle { reflection_id: ReflectionId, upstream_id: ReflectionId },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Conflict for DependencyError {
    fn is_conflict(&self) -> bool {
        matches!(self, DependencyError::Store(e) if e.is_conflict())
    }
}

#[derive(Default)]
struct Graph {
    upstream: HashMap<ReflectionId, Vec<DependencyEntry>>,
    /// Reverse reflection edges: reflection -> reflections reading it.
    downstream: HashMap<ReflectionId, BTreeSet<ReflectionId>>,
}

impl Graph {
    fn unlink(&mut self, id: &ReflectionId) {
        let Some(old) = self.upstream.remove(id) else { return };
        for parent in old.iter().filter_map(DependencyEntry::as_reflection) {
            if let Some(children) = self.downstream.get_mut(parent) {
                children.remove(id);
                if children.is_empty() {
                    self.downstream.remove(parent);
                }
            }
        }
    }

    fn link(&mut self, id: &ReflectionId, entries: Vec<DependencyEntry>) {
        self.unlink(id);
        for parent in entries.iter().filter_map(DependencyEntry::as_reflection) {
            self.downstream.entry(parent.clone()).or_default().insert(id.clone());
        }
        self.upstream.insert(id.clone(), entries);
    }

    /// Whether `target` is reachable upstream of `from` (or is `from`).
    fn reaches(&self, from: &ReflectionId, target: &ReflectionId) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from.clone()]);
        while let Some(id) = queue.pop_front() {
            if &id == target {
                return true;
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(deps) = self.upstream.get(&id) {
                queue.extend(deps.iter().filter_map(DependencyEntry::as_reflection).cloned());
            }
        }
        false
    }
}

/// Owns the dependency graph and the per-reflection materialization info.
///
/// Shared between the manager and the admin API; all methods take `&self`.
pub struct DependencyManager {
    config: ManagerConfig,
    graph: RwLock<Graph>,
    infos: RwLock<HashMap<ReflectionId, MaterializationInfo>>,
}

impl DependencyManager {
    pub fn new(config: ManagerConfig) -> Self {
        Self { config, graph: RwLock::new(Graph::default()), infos: RwLock::new(HashMap::new()) }
    }

    /// Replace the in-memory graph with the persisted one.
    pub fn reload(&self, store: &dyn DependencyStore) {
        let mut graph = Graph::default();
        let all = store.all();
        let count = all.len();
        for deps in all {
            graph.link(&deps.reflection_id, deps.entries);
        }
        *self.graph.write() = graph;
        tracing::debug!(count, "dependency graph loaded");
    }

    pub fn get_dependencies(&self, id: &ReflectionId) -> Vec<DependencyEntry> {
        self.graph.read().upstream.get(id).cloned().unwrap_or_default()
    }

    /// Reflections that read `id` directly.
    pub fn direct_downstream(&self, id: &ReflectionId) -> Vec<ReflectionId> {
        self.graph
            .read()
            .downstream
            .get(id)
            .map(|c| c.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record what a refresh of `id` read. Rejects edges that would close a cycle.
    pub fn update_dependencies(
        &self,
        store: &dyn DependencyStore,
        id: &ReflectionId,
        entries: Vec<DependencyEntry>,
        now_ms: u64,
    ) -> Result<(), DependencyError> {
        {
            let graph = self.graph.read();
            for parent in entries.iter().filter_map(DependencyEntry::as_reflection) {
                if parent == id {
                    return Err(DependencyError::SelfReference(id.clone()));
                }
                if graph.reaches(parent, id) {
                    return Err(DependencyError::Cycle {
                        reflection_id: id.clone(),
                        upstream_id: parent.clone(),
                    });
                }
            }
        }

        with_optimistic_retry(self.config.optimistic_retry_attempts, || {
            let record = match store.get(id) {
                Some(existing) if existing.entries == entries => return Ok(()),
                Some(existing) => ReflectionDependencies {
                    entries: entries.clone(),
                    modified_at: now_ms,
                    ..existing
                },
                None => ReflectionDependencies {
                    reflection_id: id.clone(),
                    tag: 0,
                    entries: entries.clone(),
                    modified_at: now_ms,
                },
            };
            store.save(record).map(|_| ())
        })?;

        self.graph.write().link(id, entries);
        Ok(())
    }

    /// Remove a reflection's outgoing edges and cached info.
    ///
    /// Edges from downstream reflections onto `id` stay: they still read it
    /// and resolve again once it refreshes.
    pub fn delete(&self, store: &dyn DependencyStore, id: &ReflectionId) {
        store.delete(id);
        self.graph.write().unlink(id);
        self.infos.write().remove(id);
    }

    /// Whether the entry is due for a refresh.
    pub fn should_refresh(&self, entry: &ReflectionEntry, ctx: &DependencyResolutionContext) -> bool {
        let deps = self.get_dependencies(&entry.id);
        let Some(settings) = ctx.effective_settings(&entry.dataset_id, &deps) else {
            tracing::debug!(reflection_id = %entry.id, "refresh check deferred, dataset unresolved");
            return false;
        };
        if settings.never_refresh {
            return false;
        }
        if entry.num_failures > 0 {
            if let Some(ref failure) = entry.last_failure {
                let backoff = self.config.retry_backoff_ms(entry.num_failures);
                if ctx.now_ms < failure.at_ms.saturating_add(backoff) {
                    return false;
                }
            }
            return true;
        }
        let Some(last) = entry.last_successful_refresh else {
            return true;
        };

        if deps.is_empty() {
            return ctx.now_ms >= last.saturating_add(self.config.no_dependency_refresh_period_ms());
        }

        let requested = std::iter::once(&entry.dataset_id)
            .chain(deps.iter().filter_map(DependencyEntry::as_dataset))
            .filter_map(|d| ctx.requested_at(d))
            .any(|at| at > last);
        if requested {
            return true;
        }

        let upstream_newer = deps
            .iter()
            .filter_map(DependencyEntry::as_reflection)
            .filter_map(|r| ctx.entry(r)?.last_successful_refresh)
            .any(|at| at > last);
        if upstream_newer {
            return true;
        }

        if entry.snapshot_based || settings.snapshot_based {
            deps.iter().any(|d| dataset_changed(d, ctx))
        } else {
            ctx.now_ms >= last.saturating_add(settings.refresh_period_ms)
        }
    }

    /// Whether any direct or transitive upstream reflection is refreshing.
    ///
    /// An upstream refreshing for longer than the no-dependency period no
    /// longer blocks.
    pub fn has_dependency_refreshing(
        &self,
        id: &ReflectionId,
        ctx: &DependencyResolutionContext,
    ) -> bool {
        let limit = self.config.no_dependency_refresh_period_ms();
        let graph = self.graph.read();
        let mut seen = HashSet::new();
        let mut queue: VecDeque<ReflectionId> = graph
            .upstream
            .get(id)
            .map(|d| d.iter().filter_map(DependencyEntry::as_reflection).cloned().collect())
            .unwrap_or_default();
        while let Some(upstream) = queue.pop_front() {
            if !seen.insert(upstream.clone()) {
                continue;
            }
            if let Some(entry) = ctx.entry(&upstream) {
                if entry.state.is_refreshing()
                    && ctx.now_ms.saturating_sub(refreshing_since(&entry)) < limit
                {
                    tracing::debug!(
                        reflection_id = %id,
                        upstream_id = %upstream,
                        state = %entry.state,
                        "upstream reflection is refreshing"
                    );
                    return true;
                }
            }
            if let Some(deps) = graph.upstream.get(&upstream) {
                queue.extend(deps.iter().filter_map(DependencyEntry::as_reflection).cloned());
            }
        }
        false
    }

    /// Incremental reflection whose table has accumulated enough snapshots.
    pub fn should_vacuum(&self, entry: &ReflectionEntry) -> bool {
        if entry.refresh_method != RefreshMethod::Incremental {
            return false;
        }
        self.infos.read().get(&entry.id).is_some_and(|info| {
            info.needs_vacuum || info.snapshots_since_vacuum >= self.config.vacuum_snapshot_threshold
        })
    }

    pub fn materialization_info(&self, id: &ReflectionId) -> Option<MaterializationInfo> {
        self.infos.read().get(id).cloned()
    }

    pub fn update_materialization_info(&self, id: &ReflectionId, info: MaterializationInfo) {
        self.infos.write().insert(id.clone(), info);
    }

    pub fn mark_vacuumed(&self, id: &ReflectionId) {
        if let Some(info) = self.infos.write().get_mut(id) {
            info.needs_vacuum = false;
            info.snapshots_since_vacuum = 0;
        }
    }

    /// Whether a DONE materialization's inputs have changed since it was built.
    pub fn compute_staleness(&self, m: &Materialization, ctx: &DependencyResolutionContext) -> bool {
        let since = m.last_refresh_from_pds.unwrap_or(m.created_at);
        self.get_dependencies(&m.reflection_id).iter().any(|dep| match dep {
            DependencyEntry::Dataset { dataset_id, .. } => {
                ctx.is_missing(dataset_id)
                    || dataset_changed(dep, ctx)
                    || ctx.requested_at(dataset_id).is_some_and(|at| at > since)
            }
            DependencyEntry::Reflection { reflection_id } => ctx
                .entry(reflection_id)
                .and_then(|e| e.last_successful_refresh)
                .is_some_and(|at| at > since),
        })
    }

    pub fn compute_reflection_lineage(&self, id: &ReflectionId) -> Lineage {
        let graph = self.graph.read();
        lineage::compute(id, &graph.upstream, &graph.downstream)
    }
}

/// Start of the current refresh activity of an upstream entry.
fn refreshing_since(entry: &ReflectionEntry) -> u64 {
    match entry.state {
        ReflectionState::RefreshPending => entry.refresh_pending_begin,
        ReflectionState::Refreshing => entry.last_submitted_refresh,
        _ => None,
    }
    .unwrap_or(entry.modified_at)
}

/// A dataset edge whose recorded snapshot differs from the catalog's.
fn dataset_changed(dep: &DependencyEntry, ctx: &DependencyResolutionContext) -> bool {
    match dep {
        DependencyEntry::Dataset { dataset_id, snapshot: Some(seen) } => {
            ctx.snapshot(dataset_id).is_some_and(|current| current != seen.as_str())
        }
        _ => false,
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
