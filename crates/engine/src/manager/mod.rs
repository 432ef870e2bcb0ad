// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The reconciliation loop.
//!
//! One [`ReflectionManager::run`] call is one pass over goals, entries and
//! materializations. Passes never fail: every step logs and skips the entity
//! it could not handle.

mod cleanup;
mod ingest;
mod reconcile;

use crate::cache::MaterializationCache;
use crate::config::ManagerConfig;
use crate::dependency::{DependencyManager, DependencyResolutionContext};
use crate::executor::Executor;
use crate::handlers::HandlerContext;
use refl_adapters::{Catalog, JobService, NamespaceService};
use refl_core::{
    Clock, DependencyEntry, MaterializationInfo, MaterializationState, ReflectionEntry,
    ReflectionId, ReflectionState,
};
use refl_storage::Stores;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::Instrument;

/// External collaborators of the manager
pub struct ManagerDeps<J, C, N> {
    pub jobs: J,
    pub catalog: C,
    pub namespace: N,
    pub stores: Stores,
}

pub struct ReflectionManager<J, C, N, K: Clock> {
    config: ManagerConfig,
    stores: Stores,
    executor: Executor<J, C, N>,
    deps: Arc<DependencyManager>,
    cache: Arc<MaterializationCache>,
    clock: K,
    last_wakeup_ms: Option<u64>,
    last_dataset_sweep_ms: Option<u64>,
    settings_fingerprint: Option<String>,
    passes: u64,
}

impl<J, C, N, K> ReflectionManager<J, C, N, K>
where
    J: JobService,
    C: Catalog,
    N: NamespaceService,
    K: Clock,
{
    /// Build a manager over persisted state: reloads the dependency graph and
    /// rebuilds the read cache from DONE materializations.
    pub fn new(config: ManagerConfig, deps: ManagerDeps<J, C, N>, clock: K) -> Self {
        let now = clock.epoch_ms();
        let cache = Arc::new(MaterializationCache::new(config.accelerator_root.clone()));
        let dependencies = Arc::new(DependencyManager::new(config.clone()));
        dependencies.reload(deps.stores.dependencies.as_ref());

        let done = deps.stores.materializations.by_state(MaterializationState::Done);
        cache.rebuild(&done, now);
        for m in &done {
            let current = cache.get(&m.reflection_id, now);
            if current.is_some_and(|c| c.materialization_id == m.id) {
                dependencies.update_materialization_info(
                    &m.reflection_id,
                    MaterializationInfo {
                        materialization_id: m.id.clone(),
                        iceberg_snapshot_id: m.iceberg_snapshot_id,
                        needs_vacuum: false,
                        snapshots_since_vacuum: m.series_ordinal,
                    },
                );
            }
        }

        let executor = Executor::new(
            deps.jobs,
            deps.catalog,
            deps.namespace,
            Arc::clone(&cache),
            config.job_submission_timeout(),
        );
        tracing::info!(
            entries = deps.stores.entries.all().len(),
            cached = cache.len(),
            "reflection manager initialized"
        );
        Self {
            config,
            stores: deps.stores,
            executor,
            deps: dependencies,
            cache,
            clock,
            last_wakeup_ms: None,
            last_dataset_sweep_ms: None,
            settings_fingerprint: None,
            passes: 0,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub fn dependencies(&self) -> &Arc<DependencyManager> {
        &self.deps
    }

    pub fn cache(&self) -> &Arc<MaterializationCache> {
        &self.cache
    }

    pub fn executor(&self) -> &Executor<J, C, N> {
        &self.executor
    }

    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Completed passes
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Run one reconciliation pass.
    pub async fn run(&mut self) {
        self.passes += 1;
        let span = tracing::info_span!("sync", pass = self.passes);
        self.sync().instrument(span).await;
    }

    async fn sync(&mut self) {
        let start = std::time::Instant::now();
        let now = self.clock.epoch_ms();

        self.sweep_deleted_datasets(now).await;
        self.ingest_goals(now).await;

        let ctx = self.resolution_context(now).await;
        self.reconcile_entries(&ctx, now).await;

        self.delete_deprecated_materializations(now).await;
        self.reconcile_orphans(now).await;
        self.deprecate_expired(now).await;
        self.delete_deprecated_goals(now).await;
        self.refresh_staleness(&ctx, now);

        if let Some(fingerprint) = ctx.settings_fingerprint() {
            self.settings_fingerprint = Some(fingerprint.to_string());
        }
        self.last_wakeup_ms = Some(now);
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "sync complete");
    }

    async fn resolution_context(&self, now: u64) -> DependencyResolutionContext {
        let mut datasets = BTreeSet::new();
        for entry in self.stores.entries.all() {
            datasets.extend(
                self.deps
                    .get_dependencies(&entry.id)
                    .iter()
                    .filter_map(DependencyEntry::as_dataset)
                    .cloned(),
            );
            datasets.insert(entry.dataset_id);
        }
        DependencyResolutionContext::load(
            self.executor.catalog(),
            datasets,
            self.stores.requests.all(),
            Arc::clone(&self.stores.entries),
            self.settings_fingerprint.as_deref(),
            now,
        )
        .await
    }

    fn handler_context(&self) -> HandlerContext<'_, J, C, N> {
        HandlerContext {
            config: &self.config,
            stores: &self.stores,
            executor: &self.executor,
            deps: &self.deps,
        }
    }

    /// Record a failed attempt; an entry that reaches FAILED leaves the graph.
    fn record_failure(&self, entry: &mut ReflectionEntry, message: &str, now: u64) {
        entry.record_failure(message, now, self.config.max_refresh_attempts);
        if entry.state == ReflectionState::Failed {
            tracing::error!(
                reflection_id = %entry.id,
                num_failures = entry.num_failures,
                error = message,
                "reflection failed, retries exhausted"
            );
            self.deps.delete(self.stores.dependencies.as_ref(), &entry.id);
        } else {
            tracing::warn!(
                reflection_id = %entry.id,
                num_failures = entry.num_failures,
                error = message,
                "reflection attempt failed"
            );
        }
    }

    /// Entry counts by state, for status reporting.
    pub fn entry_counts(&self) -> HashMap<ReflectionState, usize> {
        let mut counts = HashMap::new();
        for entry in self.stores.entries.all() {
            *counts.entry(entry.state).or_insert(0) += 1;
        }
        counts
    }

    pub fn entry(&self, id: &ReflectionId) -> Option<ReflectionEntry> {
        self.stores.entries.get(id)
    }
}

#[cfg(test)]
#[path = "../manager_tests/mod.rs"]
mod tests;
