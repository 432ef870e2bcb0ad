// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::cache::MaterializationCache;
use crate::dependency::DependencyResolutionContext;
use crate::error::ManagerError;
use refl_adapters::{FakeCatalog, FakeJobService, FakeNamespace};
use refl_core::test_support::{completed_refresh, failed_refresh, finished_job, refresh_details};
use refl_core::{
    DependencyEntry, JobKind, JobState, Materialization, MaterializationInfo, MaterializationKind,
    MaterializationState, RefreshDecision, RefreshMethod, ReflectionEntry, ReflectionId,
    ReflectionState,
};
use refl_storage::MemoryStores;
use std::sync::Arc;
use std::time::Duration;

const NOW: u64 = 1_000_000_000;
const HOUR: u64 = 3_600_000;

struct Harness {
    config: ManagerConfig,
    stores: MemoryStores,
    handles: Stores,
    executor: Executor<FakeJobService, FakeCatalog, FakeNamespace>,
    deps: DependencyManager,
    jobs: FakeJobService,
    catalog: FakeCatalog,
    cache: Arc<MaterializationCache>,
}

impl Harness {
    fn new(config: ManagerConfig) -> Self {
        let stores = MemoryStores::new();
        let jobs = FakeJobService::new();
        let catalog = FakeCatalog::new();
        let cache = Arc::new(MaterializationCache::new(config.accelerator_root.clone()));
        let executor = Executor::new(
            jobs.clone(),
            catalog.clone(),
            FakeNamespace::new(),
            Arc::clone(&cache),
            Duration::from_secs(5),
        );
        Self {
            deps: DependencyManager::new(config.clone()),
            handles: stores.stores(),
            config,
            stores,
            executor,
            jobs,
            catalog,
            cache,
        }
    }

    fn ctx(&self) -> HandlerContext<'_, FakeJobService, FakeCatalog, FakeNamespace> {
        HandlerContext {
            config: &self.config,
            stores: &self.handles,
            executor: &self.executor,
            deps: &self.deps,
        }
    }

    fn start(&self) -> RefreshStartHandler<'_, FakeJobService, FakeCatalog, FakeNamespace> {
        RefreshStartHandler::new(self.ctx())
    }

    fn done(&self) -> RefreshDoneHandler<'_, FakeJobService, FakeCatalog, FakeNamespace> {
        RefreshDoneHandler::new(self.ctx())
    }

    fn resolution(&self) -> DependencyResolutionContext {
        DependencyResolutionContext::new(NOW, self.stores.entries.clone())
    }

    fn store(&self, m: Materialization) -> Materialization {
        self.stores.materializations.put(m).unwrap()
    }

    fn mats(&self, state: MaterializationState) -> Vec<Materialization> {
        self.stores.materializations.filter(|m| m.state == state)
    }

    /// Submit a refresh and finish its job with `details`
    async fn refresh_with(
        &self,
        entry: &mut ReflectionEntry,
        details: impl FnOnce(&refl_core::JobId) -> refl_core::JobDetails,
    ) -> Result<bool, ManagerError> {
        self.start().start_refresh(entry, NOW).await?;
        let job_id = entry.refresh_job_id.clone().unwrap();
        self.jobs.set_details(details(&job_id));
        self.done().poll(entry, &self.resolution(), NOW + 1000).await
    }
}

fn entry(method: RefreshMethod) -> ReflectionEntry {
    ReflectionEntry::builder()
        .id("rfl-1")
        .dataset_id("dst-1")
        .state(ReflectionState::Refresh)
        .refresh_method(method)
        .build()
}

fn incremental(dataset: &str) -> RefreshDecision {
    RefreshDecision {
        method: RefreshMethod::Incremental,
        dependencies: vec![DependencyEntry::dataset(dataset, Some("s2"))],
        iceberg_snapshot_id: Some(42),
        ..RefreshDecision::default()
    }
}

#[tokio::test]
async fn refresh_starts_a_new_series() {
    let h = Harness::new(ManagerConfig::default());
    let mut e = entry(RefreshMethod::Full);
    let m = h.start().start_refresh(&mut e, NOW).await.unwrap();

    assert_eq!(m.state, MaterializationState::Running);
    assert_eq!((m.series_id, m.series_ordinal), (1, 0));
    assert_eq!(m.base_path, m.id.to_string());
    assert_eq!(e.state, ReflectionState::Refreshing);
    assert_eq!(e.refresh_job_id, m.init_refresh_job_id);
    assert_eq!(e.last_submitted_refresh, Some(NOW));
    assert_eq!(h.jobs.submitted_of(JobKind::Refresh).len(), 1);
}

#[tokio::test]
async fn incremental_refresh_continues_the_series() {
    let h = Harness::new(ManagerConfig::default());
    h.store(
        Materialization::builder()
            .id("mat-1")
            .reflection_id("rfl-1")
            .base_path("mat-1")
            .series_id(3)
            .series_ordinal(2)
            .iceberg_snapshot_id(Some(7))
            .build(),
    );
    let mut e = entry(RefreshMethod::Incremental);
    let m = h.start().start_refresh(&mut e, NOW).await.unwrap();

    assert_eq!((m.series_id, m.series_ordinal), (3, 3));
    assert_eq!(m.base_path, "mat-1");
    assert_eq!(m.previous_iceberg_snapshot, Some(7));
}

#[tokio::test]
async fn full_refresh_after_done_opens_next_series() {
    let h = Harness::new(ManagerConfig::default());
    h.store(Materialization::builder().id("mat-1").reflection_id("rfl-1").series_id(3).build());
    let mut e = entry(RefreshMethod::Full);
    let m = h.start().start_refresh(&mut e, NOW).await.unwrap();
    assert_eq!((m.series_id, m.series_ordinal), (4, 0));
    assert_eq!(m.previous_iceberg_snapshot, None);
}

#[tokio::test]
async fn new_refresh_cancels_running_materialization() {
    let h = Harness::new(ManagerConfig::default());
    h.store(
        Materialization::builder()
            .id("mat-old")
            .reflection_id("rfl-1")
            .state(MaterializationState::Running)
            .build(),
    );
    let mut e = entry(RefreshMethod::Full);
    h.start().start_refresh(&mut e, NOW).await.unwrap();

    let old = h.stores.materializations.fetch(&"mat-old".into()).unwrap();
    assert_eq!(old.state, MaterializationState::Canceled);
    assert_eq!(h.mats(MaterializationState::Running).len(), 1);
}

#[tokio::test]
async fn failed_submission_fails_the_materialization() {
    let h = Harness::new(ManagerConfig::default());
    h.jobs.set_submit_error(Some("queue full"));
    let mut e = entry(RefreshMethod::Full);

    let err = h.start().start_refresh(&mut e, NOW).await.unwrap_err();
    assert!(matches!(err, ManagerError::Execute(_)));
    assert_eq!(e.state, ReflectionState::Refresh);
    assert_eq!(h.mats(MaterializationState::Failed).len(), 1);
    assert!(h.mats(MaterializationState::Running).is_empty());
}

#[tokio::test]
async fn running_job_is_not_handled() {
    let h = Harness::new(ManagerConfig::default());
    let mut e = entry(RefreshMethod::Full);
    h.start().start_refresh(&mut e, NOW).await.unwrap();

    let handled = h.done().poll(&mut e, &h.resolution(), NOW).await.unwrap();
    assert!(!handled);
    assert_eq!(e.state, ReflectionState::Refreshing);
}

#[tokio::test]
async fn completed_refresh_publishes_materialization() {
    let h = Harness::new(ManagerConfig::default());
    let mut e = entry(RefreshMethod::Full);
    let handled = h
        .refresh_with(&mut e, |job| {
            let mut details = completed_refresh(job, "dst-1", Some("s1"));
            if let Some(ref mut d) = details.last_attempt.decision {
                d.primary_key = vec!["id".to_string()];
            }
            details
        })
        .await
        .unwrap();
    assert!(handled);

    let done = h.mats(MaterializationState::Done);
    assert_eq!(done.len(), 1);
    let m = &done[0];
    assert_eq!(m.expiration, Some(NOW + 3 * HOUR));
    assert_eq!(m.last_refresh_from_pds, Some(NOW));
    assert_eq!(m.primary_key, vec!["id"]);

    assert_eq!(e.state, ReflectionState::Active);
    assert_eq!(e.num_failures, 0);
    assert_eq!(e.refresh_job_id, None);
    assert_eq!(e.last_successful_refresh, Some(NOW + 1000));

    assert_eq!(h.stores.refreshes.len(), 1);
    assert_eq!(h.deps.get_dependencies(&e.id), vec![DependencyEntry::dataset("dst-1", Some("s1"))]);
    assert_eq!(h.cache.get(&e.id, NOW).unwrap().materialization_id, m.id);
    let table = m.table_path(&h.config.accelerator_root);
    assert_eq!(h.catalog.registered().get(&table), Some(&vec!["id".to_string()]));
}

#[tokio::test]
async fn completed_refresh_deprecates_previous_generation() {
    let h = Harness::new(ManagerConfig::default());
    let old = h.store(Materialization::builder().id("mat-old").reflection_id("rfl-1").build());
    h.cache.update(&old);
    let mut e = entry(RefreshMethod::Full);
    h.refresh_with(&mut e, |job| completed_refresh(job, "dst-1", None)).await.unwrap();

    let old = h.stores.materializations.fetch(&"mat-old".into()).unwrap();
    assert_eq!(old.state, MaterializationState::Deprecated);
    assert_ne!(h.cache.get(&e.id, NOW).unwrap().materialization_id, old.id);
}

#[yare::parameterized(
    first_failure = { 3, 1, ReflectionState::Active },
    last_attempt  = { 1, 1, ReflectionState::Failed },
)]
fn failed_refresh_counts_a_failure(max: u32, failures: u32, state: ReflectionState) {
    tokio::runtime::Runtime::new().unwrap().block_on(async {
        let h = Harness::new(ManagerConfig { max_refresh_attempts: max, ..ManagerConfig::default() });
        h.deps
            .update_dependencies(
                h.handles.dependencies.as_ref(),
                &"rfl-1".into(),
                vec![DependencyEntry::dataset("dst-1", None)],
                NOW,
            )
            .unwrap();
        let mut e = entry(RefreshMethod::Full);
        h.refresh_with(&mut e, |job| failed_refresh(job, "out of memory")).await.unwrap();

        assert_eq!(e.num_failures, failures);
        assert_eq!(e.state, state);
        assert_eq!(e.last_failure.as_ref().unwrap().message, "out of memory");
        assert_eq!(h.mats(MaterializationState::Failed).len(), 1);
        assert_eq!(h.deps.get_dependencies(&e.id).is_empty(), state == ReflectionState::Failed);
    });
}

#[tokio::test]
async fn canceled_job_cancels_materialization() {
    let h = Harness::new(ManagerConfig::default());
    let mut e = entry(RefreshMethod::Full);
    h.refresh_with(&mut e, |job| finished_job(job, JobKind::Refresh, JobState::Canceled))
        .await
        .unwrap();
    assert_eq!(h.mats(MaterializationState::Canceled).len(), 1);
    assert_eq!(e.num_failures, 1);
}

#[tokio::test]
async fn forgotten_job_is_a_failure() {
    let h = Harness::new(ManagerConfig::default());
    let mut e = entry(RefreshMethod::Full);
    h.start().start_refresh(&mut e, NOW).await.unwrap();
    h.jobs.forget(e.refresh_job_id.as_ref().unwrap());

    assert!(h.done().poll(&mut e, &h.resolution(), NOW).await.unwrap());
    assert_eq!(e.num_failures, 1);
    assert!(e.last_failure.unwrap().message.contains("not found"));
}

#[tokio::test]
async fn self_referencing_refresh_fails() {
    let h = Harness::new(ManagerConfig::default());
    let mut e = entry(RefreshMethod::Full);
    h.refresh_with(&mut e, |job| {
        refresh_details(
            job,
            JobState::Completed,
            None,
            RefreshDecision {
                dependencies: vec![DependencyEntry::reflection("rfl-1")],
                ..RefreshDecision::default()
            },
        )
    })
    .await
    .unwrap();

    assert_eq!(e.num_failures, 1);
    assert!(h.mats(MaterializationState::Done).is_empty());
    assert_eq!(h.mats(MaterializationState::Failed).len(), 1);
}

#[tokio::test]
async fn failed_incremental_write_is_rolled_back() {
    let h = Harness::new(ManagerConfig::default());
    h.store(
        Materialization::builder()
            .id("mat-1")
            .reflection_id("rfl-1")
            .iceberg_snapshot_id(Some(9))
            .build(),
    );
    let mut e = entry(RefreshMethod::Incremental);
    h.refresh_with(&mut e, |job| failed_refresh(job, "write conflict")).await.unwrap();

    let rollbacks = h.jobs.submitted_of(JobKind::Rollback);
    assert_eq!(rollbacks.len(), 1);
    assert!(rollbacks[0].1.statement.contains("'9'"));
}

#[tokio::test]
async fn incremental_refresh_triggers_compaction() {
    let h = Harness::new(ManagerConfig { compaction_refresh_threshold: 1, ..ManagerConfig::default() });
    let mut e = entry(RefreshMethod::Incremental);
    h.refresh_with(&mut e, |job| refresh_details(job, JobState::Completed, None, incremental("dst-1")))
        .await
        .unwrap();

    assert_eq!(e.state, ReflectionState::Compacting);
    let running = h.mats(MaterializationState::Running);
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].kind, MaterializationKind::Compaction);
    assert_eq!((running[0].series_id, running[0].series_ordinal), (1, 1));
    assert_eq!(h.jobs.submitted_of(JobKind::Compact).len(), 1);
}

#[tokio::test]
async fn sorted_reflections_are_not_compacted() {
    let h = Harness::new(ManagerConfig { compaction_refresh_threshold: 1, ..ManagerConfig::default() });
    let mut goal = refl_core::test_support::raw_goal("rfl-1", "dst-1");
    goal.details.sort_fields = vec!["a".to_string()];
    h.stores.goals.put(goal).unwrap();
    let mut e = entry(RefreshMethod::Incremental);
    h.refresh_with(&mut e, |job| refresh_details(job, JobState::Completed, None, incremental("dst-1")))
        .await
        .unwrap();

    assert_eq!(e.state, ReflectionState::Active);
    assert!(h.jobs.submitted_of(JobKind::Compact).is_empty());
}

#[tokio::test]
async fn completed_compaction_replaces_source() {
    let h = Harness::new(ManagerConfig { compaction_refresh_threshold: 1, ..ManagerConfig::default() });
    let mut e = entry(RefreshMethod::Incremental);
    h.refresh_with(&mut e, |job| refresh_details(job, JobState::Completed, None, incremental("dst-1")))
        .await
        .unwrap();
    let source = h.mats(MaterializationState::Done).remove(0);

    let job = e.refresh_job_id.clone().unwrap();
    h.jobs.set_details(finished_job(&job, JobKind::Compact, JobState::Completed));
    assert!(h.done().poll(&mut e, &h.resolution(), NOW + 2000).await.unwrap());

    let source = h.stores.materializations.fetch(&source.id).unwrap();
    assert_eq!(source.state, MaterializationState::Deprecated);
    let compacted = h.mats(MaterializationState::Done).remove(0);
    assert_eq!(compacted.kind, MaterializationKind::Compaction);
    assert_eq!(compacted.expiration, source.expiration);
    assert_eq!(compacted.iceberg_snapshot_id, Some(42));
    assert_eq!(h.cache.get(&e.id, NOW).unwrap().materialization_id, compacted.id);

    assert_eq!(e.state, ReflectionState::Active);
    assert_eq!(e.refresh_job_id, None);
    assert!(h.deps.materialization_info(&e.id).unwrap().needs_vacuum);
    assert!(h.stores.refreshes.rows().iter().any(|r| r.compacted));
}

#[tokio::test]
async fn failed_compaction_is_not_counted() {
    let h = Harness::new(ManagerConfig { compaction_refresh_threshold: 1, ..ManagerConfig::default() });
    let mut e = entry(RefreshMethod::Incremental);
    h.refresh_with(&mut e, |job| refresh_details(job, JobState::Completed, None, incremental("dst-1")))
        .await
        .unwrap();

    let job = e.refresh_job_id.clone().unwrap();
    h.jobs.set_details(finished_job(&job, JobKind::Compact, JobState::Failed));
    h.done().poll(&mut e, &h.resolution(), NOW + 2000).await.unwrap();

    assert_eq!(e.state, ReflectionState::Active);
    assert_eq!(e.num_failures, 0);
    assert_eq!(h.mats(MaterializationState::Done).len(), 1);
    assert_eq!(h.jobs.submitted_of(JobKind::Rollback).len(), 1);
}

#[tokio::test]
async fn vacuum_expires_old_snapshots() {
    let h = Harness::new(ManagerConfig::default());
    h.store(Materialization::builder().id("mat-1").reflection_id("rfl-1").build());
    h.deps.update_materialization_info(
        &ReflectionId::from_string("rfl-1"),
        MaterializationInfo {
            materialization_id: "mat-1".into(),
            iceberg_snapshot_id: Some(1),
            needs_vacuum: true,
            snapshots_since_vacuum: 12,
        },
    );
    let e = entry(RefreshMethod::Incremental);
    h.start().start_vacuum(&e, NOW).await.unwrap();

    let vacuums = h.jobs.submitted_of(JobKind::Vacuum);
    assert_eq!(vacuums.len(), 1);
    let older_than = NOW - h.config.deletion_grace_period_ms();
    assert!(vacuums[0].1.statement.ends_with(&older_than.to_string()));
    let info = h.deps.materialization_info(&e.id).unwrap();
    assert!(!info.needs_vacuum);
    assert_eq!(info.snapshots_since_vacuum, 0);
}

#[tokio::test]
async fn vacuum_without_table_is_a_no_op() {
    let h = Harness::new(ManagerConfig::default());
    h.start().start_vacuum(&entry(RefreshMethod::Incremental), NOW).await.unwrap();
    assert!(h.jobs.submitted().is_empty());
}
