// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers: a manager wired to fakes.

use crate::admin::ReflectionAdmin;
use crate::config::ManagerConfig;
use crate::manager::{ManagerDeps, ReflectionManager};
use refl_adapters::{FakeCatalog, FakeJobService, FakeNamespace};
use refl_core::{
    test_support, Clock, FakeClock, JobId, Materialization, MaterializationState, ReflectionEntry,
    ReflectionGoal, ReflectionId,
};
use refl_storage::MemoryStores;
use std::time::Duration;

/// Convenience alias for the fully-faked manager.
pub type TestManager = ReflectionManager<FakeJobService, FakeCatalog, FakeNamespace, FakeClock>;

/// Test context holding the manager, its fakes and the backing tables.
pub struct TestContext {
    pub manager: TestManager,
    pub jobs: FakeJobService,
    pub catalog: FakeCatalog,
    pub namespace: FakeNamespace,
    pub clock: FakeClock,
    pub stores: MemoryStores,
}

pub fn setup() -> TestContext {
    setup_with_config(ManagerConfig::default())
}

pub fn setup_with_config(config: ManagerConfig) -> TestContext {
    setup_with_stores(config, MemoryStores::new())
}

/// Build a manager over existing tables, as after a restart.
pub fn setup_with_stores(config: ManagerConfig, stores: MemoryStores) -> TestContext {
    let jobs = FakeJobService::new();
    let catalog = FakeCatalog::new();
    let namespace = FakeNamespace::new();
    let clock = FakeClock::new();
    let manager = ReflectionManager::new(
        config,
        ManagerDeps {
            jobs: jobs.clone(),
            catalog: catalog.clone(),
            namespace: namespace.clone(),
            stores: stores.stores(),
        },
        clock.clone(),
    );
    TestContext { manager, jobs, catalog, namespace, clock, stores }
}

impl TestContext {
    /// Run one reconciliation pass.
    pub async fn pass(&mut self) {
        self.manager.run().await;
    }

    pub fn now(&self) -> u64 {
        self.clock.epoch_ms()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub fn admin(&self) -> ReflectionAdmin<FakeClock> {
        ReflectionAdmin::new(&self.manager, None)
    }

    /// Register `dataset` in the catalog and store an enabled raw goal on it.
    pub fn add_goal(&self, id: &str, dataset: &str) -> Option<ReflectionGoal> {
        self.catalog.add_dataset(dataset, Some("s1"));
        self.save_goal(test_support::raw_goal(id, dataset))
    }

    /// Store a goal as a user edit at the current time.
    pub fn save_goal(&self, mut goal: ReflectionGoal) -> Option<ReflectionGoal> {
        if let Some(stored) = self.stores.goals.fetch(&goal.id) {
            goal.tag = stored.tag;
        }
        goal.modified_at = self.now();
        self.stores.goals.put(goal).ok()
    }

    pub fn entry(&self, id: &str) -> Option<ReflectionEntry> {
        self.stores.entries.fetch(&ReflectionId::from_string(id))
    }

    /// Job the entry is waiting on
    pub fn job_of(&self, id: &str) -> Option<JobId> {
        self.entry(id).and_then(|e| e.refresh_job_id)
    }

    /// Finish the entry's current job as a full refresh of `dataset`.
    pub fn complete_refresh(&self, id: &str, dataset: &str, snapshot: Option<&str>) -> Option<JobId> {
        let job_id = self.job_of(id)?;
        self.jobs.set_details(test_support::completed_refresh(&job_id, dataset, snapshot));
        Some(job_id)
    }

    pub fn fail_refresh(&self, id: &str, message: &str) -> Option<JobId> {
        let job_id = self.job_of(id)?;
        self.jobs.set_details(test_support::failed_refresh(&job_id, message));
        Some(job_id)
    }

    /// Materializations of a reflection, oldest first
    pub fn materializations(&self, id: &str) -> Vec<Materialization> {
        let id = ReflectionId::from_string(id);
        let mut found = self.stores.materializations.filter(|m| m.reflection_id == id);
        found.sort_by_key(|m| (m.series_id, m.series_ordinal, m.created_at));
        found
    }

    pub fn materializations_in(&self, id: &str, state: MaterializationState) -> Vec<Materialization> {
        self.materializations(id).into_iter().filter(|m| m.state == state).collect()
    }
}
