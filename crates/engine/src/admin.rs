// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Administration API: goal and external reflection edits, refresh
//! requests and read-only queries.
//!
//! Edits only touch the stores; the next pass picks them up. Each edit
//! nudges the wakeup service when one is attached.

use crate::cache::{CachedMaterialization, MaterializationCache};
use crate::config::ManagerConfig;
use crate::dependency::{DependencyManager, Lineage};
use crate::error::AdminError;
use crate::manager::ReflectionManager;
use crate::service::WakeupHandle;
use refl_adapters::{Catalog, JobService, NamespaceService};
use refl_core::{
    Clock, DatasetId, ExternalReflection, ExternalReflectionId, GoalState, Materialization,
    RefreshRequest, ReflectionDetails, ReflectionEntry, ReflectionGoal, ReflectionId,
    ReflectionState, ReflectionType,
};
use refl_storage::{with_optimistic_retry, Stores};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Fields of a new reflection goal
#[derive(Debug, Clone)]
pub struct NewGoal {
    pub dataset_id: DatasetId,
    pub name: String,
    pub reflection_type: ReflectionType,
    pub details: ReflectionDetails,
    pub arrow_caching_enabled: bool,
}

/// Partial goal edit; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct GoalUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub details: Option<ReflectionDetails>,
    pub arrow_caching_enabled: Option<bool>,
}

/// Counts for status reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub goals: usize,
    pub entries: BTreeMap<String, usize>,
    pub materializations: BTreeMap<String, usize>,
    pub external_reflections: usize,
    pub cached: usize,
}

pub struct ReflectionAdmin<K> {
    config: ManagerConfig,
    stores: Stores,
    deps: Arc<DependencyManager>,
    cache: Arc<MaterializationCache>,
    clock: K,
    wakeup: Option<WakeupHandle>,
}

impl<K: Clock> ReflectionAdmin<K> {
    /// Share the manager's stores, graph and cache.
    pub fn new<J, C, N>(manager: &ReflectionManager<J, C, N, K>, wakeup: Option<WakeupHandle>) -> Self
    where
        J: JobService,
        C: Catalog,
        N: NamespaceService,
    {
        Self {
            config: manager.config().clone(),
            stores: manager.stores().clone(),
            deps: Arc::clone(manager.dependencies()),
            cache: Arc::clone(manager.cache()),
            clock: manager.clock().clone(),
            wakeup,
        }
    }

    pub fn create_goal(&self, new: NewGoal) -> Result<ReflectionGoal, AdminError> {
        validate_goal(&new.name, new.reflection_type, &new.details)?;
        let mut goal = ReflectionGoal::new(
            new.dataset_id,
            new.name,
            new.reflection_type,
            new.details,
            self.clock.epoch_ms(),
        );
        goal.arrow_caching_enabled = new.arrow_caching_enabled;
        let goal = self.stores.goals.save(goal)?;
        tracing::info!(reflection_id = %goal.id, dataset_id = %goal.dataset_id, "goal created");
        self.nudge("goal created");
        Ok(goal)
    }

    pub fn update_goal(&self, id: &ReflectionId, update: GoalUpdate) -> Result<ReflectionGoal, AdminError> {
        let goal = with_optimistic_retry(self.config.optimistic_retry_attempts, || {
            let mut goal = self.live_goal(id)?;
            if let Some(ref name) = update.name {
                goal.name = name.clone();
            }
            if let Some(enabled) = update.enabled {
                goal.state = if enabled { GoalState::Enabled } else { GoalState::Disabled };
            }
            if let Some(ref details) = update.details {
                goal.details = details.clone();
            }
            if let Some(arrow) = update.arrow_caching_enabled {
                goal.arrow_caching_enabled = arrow;
            }
            validate_goal(&goal.name, goal.reflection_type, &goal.details)?;
            goal.modified_at = self.clock.epoch_ms();
            Ok::<_, AdminError>(self.stores.goals.save(goal)?)
        })?;
        tracing::info!(reflection_id = %goal.id, state = %goal.state, "goal updated");
        self.nudge("goal updated");
        Ok(goal)
    }

    /// Mark a goal DELETED. Its entry, materializations and folder are
    /// removed by later passes.
    pub fn remove_goal(&self, id: &ReflectionId) -> Result<(), AdminError> {
        with_optimistic_retry(self.config.optimistic_retry_attempts, || {
            let mut goal = self.live_goal(id)?;
            goal.state = GoalState::Deleted;
            goal.modified_at = self.clock.epoch_ms();
            self.stores.goals.save(goal)?;
            Ok::<_, AdminError>(())
        })?;
        tracing::info!(reflection_id = %id, "goal removed");
        self.nudge("goal removed");
        Ok(())
    }

    pub fn get_goal(&self, id: &ReflectionId) -> Option<ReflectionGoal> {
        self.stores.goals.get(id)
    }

    pub fn create_external(
        &self,
        name: &str,
        query_dataset_id: DatasetId,
        target_dataset_id: DatasetId,
    ) -> Result<ExternalReflection, AdminError> {
        if name.trim().is_empty() {
            return Err(AdminError::Invalid("external reflection name must not be empty".into()));
        }
        if query_dataset_id == target_dataset_id {
            return Err(AdminError::Invalid("query and target datasets must differ".into()));
        }
        let external = ExternalReflection::new(
            name,
            query_dataset_id,
            target_dataset_id,
            self.clock.epoch_ms(),
        );
        let external = self.stores.externals.save(external)?;
        tracing::info!(external_id = %external.id, name, "external reflection created");
        Ok(external)
    }

    pub fn drop_external(&self, id: &ExternalReflectionId) -> Result<(), AdminError> {
        if !self.stores.externals.delete(id) {
            return Err(not_found("external reflection", id));
        }
        tracing::info!(external_id = %id, "external reflection dropped");
        Ok(())
    }

    pub fn list_externals(&self) -> Vec<ExternalReflection> {
        self.stores.externals.all()
    }

    /// Ask for every reflection on `dataset_id` to refresh on the next pass.
    pub fn request_refresh(&self, dataset_id: &DatasetId) -> Result<RefreshRequest, AdminError> {
        let request = with_optimistic_retry(self.config.optimistic_retry_attempts, || {
            let now = self.clock.epoch_ms();
            let request = match self.stores.requests.get(dataset_id) {
                Some(mut existing) => {
                    existing.requested_at = now;
                    existing
                }
                None => RefreshRequest { dataset_id: dataset_id.clone(), tag: 0, requested_at: now },
            };
            Ok::<_, AdminError>(self.stores.requests.save(request)?)
        })?;
        tracing::info!(dataset_id = %dataset_id, "refresh requested");
        self.nudge("refresh requested");
        Ok(request)
    }

    /// Give a FAILED reflection a fresh set of attempts.
    pub fn retry_failed(&self, id: &ReflectionId) -> Result<ReflectionEntry, AdminError> {
        let entry = with_optimistic_retry(self.config.optimistic_retry_attempts, || {
            let mut entry = self.stores.entries.get(id).ok_or_else(|| not_found("entry", id))?;
            if entry.state != ReflectionState::Failed {
                return Err(AdminError::Invalid(format!("reflection {id} is {}", entry.state)));
            }
            entry.set_state(ReflectionState::Refresh);
            entry.num_failures = 0;
            entry.last_failure = None;
            entry.modified_at = self.clock.epoch_ms();
            Ok(self.stores.entries.save(entry)?)
        })?;
        tracing::info!(reflection_id = %id, "failed reflection scheduled for retry");
        self.nudge("retry failed reflection");
        Ok(entry)
    }

    pub fn get_entry(&self, id: &ReflectionId) -> Option<ReflectionEntry> {
        self.stores.entries.get(id)
    }

    pub fn list_entries(&self) -> Vec<ReflectionEntry> {
        self.stores.entries.all()
    }

    /// Every generation of a reflection, by series then ordinal.
    pub fn materializations(&self, id: &ReflectionId) -> Vec<Materialization> {
        let mut found = self.stores.materializations.by_reflection(id);
        found.sort_by_key(|m| (m.series_id, m.series_ordinal, m.created_at));
        found
    }

    /// What the planner would substitute for this reflection right now.
    pub fn usable_materialization(&self, id: &ReflectionId) -> Option<CachedMaterialization> {
        self.cache.get(id, self.clock.epoch_ms())
    }

    /// The reflection and its downstream reflections in refresh order.
    pub fn lineage(&self, id: &ReflectionId) -> Result<Lineage, AdminError> {
        if self.stores.entries.get(id).is_none() {
            return Err(not_found("entry", id));
        }
        Ok(self.deps.compute_reflection_lineage(id))
    }

    pub fn status(&self) -> StatusSummary {
        let mut summary = StatusSummary {
            goals: self.stores.goals.all().len(),
            external_reflections: self.stores.externals.all().len(),
            cached: self.cache.len(),
            ..StatusSummary::default()
        };
        for entry in self.stores.entries.all() {
            *summary.entries.entry(entry.state.to_string()).or_default() += 1;
        }
        for m in self.stores.materializations.all() {
            *summary.materializations.entry(m.state.to_string()).or_default() += 1;
        }
        summary
    }

    /// Request a pass and wait handle for its completion.
    pub async fn wakeup(&self, reason: &str) -> Result<oneshot::Receiver<()>, AdminError> {
        let Some(ref handle) = self.wakeup else {
            return Err(AdminError::Invalid("no wakeup service attached".into()));
        };
        handle
            .wakeup(reason)
            .await
            .map_err(|e| AdminError::Invalid(e.to_string()))
    }

    fn live_goal(&self, id: &ReflectionId) -> Result<ReflectionGoal, AdminError> {
        match self.stores.goals.get(id) {
            Some(goal) if goal.state != GoalState::Deleted => Ok(goal),
            _ => Err(not_found("goal", id)),
        }
    }

    fn nudge(&self, reason: &str) {
        if let Some(ref handle) = self.wakeup {
            if let Err(e) = handle.nudge(reason) {
                tracing::debug!(reason, error = %e, "wakeup not delivered");
            }
        }
    }
}

fn validate_goal(
    name: &str,
    reflection_type: ReflectionType,
    details: &ReflectionDetails,
) -> Result<(), AdminError> {
    if name.trim().is_empty() {
        return Err(AdminError::Invalid("reflection name must not be empty".into()));
    }
    let has_fields = match reflection_type {
        ReflectionType::Raw => !details.display_fields.is_empty(),
        ReflectionType::Aggregate => {
            !details.dimension_fields.is_empty() || !details.measure_fields.is_empty()
        }
    };
    if !has_fields {
        return Err(AdminError::Invalid(format!("{reflection_type} reflection has no fields")));
    }
    Ok(())
}

fn not_found(kind: &'static str, id: impl std::fmt::Display) -> AdminError {
    AdminError::NotFound { kind, id: id.to_string() }
}

#[cfg(test)]
#[path = "admin_tests.rs"]
mod tests;
