// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deleted-dataset sweep and goal ingestion.

use super::ReflectionManager;
use crate::error::ManagerError;
use refl_adapters::{Catalog, JobService, NamespaceService};
use refl_core::{
    Clock, DatasetId, Effect, GoalState, ReflectionEntry, ReflectionGoal, ReflectionId,
    ReflectionState,
};
use refl_storage::with_optimistic_retry;
use std::collections::HashMap;

impl<J, C, N, K> ReflectionManager<J, C, N, K>
where
    J: JobService,
    C: Catalog,
    N: NamespaceService,
    K: Clock,
{
    /// Mark goals whose dataset is gone DELETED and drop external
    /// reflections with a missing side. Throttled by the sweep interval.
    pub(super) async fn sweep_deleted_datasets(&mut self, now: u64) {
        let interval = self.config.deleted_dataset_sweep_interval_ms();
        if self.last_dataset_sweep_ms.is_some_and(|last| now.saturating_sub(last) < interval) {
            return;
        }
        self.last_dataset_sweep_ms = Some(now);

        // None: lookup failed, leave the dataset alone this round
        let mut exists: HashMap<DatasetId, Option<bool>> = HashMap::new();

        for goal in self.stores.goals.all() {
            if goal.state == GoalState::Deleted {
                continue;
            }
            if self.dataset_exists(&mut exists, &goal.dataset_id).await != Some(false) {
                continue;
            }
            match self.mark_goal_deleted(&goal.id, now) {
                Ok(()) => tracing::info!(
                    reflection_id = %goal.id,
                    dataset_id = %goal.dataset_id,
                    "dataset deleted, goal marked deleted"
                ),
                Err(e) => tracing::warn!(
                    reflection_id = %goal.id,
                    error = %e,
                    "could not mark goal deleted, deferring"
                ),
            }
        }

        for external in self.stores.externals.all() {
            let query = self.dataset_exists(&mut exists, &external.query_dataset_id).await;
            let target = self.dataset_exists(&mut exists, &external.target_dataset_id).await;
            if query == Some(false) || target == Some(false) {
                self.stores.externals.delete(&external.id);
                tracing::info!(
                    external_id = %external.id,
                    name = %external.name,
                    "dataset deleted, external reflection dropped"
                );
            }
        }
    }

    async fn dataset_exists(
        &self,
        cache: &mut HashMap<DatasetId, Option<bool>>,
        dataset_id: &DatasetId,
    ) -> Option<bool> {
        if let Some(known) = cache.get(dataset_id) {
            return *known;
        }
        let exists = match self.executor.catalog().get_table(dataset_id).await {
            Ok(table) => Some(table.is_some()),
            Err(e) => {
                tracing::warn!(dataset_id = %dataset_id, error = %e, "dataset lookup failed");
                None
            }
        };
        cache.insert(dataset_id.clone(), exists);
        exists
    }

    fn mark_goal_deleted(&self, id: &ReflectionId, now: u64) -> Result<(), ManagerError> {
        with_optimistic_retry(self.config.optimistic_retry_attempts, || {
            let Some(mut goal) = self.stores.goals.get(id) else {
                return Ok(());
            };
            if goal.state == GoalState::Deleted {
                return Ok(());
            }
            goal.state = GoalState::Deleted;
            goal.modified_at = now;
            self.stores.goals.save(goal)?;
            Ok(())
        })
    }

    /// Apply goals modified since the previous wakeup (minus the overlap) to
    /// their entries.
    pub(super) async fn ingest_goals(&mut self, now: u64) {
        let since = self
            .last_wakeup_ms
            .map(|w| w.saturating_sub(self.config.wakeup_overlap_ms()))
            .unwrap_or(0);
        for goal in self.stores.goals.modified_since(since) {
            if let Err(e) = self.ingest_goal(&goal, now).await {
                tracing::warn!(reflection_id = %goal.id, error = %e, "goal ingestion failed");
            }
        }
    }

    async fn ingest_goal(&self, goal: &ReflectionGoal, now: u64) -> Result<(), ManagerError> {
        let Some(mut entry) = self.stores.entries.get(&goal.id) else {
            if goal.is_enabled() {
                let entry = self.stores.entries.save(ReflectionEntry::from_goal(goal, now))?;
                tracing::info!(
                    reflection_id = %entry.id,
                    dataset_id = %entry.dataset_id,
                    "reflection entry created"
                );
            }
            return Ok(());
        };

        if entry.goal_version == goal.tag {
            return Ok(());
        }

        if entry.reflection_goal_hash == goal.content_hash() {
            if entry.metadata_differs(goal) {
                tracing::info!(reflection_id = %entry.id, "goal metadata updated");
            }
            entry.patch_metadata(goal);
            self.stores.entries.save(entry)?;
            return Ok(());
        }

        // A job that cannot be canceled now is canceled again when the
        // entry leaves UPDATE or DEPRECATE
        if let Some(job_id) = entry.refresh_job_id.clone() {
            let cancel = Effect::CancelJob { job_id, reason: "reflection goal changed".to_string() };
            if let Err(e) = self.executor.execute(cancel).await {
                tracing::warn!(reflection_id = %entry.id, error = %e, "job cancel failed");
            }
        }
        let next = if goal.is_enabled() { ReflectionState::Update } else { ReflectionState::Deprecate };
        tracing::info!(
            reflection_id = %entry.id,
            from = %entry.state,
            to = %next,
            goal_state = %goal.state,
            "goal changed"
        );
        entry.set_state(next);
        entry.num_failures = 0;
        entry.last_failure = None;
        entry.reflection_goal_hash = goal.content_hash();
        entry.dataset_id = goal.dataset_id.clone();
        entry.patch_metadata(goal);
        entry.modified_at = now;
        self.stores.entries.save(entry)?;
        Ok(())
    }
}
