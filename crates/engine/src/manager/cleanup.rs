// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Garbage collection of materializations and goals, and staleness upkeep.

use super::ReflectionManager;
use crate::dependency::DependencyResolutionContext;
use crate::error::ManagerError;
use refl_adapters::{Catalog, JobError, JobService, NamespaceService};
use refl_core::{
    Clock, Effect, GoalState, JobRequest, JobState, Materialization, MaterializationState,
};

impl<J, C, N, K> ReflectionManager<J, C, N, K>
where
    J: JobService,
    C: Catalog,
    N: NamespaceService,
    K: Clock,
{
    /// Physically delete DEPRECATED materializations past the grace period.
    ///
    /// Generations of a series share one table: only the last remaining
    /// generation of a series with refresh records drops it.
    pub(super) async fn delete_deprecated_materializations(&self, now: u64) {
        let grace = self.config.deletion_grace_period_ms();
        for m in self.stores.materializations.by_state(MaterializationState::Deprecated) {
            if now < m.modified_at.saturating_add(grace) {
                continue;
            }
            let id = m.id.clone();
            if let Err(e) = self.delete_materialization(m, now).await {
                tracing::warn!(materialization_id = %id, error = %e, "materialization deletion failed");
            }
        }
    }

    async fn delete_materialization(&self, mut m: Materialization, now: u64) -> Result<(), ManagerError> {
        let shares_table = self
            .stores
            .materializations
            .by_reflection(&m.reflection_id)
            .iter()
            .any(|o| {
                o.id != m.id && o.series_id == m.series_id && o.state != MaterializationState::Deleted
            });
        let has_refreshes =
            !self.stores.refreshes.by_series(&m.reflection_id, m.series_id).is_empty();

        if shares_table || !has_refreshes {
            self.stores.materializations.delete(&m.id);
            self.cache.evict(&m.id);
            tracing::debug!(materialization_id = %m.id, shares_table, "materialization deleted");
            return Ok(());
        }

        let job_id = self.submit_drop(&m).await?;
        m.state = MaterializationState::Deleted;
        m.drop_job_id = Some(job_id);
        m.modified_at = now;
        let m = self.stores.materializations.save(m)?;
        tracing::info!(materialization_id = %m.id, reflection_id = %m.reflection_id, "table drop submitted");
        Ok(())
    }

    async fn submit_drop(&self, m: &Materialization) -> Result<refl_core::JobId, ManagerError> {
        let table = m.table_path(&self.config.accelerator_root);
        Ok(self.executor.submit(JobRequest::drop_table(&m.reflection_id, &m.id, &table)).await?)
    }

    /// Finish DELETED materializations whose drop completed, resubmit failed
    /// drops, and deprecate materializations whose entry is gone.
    pub(super) async fn reconcile_orphans(&self, now: u64) {
        let mut budget = self.config.orphan_delete_budget;
        for m in self.stores.materializations.by_state(MaterializationState::Deleted) {
            let id = m.id.clone();
            if let Err(e) = self.reconcile_deleted(m, &mut budget, now).await {
                tracing::warn!(materialization_id = %id, error = %e, "orphan cleanup failed");
            }
        }

        for mut m in self.stores.materializations.all() {
            if matches!(m.state, MaterializationState::Deprecated | MaterializationState::Deleted)
                || self.stores.entries.get(&m.reflection_id).is_some()
            {
                continue;
            }
            tracing::info!(
                materialization_id = %m.id,
                reflection_id = %m.reflection_id,
                "deprecating materialization of removed reflection"
            );
            if m.state == MaterializationState::Running {
                if let Some(job_id) = m.init_refresh_job_id.clone() {
                    let cancel = Effect::CancelJob { job_id, reason: "reflection removed".into() };
                    if let Err(e) = self.executor.execute(cancel).await {
                        tracing::warn!(materialization_id = %m.id, error = %e, "cancel failed");
                    }
                }
            }
            m.state = MaterializationState::Deprecated;
            m.modified_at = now;
            let id = m.id.clone();
            match self.stores.materializations.save(m) {
                Ok(_) => {
                    self.cache.evict(&id);
                }
                Err(e) => tracing::warn!(materialization_id = %id, error = %e, "deprecation deferred"),
            }
        }
    }

    async fn reconcile_deleted(
        &self,
        mut m: Materialization,
        budget: &mut usize,
        now: u64,
    ) -> Result<(), ManagerError> {
        let state = match m.drop_job_id {
            Some(ref job_id) => match self.executor.jobs().details(job_id).await {
                Ok(details) => Some(details.state()),
                Err(JobError::NotFound(_)) => None,
                Err(e) => return Err(e.into()),
            },
            None => None,
        };
        match state {
            Some(JobState::Completed) => {
                for refresh in self.stores.refreshes.by_series(&m.reflection_id, m.series_id) {
                    self.stores.refreshes.delete(&refresh.id);
                }
                self.stores.materializations.delete(&m.id);
                tracing::info!(materialization_id = %m.id, "materialization dropped");
            }
            Some(s) if !s.is_terminal() => {}
            _ => {
                if *budget == 0 {
                    tracing::debug!(materialization_id = %m.id, "delete budget exhausted");
                    return Ok(());
                }
                *budget -= 1;
                let job_id = self.submit_drop(&m).await?;
                tracing::warn!(materialization_id = %m.id, job_id = %job_id, "table drop resubmitted");
                m.drop_job_id = Some(job_id);
                m.modified_at = now;
                self.stores.materializations.save(m)?;
            }
        }
        Ok(())
    }

    /// Deprecate expired DONE materializations and failed/canceled leftovers.
    pub(super) async fn deprecate_expired(&self, now: u64) {
        let mut candidates = self.stores.materializations.expired_before(now);
        candidates.extend(self.stores.materializations.by_state(MaterializationState::Failed));
        candidates.extend(self.stores.materializations.by_state(MaterializationState::Canceled));

        for mut m in candidates {
            let expired = m.state == MaterializationState::Done;
            m.state = MaterializationState::Deprecated;
            m.modified_at = now;
            match self.stores.materializations.save(m) {
                Ok(m) => {
                    if expired {
                        tracing::info!(
                            materialization_id = %m.id,
                            reflection_id = %m.reflection_id,
                            "materialization expired"
                        );
                    }
                    let evict = Effect::EvictMaterialization { materialization_id: m.id.clone() };
                    if let Err(e) = self.executor.execute(evict).await {
                        tracing::warn!(materialization_id = %m.id, error = %e, "eviction failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "materialization deprecation deferred"),
            }
        }
    }

    /// Hard-delete goals DELETED longer than the grace period plus the goal
    /// deletion wait, together with the reflection's folder.
    pub(super) async fn delete_deprecated_goals(&self, now: u64) {
        let wait =
            self.config.deletion_grace_period_ms().saturating_add(self.config.goal_deletion_wait_ms());
        for goal in self.stores.goals.all() {
            if goal.state != GoalState::Deleted
                || now < goal.modified_at.saturating_add(wait)
                || self.stores.entries.get(&goal.id).is_some()
            {
                continue;
            }
            let folder = Effect::DeleteFolder {
                path: vec![self.config.accelerator_root.clone(), goal.id.to_string()],
            };
            if let Err(e) = self.executor.execute(folder).await {
                tracing::warn!(reflection_id = %goal.id, error = %e, "folder deletion failed");
            }
            self.stores.goals.delete(&goal.id);
            self.deps.delete(self.stores.dependencies.as_ref(), &goal.id);
            tracing::info!(reflection_id = %goal.id, "deleted goal purged");
        }
    }

    /// Recompute staleness of usable materializations, and their expiration
    /// when refresh settings changed since the previous pass.
    pub(super) fn refresh_staleness(&self, ctx: &DependencyResolutionContext, now: u64) {
        for mut m in self.stores.materializations.by_state(MaterializationState::Done) {
            if m.is_expired(now) {
                continue;
            }
            let mut changed = false;
            if ctx.settings_changed() {
                let settings = ctx.entry(&m.reflection_id).and_then(|entry| {
                    let deps = self.deps.get_dependencies(&m.reflection_id);
                    ctx.effective_settings(&entry.dataset_id, &deps)
                });
                if let Some(settings) = settings {
                    let expiration =
                        settings.expiration_from(m.last_refresh_from_pds.unwrap_or(m.created_at));
                    if expiration != m.expiration {
                        m.expiration = expiration;
                        changed = true;
                    }
                }
            }
            if !m.is_stale && self.deps.compute_staleness(&m, ctx) {
                tracing::debug!(materialization_id = %m.id, "materialization is stale");
                m.is_stale = true;
                changed = true;
            }
            if !changed {
                continue;
            }
            m.modified_at = now;
            match self.stores.materializations.save(m) {
                Ok(m) => self.cache.update(&m),
                Err(e) => tracing::warn!(error = %e, "staleness update deferred"),
            }
        }
    }
}
