// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::HandlerContext;
use crate::error::ManagerError;
use refl_adapters::{Catalog, JobService, NamespaceService};
use refl_core::{
    JobRequest, Materialization, MaterializationKind, MaterializationState, NewMaterialization,
    RefreshMethod, ReflectionEntry, ReflectionState,
};

/// Submits refresh, compaction and vacuum jobs and ties each job to a
/// materialization.
pub struct RefreshStartHandler<'a, J, C, N> {
    ctx: HandlerContext<'a, J, C, N>,
}

impl<'a, J, C, N> RefreshStartHandler<'a, J, C, N>
where
    J: JobService,
    C: Catalog,
    N: NamespaceService,
{
    pub fn new(ctx: HandlerContext<'a, J, C, N>) -> Self {
        Self { ctx }
    }

    /// Create a RUNNING materialization and submit its refresh job.
    ///
    /// An incremental reflection with a DONE materialization continues that
    /// series; anything else starts a new one. On success the entry is
    /// REFRESHING and owns the job; on failure the materialization is FAILED
    /// and the entry is left for the caller to record the failure.
    pub async fn start_refresh(
        &self,
        entry: &mut ReflectionEntry,
        now_ms: u64,
    ) -> Result<Materialization, ManagerError> {
        let existing = self.ctx.stores.materializations.by_reflection(&entry.id);
        for mut running in existing.iter().filter(|m| m.state == MaterializationState::Running).cloned()
        {
            tracing::warn!(
                reflection_id = %entry.id,
                materialization_id = %running.id,
                "superseding running materialization"
            );
            running.fail(MaterializationState::Canceled, "superseded by a new refresh", now_ms);
            running.modified_at = now_ms;
            self.ctx.stores.materializations.save(running)?;
        }

        let last_done = existing
            .iter()
            .filter(|m| m.state == MaterializationState::Done)
            .max_by_key(|m| (m.series_id, m.series_ordinal));
        let next_series = existing.iter().map(|m| m.series_id).max().unwrap_or(0) + 1;

        let params = match last_done {
            Some(last) if entry.refresh_method == RefreshMethod::Incremental => NewMaterialization {
                reflection_id: entry.id.clone(),
                kind: MaterializationKind::Refresh,
                series_id: last.series_id,
                series_ordinal: last.series_ordinal + 1,
                base_path: Some(last.base_path.clone()),
                previous_iceberg_snapshot: last.iceberg_snapshot_id,
                refresh_method: RefreshMethod::Incremental,
                reflection_goal_version: entry.goal_version,
            },
            _ => NewMaterialization {
                reflection_id: entry.id.clone(),
                kind: MaterializationKind::Refresh,
                series_id: next_series,
                series_ordinal: 0,
                base_path: None,
                previous_iceberg_snapshot: None,
                refresh_method: entry.refresh_method,
                reflection_goal_version: entry.goal_version,
            },
        };

        let m = self.ctx.stores.materializations.save(Materialization::new(params, now_ms))?;
        let request = JobRequest::refresh(&entry.id, &m.id);
        let m = self.attach_job(m, request, now_ms).await?;

        entry.refresh_job_id = m.init_refresh_job_id.clone();
        entry.last_submitted_refresh = Some(now_ms);
        entry.set_state(ReflectionState::Refreshing);
        tracing::info!(
            reflection_id = %entry.id,
            materialization_id = %m.id,
            series_id = m.series_id,
            series_ordinal = m.series_ordinal,
            "refresh submitted"
        );
        Ok(m)
    }

    /// Submit an OPTIMIZE of `source`'s table as the next generation of its series.
    pub async fn start_compaction(
        &self,
        entry: &mut ReflectionEntry,
        source: &Materialization,
        now_ms: u64,
    ) -> Result<Materialization, ManagerError> {
        let params = NewMaterialization {
            reflection_id: entry.id.clone(),
            kind: MaterializationKind::Compaction,
            series_id: source.series_id,
            series_ordinal: source.series_ordinal + 1,
            base_path: Some(source.base_path.clone()),
            previous_iceberg_snapshot: source.iceberg_snapshot_id,
            refresh_method: source.refresh_method,
            reflection_goal_version: source.reflection_goal_version,
        };
        let m = self.ctx.stores.materializations.save(Materialization::new(params, now_ms))?;
        let table = source.table_path(&self.ctx.config.accelerator_root);
        let request = JobRequest::compact(&entry.id, &m.id, &table);
        let m = self.attach_job(m, request, now_ms).await?;

        entry.refresh_job_id = m.init_refresh_job_id.clone();
        entry.set_state(ReflectionState::Compacting);
        tracing::info!(reflection_id = %entry.id, materialization_id = %m.id, "compaction submitted");
        Ok(m)
    }

    /// Expire old snapshots of the current table. Not tracked as a job.
    pub async fn start_vacuum(
        &self,
        entry: &ReflectionEntry,
        now_ms: u64,
    ) -> Result<(), ManagerError> {
        let current = self
            .ctx
            .stores
            .materializations
            .by_reflection(&entry.id)
            .into_iter()
            .filter(|m| m.state == MaterializationState::Done)
            .max_by_key(|m| (m.series_id, m.series_ordinal));
        let Some(current) = current else {
            return Ok(());
        };
        let older_than = now_ms.saturating_sub(self.ctx.config.deletion_grace_period_ms());
        let table = current.table_path(&self.ctx.config.accelerator_root);
        self.ctx.executor.submit(JobRequest::vacuum(&entry.id, &table, older_than)).await?;
        self.ctx.deps.mark_vacuumed(&entry.id);
        Ok(())
    }

    async fn attach_job(
        &self,
        mut m: Materialization,
        request: JobRequest,
        now_ms: u64,
    ) -> Result<Materialization, ManagerError> {
        match self.ctx.executor.submit(request).await {
            Ok(job_id) => {
                m.init_refresh_job_id = Some(job_id);
                m.modified_at = now_ms;
                Ok(self.ctx.stores.materializations.save(m)?)
            }
            Err(e) => {
                m.fail(MaterializationState::Failed, e.to_string(), now_ms);
                m.modified_at = now_ms;
                if let Err(save_err) = self.ctx.stores.materializations.save(m) {
                    tracing::warn!(error = %save_err, "failed to record submission failure");
                }
                Err(e.into())
            }
        }
    }
}
