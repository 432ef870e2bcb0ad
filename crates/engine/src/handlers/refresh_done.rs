// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{HandlerContext, RefreshStartHandler};
use crate::dependency::{DependencyError, DependencyResolutionContext};
use crate::error::ManagerError;
use refl_adapters::{Catalog, JobError, JobService, NamespaceService};
use refl_core::{
    uncompacted_since_last_compaction, Effect, JobDetails, JobId, JobRequest, JobState,
    Materialization, MaterializationInfo, MaterializationKind, MaterializationState, Refresh,
    RefreshDecision, RefreshId, RefreshMethod, RefreshSettings, ReflectionEntry, ReflectionState,
};

/// Terminal outcome of a polled job.
enum Outcome {
    Completed(RefreshDecision),
    Failed { state: MaterializationState, message: String, decision: Option<RefreshDecision> },
}

/// Polls the job owned by a REFRESHING or COMPACTING entry and applies its
/// outcome to the entry, its materializations and the dependency graph.
pub struct RefreshDoneHandler<'a, J, C, N> {
    ctx: HandlerContext<'a, J, C, N>,
}

impl<'a, J, C, N> RefreshDoneHandler<'a, J, C, N>
where
    J: JobService,
    C: Catalog,
    N: NamespaceService,
{
    pub fn new(ctx: HandlerContext<'a, J, C, N>) -> Self {
        Self { ctx }
    }

    /// Returns `true` when the job reached a terminal state and was handled.
    pub async fn poll(
        &self,
        entry: &mut ReflectionEntry,
        resolution: &DependencyResolutionContext,
        now_ms: u64,
    ) -> Result<bool, ManagerError> {
        let Some(job_id) = entry.refresh_job_id.clone() else {
            self.record_failure(entry, "no job recorded", now_ms);
            return Ok(true);
        };
        let running = self
            .ctx
            .stores
            .materializations
            .by_reflection(&entry.id)
            .into_iter()
            .find(|m| m.state == MaterializationState::Running);
        let Some(m) = running else {
            self.record_failure(entry, "no running materialization for job", now_ms);
            return Ok(true);
        };

        let outcome = match self.ctx.executor.jobs().details(&job_id).await {
            Ok(details) if !details.state().is_terminal() => return Ok(false),
            Ok(details) => outcome_of(details),
            Err(JobError::NotFound(_)) => Outcome::Failed {
                state: MaterializationState::Failed,
                message: format!("job {job_id} not found"),
                decision: None,
            },
            Err(e) => return Err(e.into()),
        };

        match (m.kind, outcome) {
            (MaterializationKind::Refresh, Outcome::Completed(decision)) => {
                let Some(settings) =
                    resolution.effective_settings(&entry.dataset_id, &decision.dependencies)
                else {
                    tracing::info!(
                        reflection_id = %entry.id,
                        job_id = %job_id,
                        "refresh completion deferred, dataset unresolved"
                    );
                    return Ok(false);
                };
                self.refresh_completed(entry, m, &job_id, decision, &settings, now_ms).await?
            }
            (MaterializationKind::Refresh, Outcome::Failed { state, message, decision }) => {
                self.refresh_failed(entry, m, state, message, decision, now_ms).await?
            }
            (MaterializationKind::Compaction, Outcome::Completed(decision)) => {
                self.compaction_completed(entry, m, &job_id, decision, now_ms)?
            }
            (MaterializationKind::Compaction, Outcome::Failed { state, message, .. }) => {
                self.compaction_failed(entry, m, state, message, now_ms).await?
            }
        }
        Ok(true)
    }

    async fn refresh_completed(
        &self,
        entry: &mut ReflectionEntry,
        mut m: Materialization,
        job_id: &JobId,
        decision: RefreshDecision,
        settings: &RefreshSettings,
        now_ms: u64,
    ) -> Result<(), ManagerError> {
        let stores = self.ctx.stores;
        match self.ctx.deps.update_dependencies(
            stores.dependencies.as_ref(),
            &entry.id,
            decision.dependencies.clone(),
            now_ms,
        ) {
            Ok(()) => {}
            Err(e @ (DependencyError::Cycle { .. } | DependencyError::SelfReference(_))) => {
                let message = e.to_string();
                return self
                    .refresh_failed(entry, m, MaterializationState::Failed, message, None, now_ms)
                    .await;
            }
            Err(e) => return Err(e.into()),
        }

        m.state = MaterializationState::Done;
        m.iceberg_snapshot_id = decision.iceberg_snapshot_id;
        m.last_refresh_from_pds = Some(m.created_at);
        m.expiration = settings.expiration_from(m.created_at);
        m.primary_key = decision.primary_key.clone();
        m.refresh_method = decision.method;
        m.failure = None;
        m.modified_at = now_ms;
        let m = stores.materializations.save(m)?;

        stores.refreshes.save(Refresh {
            id: RefreshId::new(),
            tag: 0,
            reflection_id: entry.id.clone(),
            materialization_id: m.id.clone(),
            series_id: m.series_id,
            series_ordinal: m.series_ordinal,
            update_id: decision.update_id,
            metrics: decision.metrics,
            compacted: false,
            job_id: Some(job_id.clone()),
            path: m.base_path.clone(),
            created_at: now_ms,
        })?;

        let register = Effect::RegisterTable {
            reflection_id: entry.id.clone(),
            path: m.table_path(&self.ctx.config.accelerator_root),
            primary_key: m.primary_key.clone(),
        };
        if let Err(e) = self.ctx.executor.execute(register).await {
            tracing::warn!(reflection_id = %entry.id, error = %e, "table registration failed");
        }

        self.deprecate_others(&m, now_ms).await?;
        self.ctx.executor.cache().update(&m);

        entry.record_success(now_ms);
        entry.refresh_method = decision.method;
        entry.snapshot_based = decision.snapshot_based;

        let previous = self.ctx.deps.materialization_info(&entry.id);
        let (needs_vacuum, snapshots_since_vacuum) = match previous {
            Some(info) if m.series_ordinal > 0 => {
                (info.needs_vacuum, info.snapshots_since_vacuum.saturating_add(1))
            }
            _ => (false, 0),
        };
        self.ctx.deps.update_materialization_info(
            &entry.id,
            MaterializationInfo {
                materialization_id: m.id.clone(),
                iceberg_snapshot_id: m.iceberg_snapshot_id,
                needs_vacuum,
                snapshots_since_vacuum,
            },
        );
        tracing::info!(
            reflection_id = %entry.id,
            materialization_id = %m.id,
            method = %decision.method,
            initial = decision.initial_refresh,
            no_op = decision.no_op,
            "refresh completed"
        );

        if self.should_compact(entry, &m) {
            let start = RefreshStartHandler::new(self.ctx);
            if let Err(e) = start.start_compaction(entry, &m, now_ms).await {
                tracing::warn!(reflection_id = %entry.id, error = %e, "compaction not started");
            }
        }
        Ok(())
    }

    async fn refresh_failed(
        &self,
        entry: &mut ReflectionEntry,
        mut m: Materialization,
        state: MaterializationState,
        message: String,
        decision: Option<RefreshDecision>,
        now_ms: u64,
    ) -> Result<(), ManagerError> {
        let stores = self.ctx.stores;
        m.fail(state, message.clone(), now_ms);
        m.modified_at = now_ms;
        let m = stores.materializations.save(m)?;
        self.rollback(&m).await;

        if let Some(decision) = decision.filter(|d| !d.dependencies.is_empty()) {
            if let Err(e) = self.ctx.deps.update_dependencies(
                stores.dependencies.as_ref(),
                &entry.id,
                decision.dependencies,
                now_ms,
            ) {
                tracing::debug!(reflection_id = %entry.id, error = %e, "dependencies not updated");
            }
        }

        self.record_failure(entry, &message, now_ms);
        Ok(())
    }

    /// Count a failed attempt; an entry that reaches FAILED leaves the graph.
    fn record_failure(&self, entry: &mut ReflectionEntry, message: &str, now_ms: u64) {
        entry.record_failure(message, now_ms, self.ctx.config.max_refresh_attempts);
        if entry.state == ReflectionState::Failed {
            tracing::error!(
                reflection_id = %entry.id,
                num_failures = entry.num_failures,
                error = message,
                "refresh retries exhausted"
            );
            self.ctx.deps.delete(self.ctx.stores.dependencies.as_ref(), &entry.id);
        } else {
            tracing::warn!(
                reflection_id = %entry.id,
                num_failures = entry.num_failures,
                error = message,
                "refresh failed"
            );
        }
    }

    fn compaction_completed(
        &self,
        entry: &mut ReflectionEntry,
        mut m: Materialization,
        job_id: &JobId,
        decision: RefreshDecision,
        now_ms: u64,
    ) -> Result<(), ManagerError> {
        let stores = self.ctx.stores;
        let source = stores
            .materializations
            .by_reflection(&entry.id)
            .into_iter()
            .filter(|s| {
                s.state == MaterializationState::Done && s.series_id == m.series_id && s.id != m.id
            })
            .max_by_key(|s| s.series_ordinal);

        m.state = MaterializationState::Done;
        m.iceberg_snapshot_id = decision.iceberg_snapshot_id.or(m.previous_iceberg_snapshot);
        if let Some(ref source) = source {
            m.expiration = source.expiration;
            m.last_refresh_from_pds = source.last_refresh_from_pds;
            m.primary_key = source.primary_key.clone();
        }
        m.modified_at = now_ms;
        let m = stores.materializations.save(m)?;

        stores.refreshes.save(Refresh {
            id: RefreshId::new(),
            tag: 0,
            reflection_id: entry.id.clone(),
            materialization_id: m.id.clone(),
            series_id: m.series_id,
            series_ordinal: m.series_ordinal,
            update_id: decision.update_id,
            metrics: decision.metrics,
            compacted: true,
            job_id: Some(job_id.clone()),
            path: m.base_path.clone(),
            created_at: now_ms,
        })?;

        if let Some(mut source) = source {
            source.state = MaterializationState::Deprecated;
            source.modified_at = now_ms;
            let source = stores.materializations.save(source)?;
            self.ctx.executor.cache().evict(&source.id);
        }
        self.ctx.executor.cache().update(&m);
        self.ctx.deps.update_materialization_info(
            &entry.id,
            MaterializationInfo {
                materialization_id: m.id.clone(),
                iceberg_snapshot_id: m.iceberg_snapshot_id,
                needs_vacuum: true,
                snapshots_since_vacuum: 0,
            },
        );

        entry.refresh_job_id = None;
        entry.set_state(ReflectionState::Active);
        tracing::info!(reflection_id = %entry.id, materialization_id = %m.id, "compaction completed");
        Ok(())
    }

    async fn compaction_failed(
        &self,
        entry: &mut ReflectionEntry,
        mut m: Materialization,
        state: MaterializationState,
        message: String,
        now_ms: u64,
    ) -> Result<(), ManagerError> {
        m.fail(state, message.clone(), now_ms);
        m.modified_at = now_ms;
        let m = self.ctx.stores.materializations.save(m)?;
        self.rollback(&m).await;

        entry.refresh_job_id = None;
        entry.set_state(ReflectionState::Active);
        tracing::warn!(reflection_id = %entry.id, error = %message, "compaction failed");
        Ok(())
    }

    /// Deprecate every other DONE materialization of the reflection.
    async fn deprecate_others(&self, current: &Materialization, now_ms: u64) -> Result<(), ManagerError> {
        let stores = self.ctx.stores;
        for mut old in stores
            .materializations
            .by_reflection(&current.reflection_id)
            .into_iter()
            .filter(|o| o.state == MaterializationState::Done && o.id != current.id)
        {
            old.state = MaterializationState::Deprecated;
            old.modified_at = now_ms;
            let old = stores.materializations.save(old)?;
            self.ctx
                .executor
                .execute(Effect::EvictMaterialization { materialization_id: old.id.clone() })
                .await?;
        }
        Ok(())
    }

    /// Roll the table back to the snapshot preceding a failed write.
    async fn rollback(&self, m: &Materialization) {
        let Some(snapshot) = m.previous_iceberg_snapshot else {
            return;
        };
        let table = m.table_path(&self.ctx.config.accelerator_root);
        let request = JobRequest::rollback(&m.reflection_id, &m.id, &table, snapshot);
        if let Err(e) = self.ctx.executor.submit(request).await {
            tracing::warn!(
                reflection_id = %m.reflection_id,
                materialization_id = %m.id,
                error = %e,
                "rollback not submitted"
            );
        }
    }

    fn should_compact(&self, entry: &ReflectionEntry, m: &Materialization) -> bool {
        let config = self.ctx.config;
        if !config.enable_compaction || entry.refresh_method != RefreshMethod::Incremental {
            return false;
        }
        let sorted = self.ctx.stores.goals.get(&entry.id).is_some_and(|g| g.details.is_sorted());
        if sorted {
            return false;
        }
        let series = self.ctx.stores.refreshes.by_series(&entry.id, m.series_id);
        uncompacted_since_last_compaction(&series) >= config.compaction_refresh_threshold
    }
}

fn outcome_of(details: JobDetails) -> Outcome {
    let message = details.failure_message();
    match details.state() {
        JobState::Completed => Outcome::Completed(details.last_attempt.decision.unwrap_or_default()),
        JobState::Canceled => Outcome::Failed {
            state: MaterializationState::Canceled,
            message,
            decision: details.last_attempt.decision,
        },
        _ => Outcome::Failed {
            state: MaterializationState::Failed,
            message,
            decision: details.last_attempt.decision,
        },
    }
}
