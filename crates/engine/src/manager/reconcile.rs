// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-entry state machine driving.

use super::ReflectionManager;
use crate::dependency::DependencyResolutionContext;
use crate::error::ManagerError;
use crate::handlers::{RefreshDoneHandler, RefreshStartHandler};
use refl_adapters::{Catalog, JobService, NamespaceService};
use refl_core::transition::{self, Action, Observation};
use refl_core::{
    Clock, Effect, MaterializationState, ReflectionEntry, ReflectionId, ReflectionState,
};
use refl_storage::Conflict;

/// A state only loops back through REFRESH once per pass.
const MAX_STEPS: usize = 3;

impl<J, C, N, K> ReflectionManager<J, C, N, K>
where
    J: JobService,
    C: Catalog,
    N: NamespaceService,
    K: Clock,
{
    pub(super) async fn reconcile_entries(&self, ctx: &DependencyResolutionContext, now: u64) {
        for entry in self.stores.entries.all() {
            let id = entry.id.clone();
            if let Err(e) = self.reconcile_entry(entry, ctx, now).await {
                if e.is_conflict() {
                    tracing::warn!(reflection_id = %id, error = %e, "entry changed concurrently, deferring");
                } else {
                    tracing::error!(reflection_id = %id, error = %e, "entry reconciliation failed");
                    self.fail_entry(&id, &e, now);
                }
            }
        }
    }

    /// Charge an unexpected error against the entry's retry budget.
    ///
    /// Entries being removed or already FAILED keep their state; removal is
    /// retried next pass.
    fn fail_entry(&self, id: &ReflectionId, error: &ManagerError, now: u64) {
        let Some(mut entry) = self.stores.entries.get(id) else {
            return;
        };
        if matches!(entry.state, ReflectionState::Deprecate | ReflectionState::Failed) {
            return;
        }
        self.record_failure(&mut entry, &error.to_string(), now);
        entry.modified_at = now;
        if let Err(e) = self.stores.entries.save(entry) {
            tracing::warn!(reflection_id = %id, error = %e, "failure not recorded, deferring");
        }
    }

    async fn reconcile_entry(
        &self,
        mut entry: ReflectionEntry,
        ctx: &DependencyResolutionContext,
        now: u64,
    ) -> Result<(), ManagerError> {
        let original = entry.clone();
        self.heal(&mut entry, now).await?;

        for _ in 0..MAX_STEPS {
            let obs = self.observe(&entry, ctx, now);
            let step = transition::step(entry.state, obs);
            tracing::trace!(
                reflection_id = %entry.id,
                state = %entry.state,
                next = %step.next,
                action = %step.action,
                "step"
            );
            match step.action {
                Action::Nothing => {
                    let entering_pending = step.next == ReflectionState::RefreshPending
                        && entry.state != ReflectionState::RefreshPending;
                    entry.set_state(step.next);
                    if entering_pending {
                        entry.refresh_pending_begin = Some(now);
                        tracing::info!(reflection_id = %entry.id, "waiting on upstream refresh");
                    }
                }
                Action::SubmitRefresh => self.submit_refresh(&mut entry, now).await,
                Action::PollJob => {
                    let done = RefreshDoneHandler::new(self.handler_context());
                    done.poll(&mut entry, ctx, now).await?;
                }
                Action::Vacuum => {
                    let start = RefreshStartHandler::new(self.handler_context());
                    if let Err(e) = start.start_vacuum(&entry, now).await {
                        tracing::warn!(reflection_id = %entry.id, error = %e, "vacuum not submitted");
                    }
                }
                Action::CancelAndRefresh => {
                    self.supersede(&mut entry, "reflection goal changed", now).await?;
                    self.submit_refresh(&mut entry, now).await;
                }
                Action::Remove => {
                    self.remove_entry(&mut entry, now).await?;
                    return Ok(());
                }
            }
            if !step.continues() {
                break;
            }
        }

        if entry != original {
            if entry.state != original.state {
                entry.modified_at = now;
            }
            self.stores.entries.save(entry)?;
        }
        Ok(())
    }

    fn observe(
        &self,
        entry: &ReflectionEntry,
        ctx: &DependencyResolutionContext,
        now: u64,
    ) -> Observation {
        match entry.state {
            ReflectionState::Active => {
                let due = self.deps.should_refresh(entry, ctx);
                Observation {
                    due,
                    dependency_refreshing: due && self.deps.has_dependency_refreshing(&entry.id, ctx),
                    pending_timed_out: false,
                    vacuum_eligible: !due
                        && self.config.enable_vacuum
                        && self.deps.should_vacuum(entry),
                }
            }
            ReflectionState::RefreshPending => Observation {
                dependency_refreshing: self.deps.has_dependency_refreshing(&entry.id, ctx),
                pending_timed_out: transition::pending_timed_out(
                    entry.refresh_pending_begin,
                    now,
                    self.config.refresh_pending_timeout_ms(),
                ),
                ..Observation::default()
            },
            _ => Observation::default(),
        }
    }

    async fn submit_refresh(&self, entry: &mut ReflectionEntry, now: u64) {
        let start = RefreshStartHandler::new(self.handler_context());
        if let Err(e) = start.start_refresh(entry, now).await {
            self.record_failure(entry, &format!("refresh submission failed: {e}"), now);
        }
    }

    /// Repair entry/materialization mismatches before stepping the entry.
    async fn heal(&self, entry: &mut ReflectionEntry, now: u64) -> Result<(), ManagerError> {
        let running: Vec<_> = self
            .stores
            .materializations
            .by_reflection(&entry.id)
            .into_iter()
            .filter(|m| m.state == MaterializationState::Running)
            .collect();

        if entry.state.has_running_job() && running.is_empty() {
            tracing::warn!(
                reflection_id = %entry.id,
                state = %entry.state,
                "no running materialization for entry"
            );
            if entry.state == ReflectionState::Compacting {
                entry.refresh_job_id = None;
                entry.set_state(ReflectionState::Active);
            } else {
                self.record_failure(entry, "no running materialization", now);
            }
            return Ok(());
        }

        let owns_running = matches!(
            entry.state,
            ReflectionState::Refreshing
                | ReflectionState::Compacting
                | ReflectionState::Update
                | ReflectionState::Deprecate
        );
        for mut m in running {
            let owned = owns_running
                && (entry.refresh_job_id.is_none() || m.init_refresh_job_id == entry.refresh_job_id);
            if owned {
                continue;
            }
            tracing::warn!(
                reflection_id = %entry.id,
                materialization_id = %m.id,
                state = %entry.state,
                "deprecating orphaned running materialization"
            );
            if let Some(job_id) = m.init_refresh_job_id.clone() {
                self.executor
                    .execute(Effect::CancelJob { job_id, reason: "orphaned materialization".into() })
                    .await?;
            }
            m.state = MaterializationState::Deprecated;
            m.modified_at = now;
            self.stores.materializations.save(m)?;
        }
        Ok(())
    }

    /// Cancel the entry's job and retire its current materializations.
    async fn supersede(
        &self,
        entry: &mut ReflectionEntry,
        reason: &str,
        now: u64,
    ) -> Result<(), ManagerError> {
        if let Some(job_id) = entry.refresh_job_id.take() {
            self.executor
                .execute(Effect::CancelJob { job_id, reason: reason.to_string() })
                .await?;
        }
        for mut m in self.stores.materializations.by_reflection(&entry.id) {
            match m.state {
                MaterializationState::Running => {
                    m.fail(MaterializationState::Canceled, reason, now);
                }
                MaterializationState::Done => m.state = MaterializationState::Deprecated,
                _ => continue,
            }
            m.modified_at = now;
            self.stores.materializations.save(m)?;
        }
        self.executor
            .execute(Effect::InvalidateReflection { reflection_id: entry.id.clone() })
            .await?;
        Ok(())
    }

    async fn remove_entry(&self, entry: &mut ReflectionEntry, now: u64) -> Result<(), ManagerError> {
        self.supersede(entry, "reflection removed", now).await?;
        self.deps.delete(self.stores.dependencies.as_ref(), &entry.id);
        self.stores.entries.delete(&entry.id);
        tracing::info!(reflection_id = %entry.id, "reflection entry removed");
        Ok(())
    }
}
