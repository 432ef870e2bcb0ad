// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Effect executor

use crate::cache::MaterializationCache;
use refl_adapters::{Catalog, CatalogError, JobError, JobService, NamespaceError, NamespaceService};
use refl_core::{Effect, JobId, JobRequest};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during effect execution
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("job service error: {0}")]
    Job(#[from] JobError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("namespace error: {0}")]
    Namespace(#[from] NamespaceError),
    #[error("job service accepted {0} without returning a job id")]
    MissingJobId(String),
}

/// Executes effects against the job service, catalog, namespace and cache
pub struct Executor<J, C, N> {
    jobs: J,
    catalog: C,
    namespace: N,
    cache: Arc<MaterializationCache>,
    submit_timeout: Duration,
}

impl<J, C, N> Executor<J, C, N>
where
    J: JobService,
    C: Catalog,
    N: NamespaceService,
{
    pub fn new(
        jobs: J,
        catalog: C,
        namespace: N,
        cache: Arc<MaterializationCache>,
        submit_timeout: Duration,
    ) -> Self {
        Self { jobs, catalog, namespace, cache, submit_timeout }
    }

    pub fn jobs(&self) -> &J {
        &self.jobs
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<MaterializationCache> {
        &self.cache
    }

    /// Execute a single effect with tracing
    ///
    /// Returns the job id for `SubmitJob`.
    pub async fn execute(&self, effect: Effect) -> Result<Option<JobId>, ExecuteError> {
        // Format the fields as `key=val`
        let info = {
            let fields = effect.fields();
            let cap = fields.iter().map(|(a, b)| a.len() + b.len() + 2).sum();
            let mut fmt = String::with_capacity(cap);
            for (key, val) in fields {
                fmt.push_str(key);
                fmt.push('=');
                fmt.push_str(&val);
                fmt.push(' ');
            }
            fmt.pop();
            fmt
        };

        let op = effect.name();
        let verbose = effect.verbose();
        if verbose {
            tracing::info!("executing effect={} {}", op, info);
        }

        let start = std::time::Instant::now();
        let result = self.execute_inner(effect).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if verbose {
            match &result {
                Ok(job_id) => tracing::info!(
                    job_id = job_id.as_ref().map(|j| j.as_str()).unwrap_or("-"),
                    elapsed_ms,
                    "completed"
                ),
                Err(e) => tracing::error!(error = %e, elapsed_ms, "failed"),
            }
        } else {
            match &result {
                Ok(_) => tracing::debug!(elapsed_ms, "executed effect={} {}", op, info),
                Err(e) => tracing::error!(error = %e, elapsed_ms, "error effect={} {}", op, info),
            }
        }

        result
    }

    /// Submit a job and return its id.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, ExecuteError> {
        let kind = request.kind;
        self.execute(Effect::SubmitJob { request })
            .await?
            .ok_or_else(|| ExecuteError::MissingJobId(kind.to_string()))
    }

    async fn execute_inner(&self, effect: Effect) -> Result<Option<JobId>, ExecuteError> {
        match effect {
            Effect::SubmitJob { request } => {
                let submit = self.jobs.submit(request);
                match tokio::time::timeout(self.submit_timeout, submit).await {
                    Ok(result) => Ok(Some(result?)),
                    Err(_) => Err(JobError::SubmissionTimeout(
                        self.submit_timeout.as_millis() as u64
                    )
                    .into()),
                }
            }

            Effect::CancelJob { job_id, reason } => match self.jobs.cancel(&job_id, &reason).await {
                Ok(()) | Err(JobError::NotFound(_)) => Ok(None),
                Err(e) => Err(e.into()),
            },

            Effect::RegisterTable { path, primary_key, .. } => {
                self.catalog.create_dataset(&path).await?;
                if !primary_key.is_empty() {
                    self.catalog.add_primary_key(&path, &primary_key).await?;
                }
                Ok(None)
            }

            Effect::InvalidateReflection { reflection_id } => {
                self.cache.invalidate(&reflection_id);
                Ok(None)
            }

            Effect::EvictMaterialization { materialization_id } => {
                self.cache.evict(&materialization_id);
                Ok(None)
            }

            Effect::DeleteFolder { path } => {
                self.namespace.delete_folder(&path).await?;
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
