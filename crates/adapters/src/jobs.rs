// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job service adapter: runs refresh, compaction, vacuum and drop statements.

use async_trait::async_trait;
use parking_lot::Mutex;
use refl_core::{JobAttempt, JobDetails, JobId, JobKind, JobRequest, JobState, RefreshDecision};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Errors from job service operations
#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(JobId),
    #[error("job submission timed out after {0}ms")]
    SubmissionTimeout(u64),
    #[error("submit failed: {0}")]
    Submit(String),
    #[error("job service unavailable: {0}")]
    Unavailable(String),
}

/// Adapter for the external job-execution service
#[async_trait]
pub trait JobService: Clone + Send + Sync + 'static {
    /// Submit a statement. Returns once the job is registered, not when it finishes.
    async fn submit(&self, request: JobRequest) -> Result<JobId, JobError>;

    async fn cancel(&self, job_id: &JobId, reason: &str) -> Result<(), JobError>;

    /// Latest attempt of a job. [`JobError::NotFound`] when the service forgot it.
    async fn details(&self, job_id: &JobId) -> Result<JobDetails, JobError>;
}

struct ShellJob {
    kind: JobKind,
    state: JobState,
    failure: Option<String>,
    decision: Option<RefreshDecision>,
    started: Instant,
    duration_ms: u64,
    cancel: CancellationToken,
}

/// Job service that pipes each statement into a local SQL command.
///
/// The command runs under `sh -c` with the statement on stdin. A refresh job
/// may print a JSON [`RefreshDecision`] on stdout; anything else is read as
/// an initial full refresh.
#[derive(Clone)]
pub struct ShellJobService {
    command: Arc<str>,
    jobs: Arc<Mutex<HashMap<JobId, ShellJob>>>,
}

impl ShellJobService {
    pub fn new(command: impl Into<String>) -> Self {
        let command: String = command.into();
        Self { command: command.into(), jobs: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn finish(&self, job_id: &JobId, state: JobState, failure: Option<String>, stdout: &[u8]) {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(job_id) else {
            return;
        };
        if job.state.is_terminal() {
            return;
        }
        job.duration_ms = job.started.elapsed().as_millis() as u64;
        job.state = state;
        job.failure = failure;
        if job.kind == JobKind::Refresh && state == JobState::Completed {
            job.decision = Some(parse_decision(stdout));
        }
        tracing::info!(job_id = %job_id, kind = %job.kind, state = %state, "job finished");
    }
}

fn parse_decision(stdout: &[u8]) -> RefreshDecision {
    let text = String::from_utf8_lossy(stdout);
    let last_line = text.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or_default();
    serde_json::from_str(last_line.trim())
        .unwrap_or_else(|_| RefreshDecision { initial_refresh: true, ..RefreshDecision::default() })
}

#[async_trait]
impl JobService for ShellJobService {
    async fn submit(&self, request: JobRequest) -> Result<JobId, JobError> {
        let job_id = JobId::new();
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&*self.command)
            .env("REFL_JOB_ID", job_id.as_str())
            .env("REFL_JOB_KIND", request.kind.to_string())
            .env("REFL_REFLECTION_ID", request.reflection_id.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::Submit(e.to_string()))?;

        let cancel = CancellationToken::new();
        self.jobs.lock().insert(
            job_id.clone(),
            ShellJob {
                kind: request.kind,
                state: JobState::Running,
                failure: None,
                decision: None,
                started: Instant::now(),
                duration_ms: 0,
                cancel: cancel.clone(),
            },
        );
        tracing::info!(job_id = %job_id, kind = %request.kind, "job submitted");

        let service = self.clone();
        let id = job_id.clone();
        let statement = request.statement;
        tokio::spawn(async move {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(statement.as_bytes()).await {
                    tracing::debug!(job_id = %id, error = %e, "statement not fully written");
                }
            }
            tokio::select! {
                output = child.wait_with_output() => match output {
                    Ok(out) if out.status.success() => {
                        service.finish(&id, JobState::Completed, None, &out.stdout);
                    }
                    Ok(out) => {
                        let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
                        let message = if stderr.is_empty() {
                            format!("command exited with {}", out.status)
                        } else {
                            stderr
                        };
                        service.finish(&id, JobState::Failed, Some(message), &[]);
                    }
                    Err(e) => service.finish(&id, JobState::Failed, Some(e.to_string()), &[]),
                },
                _ = cancel.cancelled() => {
                    tracing::debug!(job_id = %id, "job process killed");
                }
            }
        });

        Ok(job_id)
    }

    async fn cancel(&self, job_id: &JobId, reason: &str) -> Result<(), JobError> {
        let mut jobs = self.jobs.lock();
        let job = jobs.get_mut(job_id).ok_or_else(|| JobError::NotFound(job_id.clone()))?;
        if !job.state.is_terminal() {
            job.cancel.cancel();
            job.state = JobState::Canceled;
            job.failure = Some(reason.to_string());
            job.duration_ms = job.started.elapsed().as_millis() as u64;
            tracing::info!(job_id = %job_id, reason, "job canceled");
        }
        Ok(())
    }

    async fn details(&self, job_id: &JobId) -> Result<JobDetails, JobError> {
        let jobs = self.jobs.lock();
        let job = jobs.get(job_id).ok_or_else(|| JobError::NotFound(job_id.clone()))?;
        Ok(JobDetails {
            job_id: job_id.clone(),
            kind: job.kind,
            completed: job.state.is_terminal(),
            last_attempt: JobAttempt {
                state: job.state,
                failure: job.failure.clone(),
                decision: job.decision.clone(),
                duration_ms: job.duration_ms,
            },
        })
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{JobError, JobService};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use refl_core::{JobAttempt, JobDetails, JobId, JobKind, JobRequest, JobState};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    /// Recorded job service call
    #[derive(Debug, Clone, PartialEq)]
    pub enum JobCall {
        Submit { job_id: JobId, request: JobRequest },
        Cancel { job_id: JobId, reason: String },
    }

    #[derive(Default)]
    struct FakeJobState {
        next_id: u64,
        jobs: HashMap<JobId, JobDetails>,
        calls: Vec<JobCall>,
        submit_error: Option<String>,
        submit_delay: Option<Duration>,
        unavailable: Option<String>,
    }

    /// Fake job service: jobs stay RUNNING until a test finishes them
    #[derive(Clone, Default)]
    pub struct FakeJobService {
        inner: Arc<Mutex<FakeJobState>>,
    }

    impl FakeJobService {
        pub fn new() -> Self {
            Self::default()
        }

        /// Get all recorded calls
        pub fn calls(&self) -> Vec<JobCall> {
            self.inner.lock().calls.clone()
        }

        /// Submitted jobs in order
        pub fn submitted(&self) -> Vec<(JobId, JobRequest)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    JobCall::Submit { job_id, request } => Some((job_id, request)),
                    JobCall::Cancel { .. } => None,
                })
                .collect()
        }

        /// Submitted jobs of one kind
        pub fn submitted_of(&self, kind: JobKind) -> Vec<(JobId, JobRequest)> {
            self.submitted().into_iter().filter(|(_, r)| r.kind == kind).collect()
        }

        pub fn canceled(&self) -> Vec<JobId> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    JobCall::Cancel { job_id, .. } => Some(job_id),
                    JobCall::Submit { .. } => None,
                })
                .collect()
        }

        /// Replace what `details` reports for a job
        pub fn set_details(&self, details: JobDetails) {
            self.inner.lock().jobs.insert(details.job_id.clone(), details);
        }

        /// Make the service forget a job, as after a restart
        pub fn forget(&self, job_id: &JobId) {
            self.inner.lock().jobs.remove(job_id);
        }

        /// Fail every submit until cleared
        pub fn set_submit_error(&self, message: Option<&str>) {
            self.inner.lock().submit_error = message.map(String::from);
        }

        /// Fail every cancel and details lookup until cleared
        pub fn set_unavailable(&self, message: Option<&str>) {
            self.inner.lock().unavailable = message.map(String::from);
        }

        /// Delay every submit (for timeout tests)
        pub fn set_submit_delay(&self, delay: Option<Duration>) {
            self.inner.lock().submit_delay = delay;
        }
    }

    #[async_trait]
    impl JobService for FakeJobService {
        async fn submit(&self, request: JobRequest) -> Result<JobId, JobError> {
            let delay = self.inner.lock().submit_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut inner = self.inner.lock();
            if let Some(ref message) = inner.submit_error {
                return Err(JobError::Submit(message.clone()));
            }
            inner.next_id += 1;
            let job_id = JobId::from_string(format!("job-{}", inner.next_id));
            inner.jobs.insert(
                job_id.clone(),
                JobDetails {
                    job_id: job_id.clone(),
                    kind: request.kind,
                    completed: false,
                    last_attempt: JobAttempt {
                        state: JobState::Running,
                        failure: None,
                        decision: None,
                        duration_ms: 0,
                    },
                },
            );
            inner.calls.push(JobCall::Submit { job_id: job_id.clone(), request });
            Ok(job_id)
        }

        async fn cancel(&self, job_id: &JobId, reason: &str) -> Result<(), JobError> {
            let mut inner = self.inner.lock();
            if let Some(ref message) = inner.unavailable {
                return Err(JobError::Unavailable(message.clone()));
            }
            inner.calls.push(JobCall::Cancel { job_id: job_id.clone(), reason: reason.to_string() });
            let job = inner.jobs.get_mut(job_id).ok_or_else(|| JobError::NotFound(job_id.clone()))?;
            if !job.completed {
                job.completed = true;
                job.last_attempt.state = JobState::Canceled;
                job.last_attempt.failure = Some(reason.to_string());
            }
            Ok(())
        }

        async fn details(&self, job_id: &JobId) -> Result<JobDetails, JobError> {
            let inner = self.inner.lock();
            if let Some(ref message) = inner.unavailable {
                return Err(JobError::Unavailable(message.clone()));
            }
            inner.jobs.get(job_id).cloned().ok_or_else(|| JobError::NotFound(job_id.clone()))
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeJobService, JobCall};

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
