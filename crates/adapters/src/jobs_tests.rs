// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use refl_core::{MaterializationId, RefreshMethod, ReflectionId};
use std::time::Duration;

fn refresh_request() -> JobRequest {
    JobRequest::refresh(&ReflectionId::from_string("rfl-1"), &MaterializationId::from_string("mat-1"))
}

async fn wait_terminal(service: &ShellJobService, job_id: &JobId) -> JobDetails {
    for _ in 0..200 {
        let details = service.details(job_id).await.unwrap();
        if details.completed {
            return details;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not finish");
}

#[tokio::test]
async fn successful_command_completes_with_default_decision() {
    let service = ShellJobService::new("cat > /dev/null");
    let job_id = service.submit(refresh_request()).await.unwrap();

    let details = wait_terminal(&service, &job_id).await;
    assert_eq!(details.state(), JobState::Completed);
    let decision = details.last_attempt.decision.unwrap();
    assert!(decision.initial_refresh);
}

#[tokio::test]
async fn decision_is_read_from_last_stdout_line() {
    let service = ShellJobService::new(
        r#"cat > /dev/null; echo progress; echo '{"method":"incremental","update_id":4}'"#,
    );
    let job_id = service.submit(refresh_request()).await.unwrap();

    let decision = wait_terminal(&service, &job_id).await.last_attempt.decision.unwrap();
    assert_eq!(decision.method, RefreshMethod::Incremental);
    assert_eq!(decision.update_id, Some(4));
    assert!(!decision.initial_refresh);
}

#[tokio::test]
async fn statement_arrives_on_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("stmt.sql");
    let service = ShellJobService::new(format!("cat > {}", out.display()));
    let job_id = service.submit(refresh_request()).await.unwrap();
    wait_terminal(&service, &job_id).await;

    let written = std::fs::read_to_string(out).unwrap();
    assert_eq!(written, "REFRESH REFLECTION 'rfl-1' AS 'mat-1'");
}

#[tokio::test]
async fn failing_command_reports_stderr() {
    let service = ShellJobService::new("cat > /dev/null; echo 'table locked' >&2; exit 3");
    let job_id = service.submit(refresh_request()).await.unwrap();

    let details = wait_terminal(&service, &job_id).await;
    assert_eq!(details.state(), JobState::Failed);
    assert_eq!(details.last_attempt.failure.as_deref(), Some("table locked"));
    assert!(details.last_attempt.decision.is_none());
}

#[tokio::test]
async fn cancel_stops_running_job() {
    let service = ShellJobService::new("sleep 30");
    let job_id = service.submit(refresh_request()).await.unwrap();
    assert!(!service.details(&job_id).await.unwrap().completed);

    service.cancel(&job_id, "definition changed").await.unwrap();
    let details = service.details(&job_id).await.unwrap();
    assert_eq!(details.state(), JobState::Canceled);
    assert_eq!(details.last_attempt.failure.as_deref(), Some("definition changed"));
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let service = ShellJobService::new("true");
    let missing = JobId::from_string("job-missing");
    assert!(matches!(service.details(&missing).await, Err(JobError::NotFound(_))));
    assert!(matches!(service.cancel(&missing, "x").await, Err(JobError::NotFound(_))));
}

#[tokio::test]
async fn fake_records_submit_and_cancel() {
    let fake = FakeJobService::new();
    let job_id = fake.submit(refresh_request()).await.unwrap();
    assert_eq!(job_id, "job-1");
    assert_eq!(fake.details(&job_id).await.unwrap().state(), JobState::Running);

    fake.cancel(&job_id, "goal disabled").await.unwrap();
    assert_eq!(fake.canceled(), vec![job_id.clone()]);
    assert_eq!(fake.details(&job_id).await.unwrap().state(), JobState::Canceled);

    fake.forget(&job_id);
    assert!(matches!(fake.details(&job_id).await, Err(JobError::NotFound(_))));
}

#[tokio::test]
async fn fake_submit_error() {
    let fake = FakeJobService::new();
    fake.set_submit_error(Some("queue full"));
    assert!(matches!(fake.submit(refresh_request()).await, Err(JobError::Submit(_))));
    assert!(fake.submitted().is_empty());
}

#[tokio::test]
async fn fake_unavailable_rejects_lookups() {
    let fake = FakeJobService::new();
    let job_id = fake.submit(refresh_request()).await.unwrap();
    fake.set_unavailable(Some("maintenance"));
    assert!(matches!(fake.details(&job_id).await, Err(JobError::Unavailable(_))));
    assert!(matches!(fake.cancel(&job_id, "stop").await, Err(JobError::Unavailable(_))));
    assert!(fake.canceled().is_empty());

    fake.set_unavailable(None);
    assert_eq!(fake.details(&job_id).await.unwrap().state(), JobState::Running);
}

#[yare::parameterized(
    empty       = { b"", true, None },
    not_json    = { b"ok\n", true, None },
    json        = { b"{\"update_id\":7}\n", false, Some(7) },
    trailing_ws = { b"{\"update_id\":2}\n\n  \n", false, Some(2) },
)]
fn decisions_from_stdout(stdout: &[u8], initial: bool, update_id: Option<u64>) {
    let decision = parse_decision(stdout);
    assert_eq!(decision.initial_refresh, initial);
    assert_eq!(decision.update_id, update_id);
}
