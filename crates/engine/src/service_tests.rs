// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{setup, TestManager};
use std::sync::atomic::{AtomicBool, Ordering};

const HOUR: Duration = Duration::from_secs(3600);

struct Switch(Arc<AtomicBool>);

impl Leadership for Switch {
    fn is_leader(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn shared() -> Arc<Mutex<TestManager>> {
    Arc::new(Mutex::new(setup().manager))
}

#[tokio::test]
async fn wakeup_runs_a_pass() {
    let manager = shared();
    let cancel = CancellationToken::new();
    let (service, handle) = WakeupService::new(Arc::clone(&manager), AlwaysLeader, HOUR, cancel.clone());
    let task = tokio::spawn(service.run());

    let done = handle.wakeup("test").await.unwrap();
    done.await.unwrap();
    assert_eq!(manager.lock().await.passes(), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn queued_wakeups_share_one_pass() {
    let manager = shared();
    let cancel = CancellationToken::new();
    let (service, handle) = WakeupService::new(Arc::clone(&manager), AlwaysLeader, HOUR, cancel.clone());

    let first = handle.wakeup("a").await.unwrap();
    let second = handle.wakeup("b").await.unwrap();
    handle.nudge("c").unwrap();
    let task = tokio::spawn(service.run());

    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(manager.lock().await.passes(), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn follower_skips_passes_but_completes_wakeups() {
    let manager = shared();
    let leader = Arc::new(AtomicBool::new(false));
    let cancel = CancellationToken::new();
    let (service, handle) =
        WakeupService::new(Arc::clone(&manager), Switch(Arc::clone(&leader)), HOUR, cancel.clone());
    let task = tokio::spawn(service.run());

    handle.wakeup("follower").await.unwrap().await.unwrap();
    assert_eq!(manager.lock().await.passes(), 0);

    leader.store(true, Ordering::SeqCst);
    handle.wakeup("leader").await.unwrap().await.unwrap();
    assert_eq!(manager.lock().await.passes(), 1);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn interval_drives_passes() {
    let manager = shared();
    let cancel = CancellationToken::new();
    let (service, _handle) =
        WakeupService::new(Arc::clone(&manager), AlwaysLeader, Duration::from_secs(10), cancel.clone());
    let task = tokio::spawn(service.run());

    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(manager.lock().await.passes(), 2);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test]
async fn stopped_service_rejects_wakeups() {
    let cancel = CancellationToken::new();
    let (service, handle) = WakeupService::new(shared(), AlwaysLeader, HOUR, cancel.clone());
    cancel.cancel();
    service.run().await;

    assert!(matches!(handle.wakeup("late").await, Err(WakeupError::Stopped)));
    assert!(matches!(handle.nudge("late"), Err(WakeupError::Stopped)));
}
