// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wakeup service: runs a reconciliation pass on a fixed interval and on demand.

use crate::manager::ReflectionManager;
use refl_adapters::{Catalog, JobService, NamespaceService};
use refl_core::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Queued wakeups beyond this are coalesced by the sender side failing fast.
const WAKEUP_QUEUE: usize = 64;

/// Longest gap between scheduled passes.
const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Error)]
pub enum WakeupError {
    #[error("wakeup service stopped")]
    Stopped,
}

/// Whether this process may run passes.
///
/// Passes mutate shared stores and submit jobs, so only one process at a
/// time may run them.
pub trait Leadership: Send + Sync + 'static {
    fn is_leader(&self) -> bool;
}

/// Single-process deployments
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysLeader;

impl Leadership for AlwaysLeader {
    fn is_leader(&self) -> bool {
        true
    }
}

struct WakeupRequest {
    reason: String,
    done: Option<oneshot::Sender<()>>,
}

/// Cloneable handle for requesting an early pass.
#[derive(Clone)]
pub struct WakeupHandle {
    tx: mpsc::Sender<WakeupRequest>,
}

impl WakeupHandle {
    /// Request a pass. The returned receiver resolves once a pass that
    /// started after this request has finished (or was skipped because this
    /// process is not the leader).
    pub async fn wakeup(
        &self,
        reason: impl Into<String>,
    ) -> Result<oneshot::Receiver<()>, WakeupError> {
        let (done, rx) = oneshot::channel();
        let request = WakeupRequest { reason: reason.into(), done: Some(done) };
        self.tx.send(request).await.map_err(|_| WakeupError::Stopped)?;
        Ok(rx)
    }

    /// Fire-and-forget request. A full queue already guarantees a pass, so
    /// that case is not an error.
    pub fn nudge(&self, reason: impl Into<String>) -> Result<(), WakeupError> {
        match self.tx.try_send(WakeupRequest { reason: reason.into(), done: None }) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(WakeupError::Stopped),
        }
    }
}

/// Drives a shared [`ReflectionManager`] until cancelled.
pub struct WakeupService<J, C, N, K: Clock, L> {
    manager: Arc<Mutex<ReflectionManager<J, C, N, K>>>,
    leadership: L,
    interval: Duration,
    rx: mpsc::Receiver<WakeupRequest>,
    cancel: CancellationToken,
}

impl<J, C, N, K, L> WakeupService<J, C, N, K, L>
where
    J: JobService,
    C: Catalog,
    N: NamespaceService,
    K: Clock,
    L: Leadership,
{
    pub fn new(
        manager: Arc<Mutex<ReflectionManager<J, C, N, K>>>,
        leadership: L,
        interval: Duration,
        cancel: CancellationToken,
    ) -> (Self, WakeupHandle) {
        let (tx, rx) = mpsc::channel(WAKEUP_QUEUE);
        let service = Self { manager, leadership, interval, rx, cancel };
        (service, WakeupHandle { tx })
    }

    /// Run until the cancellation token fires. The first scheduled pass is
    /// one interval after start; wakeups run immediately.
    pub async fn run(mut self) {
        let period = self.interval.clamp(Duration::from_millis(1), MAX_INTERVAL);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut listening = true;
        tracing::info!(interval_ms = period.as_millis() as u64, "wakeup service started");

        loop {
            let mut waiters = Vec::new();
            let reason = tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => "scheduled".to_string(),
                request = self.rx.recv(), if listening => match request {
                    Some(request) => {
                        waiters.extend(request.done);
                        request.reason
                    }
                    None => {
                        listening = false;
                        continue;
                    }
                },
            };

            let mut coalesced = 0usize;
            while let Ok(request) = self.rx.try_recv() {
                waiters.extend(request.done);
                coalesced += 1;
            }

            self.pass(&reason, coalesced).await;
            for done in waiters {
                let _ = done.send(());
            }
        }

        self.rx.close();
        tracing::info!("wakeup service stopped");
    }

    async fn pass(&self, reason: &str, coalesced: usize) {
        if !self.leadership.is_leader() {
            tracing::debug!(reason, "not leader, skipping pass");
            return;
        }
        tracing::debug!(reason, coalesced, "wakeup");
        self.manager.lock().await.run().await;
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
