// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: startup, snapshots, shutdown.

mod startup;
pub use startup::startup;

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use refl_adapters::{FsNamespace, ManifestCatalog, ShellJobService};
use refl_core::SystemClock;
use refl_engine::{ConfigError, Leadership, ReflectionManager};
use refl_storage::{save_snapshot, MemoryStores, Snapshot, StoreError};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Config;

/// Manager with concrete adapter types
pub type DaemonManager = ReflectionManager<ShellJobService, ManifestCatalog, FsNamespace, SystemClock>;

/// Daemon state during operation.
pub struct DaemonState {
    pub config: Config,
    /// Tables backing the manager, shared for snapshots
    pub stores: MemoryStores,
    pub manager: Arc<Mutex<DaemonManager>>,
    pub start_time: Instant,
    lock: Arc<LockFile>,
}

impl DaemonState {
    /// Leadership backed by the state-directory lock.
    pub fn leadership(&self) -> LockLeadership {
        LockLeadership { lock: Arc::clone(&self.lock) }
    }

    /// Write the current store contents to the snapshot file.
    pub fn save_snapshot(&self) -> Result<(), LifecycleError> {
        write_snapshot(&self.stores, &self.config.snapshot_path)
    }

    /// Save a final snapshot and release the lock.
    pub fn shutdown(self) -> Result<(), LifecycleError> {
        info!(uptime_secs = self.start_time.elapsed().as_secs(), "shutting down daemon");
        let saved = self.save_snapshot();
        if self.config.lock_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.lock_path) {
                warn!(error = %e, "failed to remove PID file");
            }
        }
        // Lock is released when the last handle to the file is dropped
        drop(self.lock);
        saved?;
        info!("daemon shutdown complete");
        Ok(())
    }
}

fn write_snapshot(stores: &MemoryStores, path: &Path) -> Result<(), LifecycleError> {
    let snapshot = Snapshot::new(stores.state());
    save_snapshot(path, &snapshot)?;
    Ok(())
}

/// Exclusive lock on the state directory
struct LockFile {
    path: PathBuf,
    // NOTE(lifetime): held to keep the exclusive lock; released on drop
    #[allow(dead_code)]
    file: File,
}

/// Leader while the lock file this daemon created is still in place.
#[derive(Clone)]
pub struct LockLeadership {
    lock: Arc<LockFile>,
}

impl Leadership for LockLeadership {
    fn is_leader(&self) -> bool {
        self.lock.path.exists()
    }
}

/// Periodically write snapshots until `cancel` fires.
pub fn spawn_snapshotter(
    stores: MemoryStores,
    path: PathBuf,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let stores = stores.clone();
            let path = path.clone();
            match tokio::task::spawn_blocking(move || write_snapshot(&stores, &path)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "periodic snapshot failed"),
                Err(e) => warn!(error = %e, "snapshot task panicked"),
            }
        }
    })
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("Failed to read config {0}: {1}")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
