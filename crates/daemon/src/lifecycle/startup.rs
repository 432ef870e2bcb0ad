// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and initialization logic.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use refl_adapters::{FsNamespace, ManifestCatalog, ShellJobService};
use refl_core::SystemClock;
use refl_engine::{ManagerDeps, ReflectionManager};
use refl_storage::{load_snapshot, MemoryStores};
use tokio::sync::Mutex;
use tracing::info;

use super::{DaemonState, LifecycleError, LockFile};
use crate::config::Config;

/// Take the state-directory lock, restore the last snapshot and build the
/// manager over it.
pub fn startup(config: &Config) -> Result<DaemonState, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    // Open without truncating: the PID belongs to the running daemon until we
    // hold the lock.
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.lock_path)?;
    file.try_lock_exclusive().map_err(LifecycleError::LockFailed)?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    let lock = Arc::new(LockFile { path: config.lock_path.clone(), file });

    std::fs::create_dir_all(&config.tables_path)?;

    let stores = MemoryStores::new();
    match load_snapshot(&config.snapshot_path)? {
        Some(snapshot) => stores.restore(snapshot.state),
        None => info!("no snapshot found, starting with empty state"),
    }

    let manager = ReflectionManager::new(
        config.manager.clone(),
        ManagerDeps {
            jobs: ShellJobService::new(config.sql_command.clone()),
            catalog: ManifestCatalog::new(config.catalog_manifest.clone()),
            namespace: FsNamespace::new(config.tables_path.clone()),
            stores: stores.stores(),
        },
        SystemClock,
    );
    info!(
        state_dir = %config.state_dir.display(),
        manifest = %config.catalog_manifest.display(),
        "daemon started"
    );

    Ok(DaemonState {
        config: config.clone(),
        stores,
        manager: Arc::new(Mutex::new(manager)),
        start_time: Instant::now(),
        lock,
    })
}
