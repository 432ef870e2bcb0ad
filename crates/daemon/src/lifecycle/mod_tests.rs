// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use refl_core::test_support::raw_goal;
use refl_engine::ManagerConfig;
use refl_storage::load_snapshot;
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> Config {
    let state_dir = dir.path().to_path_buf();
    Config {
        manager: ManagerConfig::default(),
        lock_path: state_dir.join("refld.pid"),
        log_dir: state_dir.join("logs"),
        snapshot_path: state_dir.join("snapshot.json.zst"),
        catalog_manifest: state_dir.join("catalog.toml"),
        tables_path: state_dir.join("tables"),
        sql_command: "cat > /dev/null".to_string(),
        sync_interval: Duration::from_secs(10),
        snapshot_interval: Duration::from_secs(60),
        state_dir,
    }
}

#[test]
fn startup_takes_lock_and_writes_pid() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let daemon = startup(&config).unwrap();

    let pid = std::fs::read_to_string(&config.lock_path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
    assert!(config.tables_path.is_dir());
    assert!(daemon.stores.goals.is_empty());
}

#[test]
fn second_daemon_cannot_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let _first = startup(&config).unwrap();

    assert!(matches!(startup(&config), Err(LifecycleError::LockFailed(_))));
}

#[test]
fn shutdown_snapshot_restores_on_next_start() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);

    let daemon = startup(&config).unwrap();
    daemon.stores.goals.put(raw_goal("rfl-1", "dst-1")).unwrap();
    daemon.shutdown().unwrap();
    assert!(!config.lock_path.exists());

    let snapshot = load_snapshot(&config.snapshot_path).unwrap().unwrap();
    assert_eq!(snapshot.state.goals.len(), 1);

    let restarted = startup(&config).unwrap();
    let goal = restarted.stores.goals.fetch(&"rfl-1".into()).unwrap();
    assert_eq!(goal.dataset_id, "dst-1");
}

#[test]
fn leadership_follows_lock_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let daemon = startup(&config).unwrap();
    let leadership = daemon.leadership();

    assert!(leadership.is_leader());
    std::fs::remove_file(&config.lock_path).unwrap();
    assert!(!leadership.is_leader());
}

#[tokio::test]
async fn snapshotter_writes_periodically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json.zst");
    let stores = MemoryStores::new();
    stores.goals.put(raw_goal("rfl-1", "dst-1")).unwrap();
    let cancel = CancellationToken::new();

    let task = spawn_snapshotter(stores, path.clone(), Duration::from_millis(20), cancel.clone());
    for _ in 0..100 {
        if path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
    task.await.unwrap();

    let snapshot = load_snapshot(&path).unwrap().unwrap();
    assert_eq!(snapshot.state.goals.len(), 1);
}

#[tokio::test]
async fn manager_runs_over_restored_state() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    std::fs::write(
        &config.catalog_manifest,
        "[[dataset]]\nid = \"dst-1\"\npath = [\"space\", \"orders\"]\nsnapshot = \"s1\"\n",
    )
    .unwrap();
    let daemon = startup(&config).unwrap();
    daemon.stores.goals.put(raw_goal("rfl-1", "dst-1")).unwrap();

    daemon.manager.lock().await.run().await;

    let entry = daemon.stores.entries.fetch(&"rfl-1".into()).unwrap();
    assert_eq!(entry.dataset_id, "dst-1");
}
