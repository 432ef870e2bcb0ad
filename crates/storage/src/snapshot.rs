// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for the in-memory stores.
//!
//! A snapshot is the complete [`StoreState`] as zstd-compressed JSON. The
//! previous file is rotated to `.bak` before the new one is moved in.

use crate::error::StoreError;
use crate::memory::StoreState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

/// The store state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    pub state: StoreState,
    /// When this snapshot was created
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(state: StoreState) -> Self {
        Self { version: CURRENT_SNAPSHOT_VERSION, state, created_at: Utc::now() }
    }
}

/// Write `snapshot` to `path` atomically, keeping rotated backups.
pub fn save_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    {
        let file = BufWriter::new(File::create(&tmp)?);
        let mut encoder = zstd::stream::Encoder::new(file, ZSTD_LEVEL)?;
        serde_json::to_writer(&mut encoder, snapshot)?;
        let mut file = encoder.finish()?;
        file.flush()?;
    }
    if path.exists() {
        fs::rename(path, rotate_bak_path(path))?;
    }
    fs::rename(&tmp, path)?;
    tracing::debug!(path = %path.display(), "snapshot saved");
    Ok(())
}

/// Load the snapshot at `path`, or `None` when there is none yet.
pub fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = BufReader::new(File::open(path)?);
    let decoder = zstd::stream::Decoder::new(file)?;
    let value: serde_json::Value = serde_json::from_reader(decoder)?;
    let version = value.get("v").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32;
    if version > CURRENT_SNAPSHOT_VERSION {
        return Err(StoreError::SnapshotVersion(version));
    }
    let snapshot: Snapshot = serde_json::from_value(value)?;
    tracing::info!(
        path = %path.display(),
        created_at = %snapshot.created_at,
        goals = snapshot.state.goals.len(),
        entries = snapshot.state.entries.len(),
        "snapshot loaded"
    );
    Ok(Some(snapshot))
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
