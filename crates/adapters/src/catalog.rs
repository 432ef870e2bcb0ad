// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog adapter: dataset resolution, refresh settings and table registration.

use async_trait::async_trait;
use parking_lot::Mutex;
use refl_core::{DatasetId, RefreshSettings};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors from catalog operations
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("invalid manifest {path}: {message}")]
    Manifest { path: String, message: String },
    #[error("dataset {} not found", .0.join("."))]
    PathNotFound(Vec<String>),
}

/// A resolved dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub dataset_id: DatasetId,
    pub path: Vec<String>,
    /// Current data version; changes whenever the table is written.
    pub snapshot: Option<String>,
    pub settings: RefreshSettings,
}

/// Adapter for the catalog/metadata layer
#[async_trait]
pub trait Catalog: Clone + Send + Sync + 'static {
    /// Resolve a dataset. `Ok(None)` means it no longer exists.
    async fn get_table(&self, dataset_id: &DatasetId) -> Result<Option<Table>, CatalogError>;

    /// Register a materialization's table.
    async fn create_dataset(&self, path: &[String]) -> Result<(), CatalogError>;

    async fn add_primary_key(&self, path: &[String], keys: &[String]) -> Result<(), CatalogError>;

    /// Refresh policy of a dataset; defaults when the dataset is unknown.
    async fn refresh_settings(&self, dataset_id: &DatasetId) -> Result<RefreshSettings, CatalogError> {
        Ok(self.get_table(dataset_id).await?.map(|t| t.settings).unwrap_or_default())
    }
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default, rename = "dataset")]
    datasets: Vec<ManifestDataset>,
}

#[derive(Debug, Deserialize)]
struct ManifestDataset {
    id: DatasetId,
    path: Vec<String>,
    #[serde(default)]
    snapshot: Option<String>,
    #[serde(default)]
    refresh: RefreshSettings,
}

/// Catalog read from a TOML manifest of `[[dataset]]` tables.
///
/// The manifest is re-read on every lookup so edits (a new `snapshot`, a
/// removed dataset) are seen by the next pass. Registered materialization
/// tables live in memory.
#[derive(Clone)]
pub struct ManifestCatalog {
    path: PathBuf,
    registered: Arc<Mutex<HashMap<Vec<String>, Vec<String>>>>,
}

impl ManifestCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), registered: Arc::new(Mutex::new(HashMap::new())) }
    }

    async fn manifest(&self) -> Result<Manifest, CatalogError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Manifest::default()),
            Err(e) => return Err(CatalogError::Unavailable(e.to_string())),
        };
        toml::from_str(&text).map_err(|e| CatalogError::Manifest {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Primary key registered for a materialization table, if any.
    pub fn registered(&self, path: &[String]) -> Option<Vec<String>> {
        self.registered.lock().get(path).cloned()
    }
}

#[async_trait]
impl Catalog for ManifestCatalog {
    async fn get_table(&self, dataset_id: &DatasetId) -> Result<Option<Table>, CatalogError> {
        let manifest = self.manifest().await?;
        Ok(manifest.datasets.into_iter().find(|d| &d.id == dataset_id).map(|d| Table {
            dataset_id: d.id,
            path: d.path,
            snapshot: d.snapshot,
            settings: d.refresh,
        }))
    }

    async fn create_dataset(&self, path: &[String]) -> Result<(), CatalogError> {
        self.registered.lock().entry(path.to_vec()).or_default();
        tracing::debug!(path = %path.join("."), "materialization table registered");
        Ok(())
    }

    async fn add_primary_key(&self, path: &[String], keys: &[String]) -> Result<(), CatalogError> {
        let mut registered = self.registered.lock();
        let entry = registered.get_mut(path).ok_or_else(|| CatalogError::PathNotFound(path.to_vec()))?;
        *entry = keys.to_vec();
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{Catalog, CatalogError, Table};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use refl_core::{DatasetId, RefreshSettings};
    use std::collections::HashMap;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeCatalogState {
        tables: HashMap<DatasetId, Table>,
        registered: HashMap<Vec<String>, Vec<String>>,
        unavailable: bool,
    }

    /// Fake catalog for testing
    #[derive(Clone, Default)]
    pub struct FakeCatalog {
        inner: Arc<Mutex<FakeCatalogState>>,
    }

    impl FakeCatalog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add or replace a dataset with default settings
        pub fn add_dataset(&self, dataset_id: &str, snapshot: Option<&str>) {
            self.add_dataset_with(dataset_id, snapshot, RefreshSettings::default());
        }

        pub fn add_dataset_with(
            &self,
            dataset_id: &str,
            snapshot: Option<&str>,
            settings: RefreshSettings,
        ) {
            let id = DatasetId::from_string(dataset_id);
            let table = Table {
                dataset_id: id.clone(),
                path: vec!["space".to_string(), dataset_id.to_string()],
                snapshot: snapshot.map(String::from),
                settings,
            };
            self.inner.lock().tables.insert(id, table);
        }

        /// Write to a dataset: bump its snapshot
        pub fn set_snapshot(&self, dataset_id: &str, snapshot: &str) {
            if let Some(t) = self.inner.lock().tables.get_mut(&DatasetId::from_string(dataset_id)) {
                t.snapshot = Some(snapshot.to_string());
            }
        }

        pub fn remove_dataset(&self, dataset_id: &str) {
            self.inner.lock().tables.remove(&DatasetId::from_string(dataset_id));
        }

        /// Fail every call until cleared
        pub fn set_unavailable(&self, unavailable: bool) {
            self.inner.lock().unavailable = unavailable;
        }

        /// Registered materialization tables and their primary keys
        pub fn registered(&self) -> HashMap<Vec<String>, Vec<String>> {
            self.inner.lock().registered.clone()
        }
    }

    #[async_trait]
    impl Catalog for FakeCatalog {
        async fn get_table(&self, dataset_id: &DatasetId) -> Result<Option<Table>, CatalogError> {
            let inner = self.inner.lock();
            if inner.unavailable {
                return Err(CatalogError::Unavailable("fake catalog down".to_string()));
            }
            Ok(inner.tables.get(dataset_id).cloned())
        }

        async fn create_dataset(&self, path: &[String]) -> Result<(), CatalogError> {
            self.inner.lock().registered.entry(path.to_vec()).or_default();
            Ok(())
        }

        async fn add_primary_key(
            &self,
            path: &[String],
            keys: &[String],
        ) -> Result<(), CatalogError> {
            self.inner.lock().registered.insert(path.to_vec(), keys.to_vec());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeCatalog;

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
