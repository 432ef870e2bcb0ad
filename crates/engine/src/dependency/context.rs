// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-pass view of the catalog shared by dependency computations.

use refl_adapters::{Catalog, Table};
use refl_core::{
    DatasetId, DependencyEntry, RefreshRequest, RefreshSettings, ReflectionEntry, ReflectionId,
};
use refl_storage::EntryStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Catalog lookups, refresh requests and settings, resolved once per pass.
///
/// A dataset is either resolved (`Some(table)`), known to be gone (`None`),
/// or unresolved when the catalog could not be reached. Settings of
/// unresolved datasets are unknown, not defaulted.
pub struct DependencyResolutionContext {
    pub now_ms: u64,
    tables: HashMap<DatasetId, Option<Table>>,
    unresolved: HashSet<DatasetId>,
    requests: HashMap<DatasetId, u64>,
    entries: Arc<dyn EntryStore>,
    settings_fingerprint: Option<String>,
    settings_changed: bool,
}

impl DependencyResolutionContext {
    pub fn new(now_ms: u64, entries: Arc<dyn EntryStore>) -> Self {
        Self {
            now_ms,
            tables: HashMap::new(),
            unresolved: HashSet::new(),
            requests: HashMap::new(),
            entries,
            settings_fingerprint: None,
            settings_changed: false,
        }
    }

    /// Resolve every dataset in `datasets` against the catalog.
    ///
    /// Lookups that fail are logged and left unresolved so that only the
    /// affected reflections are held back.
    pub async fn load<C: Catalog>(
        catalog: &C,
        datasets: impl IntoIterator<Item = DatasetId>,
        requests: Vec<RefreshRequest>,
        entries: Arc<dyn EntryStore>,
        previous_fingerprint: Option<&str>,
        now_ms: u64,
    ) -> Self {
        let mut ctx = Self::new(now_ms, entries);
        for dataset_id in datasets {
            if ctx.tables.contains_key(&dataset_id) {
                continue;
            }
            match catalog.get_table(&dataset_id).await {
                Ok(table) => {
                    ctx.tables.insert(dataset_id, table);
                }
                Err(e) => {
                    tracing::warn!(dataset_id = %dataset_id, error = %e, "dataset lookup failed");
                    ctx.unresolved.insert(dataset_id);
                }
            }
        }
        for request in requests {
            ctx.requests.insert(request.dataset_id, request.requested_at);
        }
        // A partial view of the catalog cannot say whether settings changed
        if ctx.unresolved.is_empty() {
            let fingerprint = ctx.fingerprint();
            ctx.settings_changed = previous_fingerprint.is_some_and(|prev| prev != fingerprint);
            ctx.settings_fingerprint = Some(fingerprint);
        }
        ctx
    }

    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.insert(table.dataset_id.clone(), Some(table));
        self
    }

    pub fn with_missing(mut self, dataset_id: impl Into<DatasetId>) -> Self {
        self.tables.insert(dataset_id.into(), None);
        self
    }

    pub fn with_unresolved(mut self, dataset_id: impl Into<DatasetId>) -> Self {
        let dataset_id = dataset_id.into();
        self.tables.remove(&dataset_id);
        self.unresolved.insert(dataset_id);
        self
    }

    pub fn with_request(mut self, dataset_id: impl Into<DatasetId>, requested_at: u64) -> Self {
        self.requests.insert(dataset_id.into(), requested_at);
        self
    }

    pub fn with_settings_changed(mut self, changed: bool) -> Self {
        self.settings_changed = changed;
        self
    }

    /// `Some(None)` when the catalog reported the dataset gone.
    pub fn table(&self, dataset_id: &DatasetId) -> Option<Option<&Table>> {
        self.tables.get(dataset_id).map(Option::as_ref)
    }

    pub fn is_missing(&self, dataset_id: &DatasetId) -> bool {
        matches!(self.tables.get(dataset_id), Some(None))
    }

    pub fn snapshot(&self, dataset_id: &DatasetId) -> Option<&str> {
        self.tables.get(dataset_id)?.as_ref()?.snapshot.as_deref()
    }

    pub fn requested_at(&self, dataset_id: &DatasetId) -> Option<u64> {
        self.requests.get(dataset_id).copied()
    }

    pub fn entry(&self, id: &ReflectionId) -> Option<ReflectionEntry> {
        self.entries.get(id)
    }

    pub fn settings_changed(&self) -> bool {
        self.settings_changed
    }

    /// `None` when some dataset could not be resolved this pass.
    pub fn settings_fingerprint(&self) -> Option<&str> {
        self.settings_fingerprint.as_deref()
    }

    pub fn is_unresolved(&self, dataset_id: &DatasetId) -> bool {
        self.unresolved.contains(dataset_id)
    }

    /// Settings of a reflection's anchor dataset merged with those of every
    /// dataset it reads, or `None` when any of them is unresolved.
    pub fn effective_settings(
        &self,
        dataset_id: &DatasetId,
        dependencies: &[DependencyEntry],
    ) -> Option<RefreshSettings> {
        let base = self.dataset_settings(dataset_id)?;
        dependencies
            .iter()
            .filter_map(DependencyEntry::as_dataset)
            .filter(|d| *d != dataset_id)
            .try_fold(base, |acc, d| Some(acc.merge(&self.dataset_settings(d)?)))
    }

    fn dataset_settings(&self, dataset_id: &DatasetId) -> Option<RefreshSettings> {
        if self.is_unresolved(dataset_id) {
            return None;
        }
        Some(
            self.tables
                .get(dataset_id)
                .and_then(Option::as_ref)
                .map(|t| t.settings.clone())
                .unwrap_or_default(),
        )
    }

    fn fingerprint(&self) -> String {
        let sorted: BTreeMap<&str, &RefreshSettings> = self
            .tables
            .iter()
            .filter_map(|(id, t)| t.as_ref().map(|t| (id.as_str(), &t.settings)))
            .collect();
        serde_json::to_string(&sorted).unwrap_or_default()
    }
}
