// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::dependency::DependencyError;
use crate::executor::ExecuteError;
use refl_adapters::{CatalogError, JobError, NamespaceError};
use refl_storage::{Conflict, StoreError};
use thiserror::Error;

/// Errors from one unit of reconciliation work.
///
/// Never escapes a pass: each is logged against the entity it concerns.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("effect error: {0}")]
    Execute(#[from] ExecuteError),
    #[error("job error: {0}")]
    Job(#[from] JobError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("namespace error: {0}")]
    Namespace(#[from] NamespaceError),
    #[error("dependency error: {0}")]
    Dependency(#[from] DependencyError),
}

impl Conflict for ManagerError {
    fn is_conflict(&self) -> bool {
        matches!(self, ManagerError::Store(e) if e.is_conflict())
    }
}

/// Errors returned by the administration API
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: String },
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl Conflict for AdminError {
    fn is_conflict(&self) -> bool {
        matches!(self, AdminError::Store(e) if e.is_conflict())
    }
}
