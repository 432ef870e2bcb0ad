// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Namespace adapter: the reflection folders under the accelerator root.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from namespace operations
#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("invalid folder path: {0}")]
    InvalidPath(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Adapter for folder bookkeeping
#[async_trait]
pub trait NamespaceService: Clone + Send + Sync + 'static {
    async fn exists(&self, path: &[String]) -> Result<bool, NamespaceError>;

    /// Delete a folder and everything in it. Deleting a missing folder succeeds.
    async fn delete_folder(&self, path: &[String]) -> Result<(), NamespaceError>;
}

/// Folders as directories under a root.
#[derive(Clone)]
pub struct FsNamespace {
    root: PathBuf,
}

impl FsNamespace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &[String]) -> Result<PathBuf, NamespaceError> {
        if path.is_empty() {
            return Err(NamespaceError::InvalidPath(String::new()));
        }
        let mut dir = self.root.clone();
        for part in path {
            if part.is_empty() || part == "." || part == ".." || part.contains('/') {
                return Err(NamespaceError::InvalidPath(path.join(".")));
            }
            dir.push(part);
        }
        Ok(dir)
    }
}

#[async_trait]
impl NamespaceService for FsNamespace {
    async fn exists(&self, path: &[String]) -> Result<bool, NamespaceError> {
        Ok(tokio::fs::try_exists(self.resolve(path)?).await?)
    }

    async fn delete_folder(&self, path: &[String]) -> Result<(), NamespaceError> {
        let dir = self.resolve(path)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::info!(path = %dir.display(), "folder deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{NamespaceError, NamespaceService};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeNamespaceState {
        folders: HashSet<Vec<String>>,
        deleted: Vec<Vec<String>>,
    }

    /// Fake namespace for testing
    #[derive(Clone, Default)]
    pub struct FakeNamespace {
        inner: Arc<Mutex<FakeNamespaceState>>,
    }

    impl FakeNamespace {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_folder(&self, path: &[&str]) {
            self.inner.lock().folders.insert(path.iter().map(|s| s.to_string()).collect());
        }

        /// Folders deleted so far, in order
        pub fn deleted(&self) -> Vec<Vec<String>> {
            self.inner.lock().deleted.clone()
        }
    }

    #[async_trait]
    impl NamespaceService for FakeNamespace {
        async fn exists(&self, path: &[String]) -> Result<bool, NamespaceError> {
            Ok(self.inner.lock().folders.contains(path))
        }

        async fn delete_folder(&self, path: &[String]) -> Result<(), NamespaceError> {
            let mut inner = self.inner.lock();
            inner.folders.remove(path);
            inner.deleted.push(path.to_vec());
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeNamespace;
