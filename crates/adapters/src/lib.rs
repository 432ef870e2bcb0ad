// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! refl-adapters: job service, catalog and namespace collaborators

pub mod catalog;
pub mod jobs;
pub mod namespace;

pub use catalog::{Catalog, CatalogError, ManifestCatalog, Table};
pub use jobs::{JobError, JobService, ShellJobService};
pub use namespace::{FsNamespace, NamespaceError, NamespaceService};

#[cfg(any(test, feature = "test-support"))]
pub use catalog::FakeCatalog;
#[cfg(any(test, feature = "test-support"))]
pub use jobs::{FakeJobService, JobCall};
#[cfg(any(test, feature = "test-support"))]
pub use namespace::FakeNamespace;
