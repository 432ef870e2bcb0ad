// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! refl-storage: repositories for reflection goals, entries and materializations

mod error;
mod memory;
mod retry;
mod snapshot;
mod store;

pub use error::{Conflict, StoreError};
pub use memory::{MemoryStores, MemoryTable, Record, StoreState};
pub use retry::with_optimistic_retry;
pub use snapshot::{load_snapshot, save_snapshot, Snapshot, CURRENT_SNAPSHOT_VERSION};
pub use store::{
    DependencyStore, EntryStore, ExternalReflectionStore, GoalStore, MaterializationStore,
    RefreshRequestStore, RefreshStore, Stores,
};
