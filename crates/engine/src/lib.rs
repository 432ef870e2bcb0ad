// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! refl-engine: the reflection reconciliation loop, its dependency graph and job handling

pub mod admin;
pub mod cache;
pub mod config;
pub mod dependency;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod manager;
pub mod service;

#[cfg(any(test, feature = "test-support"))]
pub mod test_helpers;

pub use admin::{GoalUpdate, NewGoal, ReflectionAdmin, StatusSummary};
pub use cache::{CachedMaterialization, MaterializationCache};
pub use config::{ConfigError, ManagerConfig};
pub use dependency::{DependencyError, DependencyManager, DependencyResolutionContext, Lineage};
pub use error::{AdminError, ManagerError};
pub use executor::{ExecuteError, Executor};
pub use handlers::{HandlerContext, RefreshDoneHandler, RefreshStartHandler};
pub use manager::{ManagerDeps, ReflectionManager};
pub use service::{AlwaysLeader, Leadership, WakeupError, WakeupHandle, WakeupService};
