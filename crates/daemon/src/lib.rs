// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! refl-daemon: process host for the reflection manager
//!
//! Wires the shell job service, manifest catalog and filesystem namespace
//! into a [`refl_engine::WakeupService`] guarded by a state-directory lock.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod env;
pub mod lifecycle;
pub mod logging;

pub use config::{Config, DaemonSection};
pub use lifecycle::{
    spawn_snapshotter, startup, DaemonManager, DaemonState, LifecycleError, LockLeadership,
};
