// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job submission and job outcome handling for reflection entries.

mod refresh_done;
mod refresh_start;

pub use refresh_done::RefreshDoneHandler;
pub use refresh_start::RefreshStartHandler;

use crate::config::ManagerConfig;
use crate::dependency::DependencyManager;
use crate::executor::Executor;
use refl_storage::Stores;

/// Borrowed collaborators shared by both handlers for one pass.
pub struct HandlerContext<'a, J, C, N> {
    pub config: &'a ManagerConfig,
    pub stores: &'a Stores,
    pub executor: &'a Executor<J, C, N>,
    pub deps: &'a DependencyManager,
}

impl<J, C, N> Clone for HandlerContext<'_, J, C, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<J, C, N> Copy for HandlerContext<'_, J, C, N> {}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
