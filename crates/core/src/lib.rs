// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! refl-core: value objects and the entry state machine of the reflection manager

pub mod macros;

pub mod clock;
pub mod dependency;
pub mod effect;
pub mod entry;
pub mod external;
pub mod goal;
pub mod id;
pub mod job;
pub mod materialization;
pub mod refresh;
pub mod settings;
pub mod transition;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use dependency::{DependencyEntry, MaterializationInfo, ReflectionDependencies};
pub use effect::Effect;
pub use entry::{Failure, ReflectionEntry, ReflectionState};
#[cfg(any(test, feature = "test-support"))]
pub use entry::ReflectionEntryBuilder;
pub use external::ExternalReflection;
pub use goal::{
    GoalState, PartitionDistribution, ReflectionDetails, ReflectionGoal, ReflectionType,
};
#[cfg(any(test, feature = "test-support"))]
pub use goal::ReflectionGoalBuilder;
pub use id::{
    short, DatasetId, ExternalReflectionId, JobId, MaterializationId, RefreshId, ReflectionId,
};
pub use job::{JobAttempt, JobDetails, JobKind, JobRequest, JobState, RefreshDecision};
pub use materialization::{
    Materialization, MaterializationKind, MaterializationState, NewMaterialization,
};
#[cfg(any(test, feature = "test-support"))]
pub use materialization::MaterializationBuilder;
pub use refresh::{uncompacted_since_last_compaction, Refresh, RefreshMetrics, RefreshRequest};
#[cfg(any(test, feature = "test-support"))]
pub use refresh::RefreshBuilder;
pub use settings::{RefreshMethod, RefreshSettings};
pub use transition::{Action, Observation, Step};
