//! Reflection lifecycle scenarios

mod cleanup;
mod failures;
mod goals;
mod service;
