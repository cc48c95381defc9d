//! Pipeline registration, scheduling and execution.
//!
//! This module provides:
//! - [`Pipeline`]: registration of services and the run driver
//! - [`DependencyGraph`] and result projection along dotted key paths
//! - [`WaveScheduler`]: breadth-first batching by dependency depth

mod driver;
mod graph;
mod info;
mod options;
mod scheduler;

#[cfg(test)]
mod integration_tests;

pub use driver::{Pipeline, RunSummary};
pub use graph::{
    resolve_path, Dependency, DependencyGraph, KeyPaths, TaskRef, SERVICE_NAME_KEY,
    SERVICE_NUMBER_KEY,
};
pub use info::PipelineInfo;
pub use options::ServiceOptions;
pub use scheduler::{ScheduledService, Wave, WaveScheduler};
