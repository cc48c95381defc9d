//! # Waveflow
//!
//! A small asynchronous workflow engine.
//!
//! Callers register named services into a [`Pipeline`](pipeline::Pipeline),
//! declare which services consume the output of which others, and run the
//! resulting dependency graph in waves:
//!
//! - **Wave scheduling**: every round runs, concurrently, all services whose
//!   upstreams have settled
//! - **Result projection**: dotted key paths pull nested values out of upstream
//!   results into downstream inputs
//! - **Failure isolation**: per-service timeout and `allow_failure` policy
//! - **Lifecycle observers**: ten hook points for persistence and metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use waveflow::prelude::*;
//!
//! let mut pipeline = Pipeline::create("etl", Config::new(), vec![]).await?;
//! pipeline
//!     .register(Fetch).await?
//!     .register_with(Transform, ServiceOptions::new().depends_on::<Fetch>("rows")).await?;
//!
//! let summary = pipeline.run().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod observability;
pub mod observers;
pub mod pipeline;
pub mod service;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{load_config, merge_config, parse_config, Config, ServiceSettings};
    pub use crate::core::{Payload, PipelineStatus, ServiceStatus};
    pub use crate::errors::{
        ConfigurationError, FlowError, InvalidStateError, KeyLookupError,
    };
    pub use crate::observers::{
        LifecycleEvent, LoggingObserver, MemoryStore, Observer, ObserverDispatcher,
        RecordingObserver,
    };
    pub use crate::pipeline::{
        DependencyGraph, KeyPaths, Pipeline, PipelineInfo, RunSummary, ServiceOptions, TaskRef,
        WaveScheduler,
    };
    pub use crate::service::{FnTask, Service, ServiceContext, Task};
}
