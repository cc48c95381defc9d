//! Core domain model types for waveflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Service and pipeline status enums
//! - The payload mapping passed into and out of tasks

mod status;

pub use status::{PipelineStatus, ServiceStatus};

/// Input and result mapping of a task.
pub type Payload = serde_json::Map<String, serde_json::Value>;
