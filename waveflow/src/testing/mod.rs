//! Testing utilities for waveflow pipelines.
//!
//! This module provides a configurable [`MockTask`] and a [`payload`] helper
//! for building payloads from `json!` literals. Pair it with
//! [`RecordingObserver`](crate::observers::RecordingObserver) to assert on
//! lifecycle events.

mod mocks;

pub use mocks::{payload, CallLog, MockTask};
