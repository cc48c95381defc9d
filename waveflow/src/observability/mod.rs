//! Observability utilities: subscriber setup and span timing.
//!
//! The log filter is read from the `WAVEFLOW_LOG` environment variable using
//! the `tracing-subscriber` directive syntax (e.g. `waveflow=debug`), and
//! defaults to `info`.

use crate::errors::FlowError;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "WAVEFLOW_LOG";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a global fmt subscriber, returning an error if one is already set.
pub fn try_init_tracing() -> Result<(), FlowError> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .try_init()
        .map_err(|err| FlowError::Internal(format!("failed to install subscriber: {err}")))
}

/// Installs a global subscriber emitting JSON lines.
pub fn try_init_json_tracing() -> Result<(), FlowError> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(env_filter())
        .try_init()
        .map_err(|err| FlowError::Internal(format!("failed to install subscriber: {err}")))
}

/// Installs a global fmt subscriber.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let _ = try_init_tracing();
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finishes the span and returns the duration in milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
