//! Mock tasks for testing.

use crate::core::Payload;
use crate::service::{ServiceContext, Task};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Shared log of the inputs a mock task was invoked with.
pub type CallLog = Arc<Mutex<Vec<Payload>>>;

#[derive(Debug, Clone)]
enum Outcome {
    Return(Payload),
    Echo,
    Fail(String),
}

/// A configurable task that records its inputs.
///
/// By default it returns an empty payload immediately. Clone the
/// [`CallLog`] before registering to inspect the calls afterwards.
#[derive(Debug)]
pub struct MockTask {
    name: String,
    outcome: Outcome,
    delay: Option<Duration>,
    calls: CallLog,
}

impl MockTask {
    /// Creates a mock task returning an empty payload.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Return(Payload::new()),
            delay: None,
            calls: CallLog::default(),
        }
    }

    /// Returns `result` on every call.
    #[must_use]
    pub fn returning(mut self, result: Payload) -> Self {
        self.outcome = Outcome::Return(result);
        self
    }

    /// Returns the inputs unchanged.
    #[must_use]
    pub fn echoing(mut self) -> Self {
        self.outcome = Outcome::Echo;
        self
    }

    /// Fails with `message` on every call.
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.outcome = Outcome::Fail(message.into());
        self
    }

    /// Sleeps for `delay` before producing the outcome.
    #[must_use]
    pub fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the shared call log.
    #[must_use]
    pub fn call_log(&self) -> CallLog {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Task for MockTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn payload(&self, _ctx: &ServiceContext, inputs: Payload) -> anyhow::Result<Payload> {
        self.calls.lock().push(inputs.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Outcome::Return(result) => Ok(result.clone()),
            Outcome::Echo => Ok(inputs),
            Outcome::Fail(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}

/// Builds a payload from a JSON value.
///
/// Objects are used as-is; any other value is wrapped under `"value"`.
#[must_use]
pub fn payload(value: serde_json::Value) -> Payload {
    match value {
        serde_json::Value::Object(map) => map,
        other => {
            let mut map = Payload::new();
            map.insert("value".to_string(), other);
            map
        }
    }
}
