//! Observer that records lifecycle events for inspection.

use super::{LifecycleEvent, Observer};
use crate::core::Payload;
use crate::errors::FlowError;
use crate::pipeline::PipelineInfo;
use crate::service::Service;
use async_trait::async_trait;
use parking_lot::Mutex;

/// One recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedEvent {
    /// The lifecycle event.
    pub event: LifecycleEvent,
    /// Pipeline name for pipeline events, service name for service events.
    pub subject: String,
    /// The dispatched keyword payload.
    pub kwargs: Payload,
    /// The error message for failure events.
    pub error: Option<String>,
}

/// A collecting observer, mainly for tests.
///
/// Optionally returns an error on one chosen event, after recording it.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
    fail_on: Option<LifecycleEvent>,
}

impl RecordingObserver {
    /// Creates a new recording observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an observer that errors whenever `event` is dispatched.
    #[must_use]
    pub fn failing_on(event: LifecycleEvent) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail_on: Some(event),
        }
    }

    /// Returns all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<ObservedEvent> {
        self.events.lock().clone()
    }

    /// Returns the recorded events of one kind.
    #[must_use]
    pub fn events_of(&self, event: LifecycleEvent) -> Vec<ObservedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|observed| observed.event == event)
            .cloned()
            .collect()
    }

    /// Returns how many times `event` was recorded.
    #[must_use]
    pub fn count(&self, event: LifecycleEvent) -> usize {
        self.events.lock().iter().filter(|observed| observed.event == event).count()
    }

    /// Returns the recorded event sequence.
    #[must_use]
    pub fn sequence(&self) -> Vec<LifecycleEvent> {
        self.events.lock().iter().map(|observed| observed.event).collect()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Clears the recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn record(
        &self,
        event: LifecycleEvent,
        subject: &str,
        kwargs: &Payload,
        error: Option<&FlowError>,
    ) -> anyhow::Result<()> {
        self.events.lock().push(ObservedEvent {
            event,
            subject: subject.to_string(),
            kwargs: kwargs.clone(),
            error: error.map(ToString::to_string),
        });

        if self.fail_on == Some(event) {
            anyhow::bail!("observer rejected {event}");
        }
        Ok(())
    }
}

#[async_trait]
impl Observer for RecordingObserver {
    async fn pipeline_create(&self, pipeline: &PipelineInfo, kwargs: &Payload) -> anyhow::Result<()> {
        self.record(LifecycleEvent::PipelineCreate, pipeline.name(), kwargs, None)
    }

    async fn pipeline_start(&self, pipeline: &PipelineInfo, kwargs: &Payload) -> anyhow::Result<()> {
        self.record(LifecycleEvent::PipelineStart, pipeline.name(), kwargs, None)
    }

    async fn pipeline_message(&self, pipeline: &PipelineInfo, kwargs: &Payload) -> anyhow::Result<()> {
        self.record(LifecycleEvent::PipelineMessage, pipeline.name(), kwargs, None)
    }

    async fn pipeline_done(&self, pipeline: &PipelineInfo, kwargs: &Payload) -> anyhow::Result<()> {
        self.record(LifecycleEvent::PipelineDone, pipeline.name(), kwargs, None)
    }

    async fn pipeline_failed(
        &self,
        pipeline: &PipelineInfo,
        error: &FlowError,
        kwargs: &Payload,
    ) -> anyhow::Result<()> {
        self.record(LifecycleEvent::PipelineFailed, pipeline.name(), kwargs, Some(error))
    }

    async fn service_create(&self, service: &Service, kwargs: &Payload) -> anyhow::Result<()> {
        self.record(LifecycleEvent::ServiceCreate, service.name(), kwargs, None)
    }

    async fn service_start(&self, service: &Service, kwargs: &Payload) -> anyhow::Result<()> {
        self.record(LifecycleEvent::ServiceStart, service.name(), kwargs, None)
    }

    async fn service_message(&self, service: &Service, kwargs: &Payload) -> anyhow::Result<()> {
        self.record(LifecycleEvent::ServiceMessage, service.name(), kwargs, None)
    }

    async fn service_done(&self, service: &Service, kwargs: &Payload) -> anyhow::Result<()> {
        self.record(LifecycleEvent::ServiceDone, service.name(), kwargs, None)
    }

    async fn service_failed(
        &self,
        service: &Service,
        error: &FlowError,
        kwargs: &Payload,
    ) -> anyhow::Result<()> {
        self.record(LifecycleEvent::ServiceFailed, service.name(), kwargs, Some(error))
    }
}
