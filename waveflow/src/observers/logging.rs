//! Observer that logs lifecycle events through `tracing`.

use super::{LifecycleEvent, Observer};
use crate::core::Payload;
use crate::errors::FlowError;
use crate::pipeline::PipelineInfo;
use crate::service::Service;
use async_trait::async_trait;
use tracing::{debug, info, warn, Level};

/// An observer that logs every lifecycle event.
///
/// Failures are always logged at `WARN`; other events use the configured level.
#[derive(Debug, Clone)]
pub struct LoggingObserver {
    level: Level,
}

impl Default for LoggingObserver {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingObserver {
    /// Creates a new logging observer with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging observer.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging observer.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_pipeline(&self, event: LifecycleEvent, pipeline: &PipelineInfo, kwargs: &Payload) {
        if self.level == Level::DEBUG {
            debug!(event = %event, pipeline = %pipeline.name(), pipeline_id = %pipeline.id(), kwargs = ?kwargs, "Pipeline event");
        } else {
            info!(event = %event, pipeline = %pipeline.name(), pipeline_id = %pipeline.id(), kwargs = ?kwargs, "Pipeline event");
        }
    }

    fn log_service(&self, event: LifecycleEvent, service: &Service, kwargs: &Payload) {
        if self.level == Level::DEBUG {
            debug!(event = %event, service = %service.id(), status = %service.status(), kwargs = ?kwargs, "Service event");
        } else {
            info!(event = %event, service = %service.id(), status = %service.status(), kwargs = ?kwargs, "Service event");
        }
    }
}

#[async_trait]
impl Observer for LoggingObserver {
    async fn pipeline_create(&self, pipeline: &PipelineInfo, kwargs: &Payload) -> anyhow::Result<()> {
        self.log_pipeline(LifecycleEvent::PipelineCreate, pipeline, kwargs);
        Ok(())
    }

    async fn pipeline_start(&self, pipeline: &PipelineInfo, kwargs: &Payload) -> anyhow::Result<()> {
        self.log_pipeline(LifecycleEvent::PipelineStart, pipeline, kwargs);
        Ok(())
    }

    async fn pipeline_message(&self, pipeline: &PipelineInfo, kwargs: &Payload) -> anyhow::Result<()> {
        self.log_pipeline(LifecycleEvent::PipelineMessage, pipeline, kwargs);
        Ok(())
    }

    async fn pipeline_done(&self, pipeline: &PipelineInfo, kwargs: &Payload) -> anyhow::Result<()> {
        self.log_pipeline(LifecycleEvent::PipelineDone, pipeline, kwargs);
        Ok(())
    }

    async fn pipeline_failed(
        &self,
        pipeline: &PipelineInfo,
        error: &FlowError,
        kwargs: &Payload,
    ) -> anyhow::Result<()> {
        warn!(pipeline = %pipeline.name(), pipeline_id = %pipeline.id(), error = %error, kind = error.kind(), kwargs = ?kwargs, "Pipeline failed");
        Ok(())
    }

    async fn service_create(&self, service: &Service, kwargs: &Payload) -> anyhow::Result<()> {
        self.log_service(LifecycleEvent::ServiceCreate, service, kwargs);
        Ok(())
    }

    async fn service_start(&self, service: &Service, kwargs: &Payload) -> anyhow::Result<()> {
        self.log_service(LifecycleEvent::ServiceStart, service, kwargs);
        Ok(())
    }

    async fn service_message(&self, service: &Service, kwargs: &Payload) -> anyhow::Result<()> {
        self.log_service(LifecycleEvent::ServiceMessage, service, kwargs);
        Ok(())
    }

    async fn service_done(&self, service: &Service, kwargs: &Payload) -> anyhow::Result<()> {
        self.log_service(LifecycleEvent::ServiceDone, service, kwargs);
        Ok(())
    }

    async fn service_failed(
        &self,
        service: &Service,
        error: &FlowError,
        kwargs: &Payload,
    ) -> anyhow::Result<()> {
        warn!(service = %service.id(), error = %error, kind = error.kind(), kwargs = ?kwargs, "Service failed");
        Ok(())
    }
}
