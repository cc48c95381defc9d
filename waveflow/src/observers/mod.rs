//! Lifecycle observers.
//!
//! An [`Observer`] receives the ten pipeline and service lifecycle events.
//! Every method has a no-op default, so implementors override only what they
//! need. The [`ObserverDispatcher`] calls observers in registration order and
//! stops at the first error.

mod dispatcher;
mod logging;
mod recording;
mod store;

pub use dispatcher::ObserverDispatcher;
pub use logging::LoggingObserver;
pub use recording::{ObservedEvent, RecordingObserver};
pub use store::{MemoryStore, PipelineRecord, ServiceRecord};

use crate::core::Payload;
use crate::errors::FlowError;
use crate::pipeline::PipelineInfo;
use crate::service::Service;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The ten lifecycle hook points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// The pipeline was created.
    PipelineCreate,
    /// The pipeline run started.
    PipelineStart,
    /// A pipeline-level side-channel message.
    PipelineMessage,
    /// Every wave settled.
    PipelineDone,
    /// The run was aborted.
    PipelineFailed,
    /// A service was registered.
    ServiceCreate,
    /// A service started running.
    ServiceStart,
    /// A service-level side-channel message.
    ServiceMessage,
    /// A service finished with a result.
    ServiceDone,
    /// A service failed, timed out, or was cancelled.
    ServiceFailed,
}

impl LifecycleEvent {
    /// All events, pipeline events first.
    pub const ALL: [Self; 10] = [
        Self::PipelineCreate,
        Self::PipelineStart,
        Self::PipelineMessage,
        Self::PipelineDone,
        Self::PipelineFailed,
        Self::ServiceCreate,
        Self::ServiceStart,
        Self::ServiceMessage,
        Self::ServiceDone,
        Self::ServiceFailed,
    ];

    /// Returns the snake_case event name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PipelineCreate => "pipeline_create",
            Self::PipelineStart => "pipeline_start",
            Self::PipelineMessage => "pipeline_message",
            Self::PipelineDone => "pipeline_done",
            Self::PipelineFailed => "pipeline_failed",
            Self::ServiceCreate => "service_create",
            Self::ServiceStart => "service_start",
            Self::ServiceMessage => "service_message",
            Self::ServiceDone => "service_done",
            Self::ServiceFailed => "service_failed",
        }
    }

    /// Returns the configuration key holding extra keywords for this event.
    #[must_use]
    pub fn kwargs_key(&self) -> String {
        format!("__{}_kwargs", self.as_str())
    }

    /// Returns true for service-level events.
    #[must_use]
    pub fn is_service_event(&self) -> bool {
        matches!(
            self,
            Self::ServiceCreate
                | Self::ServiceStart
                | Self::ServiceMessage
                | Self::ServiceDone
                | Self::ServiceFailed
        )
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receiver of lifecycle events.
///
/// `kwargs` is the event payload after the `__{event}_kwargs` configuration
/// section has been merged over it. Returning an error aborts the dispatch and
/// the surrounding operation.
#[async_trait]
pub trait Observer: Send + Sync {
    /// Called once the pipeline is created.
    async fn pipeline_create(&self, _pipeline: &PipelineInfo, _kwargs: &Payload) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when the run starts.
    async fn pipeline_start(&self, _pipeline: &PipelineInfo, _kwargs: &Payload) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for `Pipeline::message`.
    async fn pipeline_message(&self, _pipeline: &PipelineInfo, _kwargs: &Payload) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called after the last wave settled.
    async fn pipeline_done(&self, _pipeline: &PipelineInfo, _kwargs: &Payload) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once when the run is aborted.
    async fn pipeline_failed(
        &self,
        _pipeline: &PipelineInfo,
        _error: &FlowError,
        _kwargs: &Payload,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once a service is registered.
    async fn service_create(&self, _service: &Service, _kwargs: &Payload) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a service starts running.
    async fn service_start(&self, _service: &Service, _kwargs: &Payload) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called for `ServiceContext::message`.
    async fn service_message(&self, _service: &Service, _kwargs: &Payload) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a service finished with a result.
    async fn service_done(&self, _service: &Service, _kwargs: &Payload) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called when a service failed, timed out, or was cancelled.
    async fn service_failed(
        &self,
        _service: &Service,
        _error: &FlowError,
        _kwargs: &Payload,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
