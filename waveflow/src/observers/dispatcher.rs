//! Ordered, serialized observer dispatch.

use super::{LifecycleEvent, Observer};
use crate::config::{event_kwargs, Config};
use crate::core::Payload;
use crate::errors::FlowError;
use crate::pipeline::PipelineInfo;
use crate::service::Service;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

/// One pending notification, borrowed for the length of a dispatch.
enum Notice<'a> {
    PipelineCreate(&'a PipelineInfo),
    PipelineStart(&'a PipelineInfo),
    PipelineMessage(&'a PipelineInfo),
    PipelineDone(&'a PipelineInfo),
    PipelineFailed(&'a PipelineInfo, &'a FlowError),
    ServiceCreate(&'a Service),
    ServiceStart(&'a Service),
    ServiceMessage(&'a Service),
    ServiceDone(&'a Service),
    ServiceFailed(&'a Service, &'a FlowError),
}

impl Notice<'_> {
    fn event(&self) -> LifecycleEvent {
        match self {
            Self::PipelineCreate(_) => LifecycleEvent::PipelineCreate,
            Self::PipelineStart(_) => LifecycleEvent::PipelineStart,
            Self::PipelineMessage(_) => LifecycleEvent::PipelineMessage,
            Self::PipelineDone(_) => LifecycleEvent::PipelineDone,
            Self::PipelineFailed(..) => LifecycleEvent::PipelineFailed,
            Self::ServiceCreate(_) => LifecycleEvent::ServiceCreate,
            Self::ServiceStart(_) => LifecycleEvent::ServiceStart,
            Self::ServiceMessage(_) => LifecycleEvent::ServiceMessage,
            Self::ServiceDone(_) => LifecycleEvent::ServiceDone,
            Self::ServiceFailed(..) => LifecycleEvent::ServiceFailed,
        }
    }

    async fn deliver(&self, observer: &dyn Observer, kwargs: &Payload) -> anyhow::Result<()> {
        match *self {
            Self::PipelineCreate(info) => observer.pipeline_create(info, kwargs).await,
            Self::PipelineStart(info) => observer.pipeline_start(info, kwargs).await,
            Self::PipelineMessage(info) => observer.pipeline_message(info, kwargs).await,
            Self::PipelineDone(info) => observer.pipeline_done(info, kwargs).await,
            Self::PipelineFailed(info, error) => observer.pipeline_failed(info, error, kwargs).await,
            Self::ServiceCreate(service) => observer.service_create(service, kwargs).await,
            Self::ServiceStart(service) => observer.service_start(service, kwargs).await,
            Self::ServiceMessage(service) => observer.service_message(service, kwargs).await,
            Self::ServiceDone(service) => observer.service_done(service, kwargs).await,
            Self::ServiceFailed(service, error) => observer.service_failed(service, error, kwargs).await,
        }
    }
}

/// Calls the registered observers for every lifecycle event.
///
/// Observers run sequentially in registration order and the first error
/// aborts the dispatch. Dispatches never interleave, even when issued from
/// concurrently running services.
pub struct ObserverDispatcher {
    observers: Vec<Arc<dyn Observer>>,
    config: Arc<RwLock<Config>>,
    serial: tokio::sync::Mutex<()>,
}

impl ObserverDispatcher {
    /// Creates a dispatcher reading event kwargs from the shared `config`.
    #[must_use]
    pub fn new(observers: Vec<Arc<dyn Observer>>, config: Arc<RwLock<Config>>) -> Self {
        Self {
            observers,
            config,
            serial: tokio::sync::Mutex::new(()),
        }
    }

    /// Returns the number of observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Returns true if no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    async fn dispatch(&self, notice: Notice<'_>, payload: Payload) -> Result<(), FlowError> {
        if self.observers.is_empty() {
            return Ok(());
        }

        let event = notice.event();
        let kwargs = {
            let config = self.config.read();
            let mut kwargs = payload;
            kwargs.extend(event_kwargs(&config, event)?);
            kwargs
        };

        let _serial = self.serial.lock().await;
        trace!(event = %event, observers = self.observers.len(), "Dispatching lifecycle event");
        for observer in &self.observers {
            notice
                .deliver(observer.as_ref(), &kwargs)
                .await
                .map_err(|err| FlowError::Observer {
                    event,
                    source: err.into(),
                })?;
        }
        Ok(())
    }

    /// Dispatches `pipeline_create`.
    pub async fn pipeline_create(&self, info: &PipelineInfo) -> Result<(), FlowError> {
        self.dispatch(Notice::PipelineCreate(info), Payload::new()).await
    }

    /// Dispatches `pipeline_start`.
    pub async fn pipeline_start(&self, info: &PipelineInfo) -> Result<(), FlowError> {
        self.dispatch(Notice::PipelineStart(info), Payload::new()).await
    }

    /// Dispatches `pipeline_message` with `payload`.
    pub async fn pipeline_message(&self, info: &PipelineInfo, payload: Payload) -> Result<(), FlowError> {
        self.dispatch(Notice::PipelineMessage(info), payload).await
    }

    /// Dispatches `pipeline_done`.
    pub async fn pipeline_done(&self, info: &PipelineInfo) -> Result<(), FlowError> {
        self.dispatch(Notice::PipelineDone(info), Payload::new()).await
    }

    /// Dispatches `pipeline_failed` with the run error.
    pub async fn pipeline_failed(&self, info: &PipelineInfo, error: &FlowError) -> Result<(), FlowError> {
        self.dispatch(Notice::PipelineFailed(info, error), Payload::new()).await
    }

    /// Dispatches `service_create`.
    pub async fn service_create(&self, service: &Service) -> Result<(), FlowError> {
        self.dispatch(Notice::ServiceCreate(service), Payload::new()).await
    }

    /// Dispatches `service_start`.
    pub async fn service_start(&self, service: &Service) -> Result<(), FlowError> {
        self.dispatch(Notice::ServiceStart(service), Payload::new()).await
    }

    /// Dispatches `service_message` with `payload`.
    pub async fn service_message(&self, service: &Service, payload: Payload) -> Result<(), FlowError> {
        self.dispatch(Notice::ServiceMessage(service), payload).await
    }

    /// Dispatches `service_done`.
    pub async fn service_done(&self, service: &Service) -> Result<(), FlowError> {
        self.dispatch(Notice::ServiceDone(service), Payload::new()).await
    }

    /// Dispatches `service_failed` with the service error.
    pub async fn service_failed(&self, service: &Service, error: &FlowError) -> Result<(), FlowError> {
        self.dispatch(Notice::ServiceFailed(service, error), Payload::new()).await
    }
}

impl Default for ObserverDispatcher {
    fn default() -> Self {
        Self::new(Vec::new(), Arc::new(RwLock::new(Config::new())))
    }
}

impl std::fmt::Debug for ObserverDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverDispatcher")
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}
