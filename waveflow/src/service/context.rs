//! Per-invocation service context.

use super::Service;
use crate::core::Payload;
use crate::errors::FlowError;
use crate::observers::ObserverDispatcher;
use crate::pipeline::SERVICE_NAME_KEY;
use serde_json::Value;
use std::sync::Arc;

/// Handle a running task uses to reach its service and the observers.
#[derive(Clone)]
pub struct ServiceContext {
    service: Arc<Service>,
    dispatcher: Arc<ObserverDispatcher>,
}

impl ServiceContext {
    pub(crate) fn new(service: Arc<Service>, dispatcher: Arc<ObserverDispatcher>) -> Self {
        Self { service, dispatcher }
    }

    /// Creates a context with no observers attached.
    #[must_use]
    pub fn detached(service: Arc<Service>) -> Self {
        Self::new(service, Arc::new(ObserverDispatcher::default()))
    }

    /// Returns the running service.
    #[must_use]
    pub fn service(&self) -> &Arc<Service> {
        &self.service
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.service.name()
    }

    /// Returns the dispatch sequence number of this invocation.
    #[must_use]
    pub fn number(&self) -> Option<usize> {
        self.service.number()
    }

    /// Records task progress, clamped to 100.
    pub fn set_percent(&self, value: u8) {
        self.service.set_percent(value);
    }

    /// Sends a side-channel message to the observers.
    ///
    /// The payload is tagged with the service name under `__service_name`.
    pub async fn message(&self, mut payload: Payload) -> Result<(), FlowError> {
        payload.insert(
            SERVICE_NAME_KEY.to_string(),
            Value::String(self.service.name().to_string()),
        );
        self.dispatcher.service_message(&self.service, payload).await
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("service", &self.service.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::observers::{LifecycleEvent, Observer, RecordingObserver};
    use crate::testing::MockTask;
    use parking_lot::RwLock;
    use serde_json::json;

    #[tokio::test]
    async fn test_message_reaches_observers_tagged_with_service_name() {
        let recorder = Arc::new(RecordingObserver::new());
        let observers: Vec<Arc<dyn Observer>> = vec![recorder.clone()];
        let dispatcher = Arc::new(ObserverDispatcher::new(
            observers,
            Arc::new(RwLock::new(Config::new())),
        ));
        let service = Arc::new(Service::standalone(MockTask::new("fetch")));
        let ctx = ServiceContext::new(service, dispatcher);

        let mut payload = Payload::new();
        payload.insert("progress".to_string(), json!("halfway"));
        ctx.message(payload).await.unwrap();

        let events = recorder.events_of(LifecycleEvent::ServiceMessage);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].subject, "fetch");
        assert_eq!(events[0].kwargs.get("progress"), Some(&json!("halfway")));
        assert_eq!(events[0].kwargs.get(SERVICE_NAME_KEY), Some(&json!("fetch")));
    }

    #[tokio::test]
    async fn test_detached_context_accepts_messages() {
        let service = Arc::new(Service::standalone(MockTask::new("fetch")));
        let ctx = ServiceContext::detached(Arc::clone(&service));

        ctx.set_percent(40);
        assert!(ctx.message(Payload::new()).await.is_ok());
        assert_eq!(ctx.name(), "fetch");
        assert_eq!(service.percent(), 40);
        assert!(ctx.number().is_none());
    }
}
