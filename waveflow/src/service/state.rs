//! Service state machine.

use super::{ServiceContext, Task};
use crate::config::{Config, ServiceSettings};
use crate::core::{Payload, ServiceStatus};
use crate::errors::{ConfigurationError, FlowError, InvalidStateError};
use crate::observers::ObserverDispatcher;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::TypeId;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct ServiceState {
    status: ServiceStatus,
    result: Option<Payload>,
}

/// A registered task instance and its lifecycle state.
///
/// Status moves `Pending -> Processing -> {Done, Failed}` and never goes
/// back. The result is present iff the status is `Done`.
pub struct Service {
    id: String,
    name: String,
    task_type: TypeId,
    type_name: &'static str,
    pipeline_id: Uuid,
    task: Arc<dyn Task>,
    settings: ServiceSettings,
    state: RwLock<ServiceState>,
    number: RwLock<Option<usize>>,
    percent: AtomicU8,
}

impl Service {
    /// Creates the service for the `index`-th registration of a pipeline.
    ///
    /// Settings are resolved eagerly from `config` over `defaults`.
    pub(crate) fn new<T: Task>(
        task: T,
        index: usize,
        pipeline_id: Uuid,
        config: &Config,
        defaults: &ServiceSettings,
    ) -> Result<Self, ConfigurationError> {
        let name = task.name();
        let settings = ServiceSettings::resolve(config, &name, defaults)?;
        Ok(Self::build(task, format!("{name}__{index}"), name, pipeline_id, settings))
    }

    /// Creates a service outside of any pipeline.
    #[must_use]
    pub fn standalone<T: Task>(task: T) -> Self {
        Self::standalone_with(task, ServiceSettings::default())
    }

    /// Creates a service outside of any pipeline with explicit settings.
    #[must_use]
    pub fn standalone_with<T: Task>(task: T, settings: ServiceSettings) -> Self {
        let name = task.name();
        Self::build(task, format!("{name}__0"), name, Uuid::nil(), settings)
    }

    fn build<T: Task>(
        task: T,
        id: String,
        name: String,
        pipeline_id: Uuid,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            id,
            name,
            task_type: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            pipeline_id,
            task: Arc::new(task),
            settings,
            state: RwLock::new(ServiceState::default()),
            number: RwLock::new(None),
            percent: AtomicU8::new(0),
        }
    }

    /// Returns the service id, unique within its pipeline.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the id of the owning pipeline.
    #[must_use]
    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline_id
    }

    /// Returns the full type name of the task.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub(crate) fn task_type(&self) -> TypeId {
        self.task_type
    }

    /// Returns the invocation timeout.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.settings.timeout
    }

    /// Returns whether failures of this service are absorbed.
    #[must_use]
    pub fn allow_failure(&self) -> bool {
        self.settings.allow_failure
    }

    /// Returns the static inputs.
    #[must_use]
    pub fn kwargs(&self) -> &Payload {
        &self.settings.kwargs
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> ServiceStatus {
        self.state.read().status
    }

    /// Returns true once the service reached `Done` or `Failed`.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Returns the dispatch sequence number, once dispatched.
    #[must_use]
    pub fn number(&self) -> Option<usize> {
        *self.number.read()
    }

    pub(crate) fn set_number(&self, number: usize) {
        *self.number.write() = Some(number);
    }

    /// Returns the progress reported by the task, 0 to 100.
    #[must_use]
    pub fn percent(&self) -> u8 {
        self.percent.load(Ordering::Relaxed)
    }

    pub(crate) fn set_percent(&self, value: u8) {
        self.percent.store(value.min(100), Ordering::Relaxed);
    }

    /// Returns the result.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateError` unless the status is `Done`.
    pub fn result(&self) -> Result<Payload, InvalidStateError> {
        let state = self.state.read();
        match (&state.status, &state.result) {
            (ServiceStatus::Done, Some(result)) => Ok(result.clone()),
            (status, _) => Err(InvalidStateError::new(
                &self.name,
                status,
                "result is only available once the service is done",
            )),
        }
    }

    /// Returns the result encoded as JSON, for storage adapters.
    pub fn json_result(&self) -> Result<String, FlowError> {
        let result = self.result()?;
        Ok(serde_json::to_string(&result)?)
    }

    /// Pending -> Processing.
    pub(crate) fn begin(&self) -> Result<(), InvalidStateError> {
        self.transition(ServiceStatus::Processing, None)
    }

    /// Processing -> Done, storing the result.
    pub(crate) fn complete(&self, result: Payload) -> Result<(), InvalidStateError> {
        self.transition(ServiceStatus::Done, Some(result))
    }

    /// Processing -> Failed.
    pub(crate) fn fail(&self) -> Result<(), InvalidStateError> {
        self.transition(ServiceStatus::Failed, None)
    }

    fn transition(&self, next: ServiceStatus, result: Option<Payload>) -> Result<(), InvalidStateError> {
        let mut state = self.state.write();
        if !state.status.can_transition_to(next) {
            return Err(InvalidStateError::new(
                &self.name,
                state.status,
                format!("cannot move to {next}"),
            ));
        }
        state.status = next;
        state.result = result;
        Ok(())
    }

    /// Runs the task once, enforcing the timeout.
    ///
    /// Does not touch the status. Panics inside the task are reported as task
    /// failures.
    pub(crate) async fn execute(&self, ctx: &ServiceContext, inputs: Payload) -> Result<Payload, FlowError> {
        let computation = AssertUnwindSafe(self.task.payload(ctx, inputs)).catch_unwind();

        let outcome = match self.settings.timeout {
            Some(limit) => match tokio::time::timeout(limit, computation).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Err(FlowError::Timeout {
                        service: self.name.clone(),
                        timeout: limit,
                    });
                }
            },
            None => computation.await,
        };

        match outcome {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(source)) => Err(FlowError::task_failed(&self.name, source)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(FlowError::task_failed(
                    &self.name,
                    anyhow::anyhow!("task panicked: {message}"),
                ))
            }
        }
    }

    /// Invokes the service: `Pending -> Processing -> {Done, Failed}`.
    ///
    /// Returns `Ok(Some(result))` on success. A failure or timeout is returned
    /// as an error unless `allow_failure` is set, in which case it is absorbed
    /// and `Ok(None)` is returned.
    pub async fn invoke(
        self: &Arc<Self>,
        dispatcher: Arc<ObserverDispatcher>,
        inputs: Payload,
    ) -> Result<Option<Payload>, FlowError> {
        self.begin()?;
        Arc::clone(self).settle(dispatcher, inputs).await
    }

    /// Runs an already started (`Processing`) service to a terminal status,
    /// dispatching the service lifecycle events.
    pub(crate) async fn settle(
        self: Arc<Self>,
        dispatcher: Arc<ObserverDispatcher>,
        inputs: Payload,
    ) -> Result<Option<Payload>, FlowError> {
        debug!(service = %self.name, inputs = ?inputs, "Starting service");
        if let Err(err) = dispatcher.service_start(&self).await {
            // The task never ran; the observer error is the outcome.
            self.fail()?;
            return Err(err);
        }

        let ctx = ServiceContext::new(Arc::clone(&self), Arc::clone(&dispatcher));
        match self.execute(&ctx, inputs).await {
            Ok(result) => {
                debug!(service = %self.name, result = ?result, "Service done");
                self.complete(result.clone())?;
                dispatcher.service_done(&self).await?;
                Ok(Some(result))
            }
            Err(err) => {
                if err.is_timeout() {
                    error!(service = %self.name, "Service timed out");
                } else {
                    error!(service = %self.name, error = %err, "Service failed");
                }
                self.fail()?;
                dispatcher.service_failed(&self, &err).await?;

                if self.settings.allow_failure {
                    warn!(service = %self.name, error = %err, "Failure absorbed by allow_failure");
                    Ok(None)
                } else {
                    Err(err)
                }
            }
        }
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("timeout", &self.settings.timeout)
            .field("allow_failure", &self.settings.allow_failure)
            .finish()
    }
}
