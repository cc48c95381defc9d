//! Pipeline registration and the wave execution driver.

use super::graph::{Dependency, DependencyGraph, KeyPaths, TaskRef};
use super::info::PipelineInfo;
use super::options::ServiceOptions;
use super::scheduler::{Wave, WaveScheduler};
use crate::config::{load_config, merge_config, Config};
use crate::core::{Payload, PipelineStatus, ServiceStatus};
use crate::errors::{ConfigurationError, FlowError, InvalidStateError};
use crate::observability::SpanTimer;
use crate::observers::{Observer, ObserverDispatcher};
use crate::service::{Service, Task};
use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// The pipeline id.
    pub pipeline_id: Uuid,
    /// Number of waves executed.
    pub waves: usize,
    /// Ids of services that finished with a result, in registration order.
    pub done: Vec<String>,
    /// Ids of services whose failure was absorbed.
    pub failed: Vec<String>,
    /// Ids of services that never became runnable.
    pub unscheduled: Vec<String>,
    /// Total run time in milliseconds.
    pub duration_ms: f64,
}

/// A named dependency graph of services, run once in waves.
pub struct Pipeline {
    info: Arc<PipelineInfo>,
    config: Arc<RwLock<Config>>,
    dispatcher: Arc<ObserverDispatcher>,
    services: HashMap<String, Arc<Service>>,
    graph: DependencyGraph,
}

impl Pipeline {
    /// Creates a pipeline and dispatches `pipeline_create`.
    ///
    /// # Arguments
    ///
    /// * `name` - The pipeline name
    /// * `config` - Service settings and event kwargs
    /// * `observers` - Lifecycle observers, called in this order
    pub async fn create(
        name: impl Into<String>,
        config: Config,
        observers: Vec<Arc<dyn Observer>>,
    ) -> Result<Self, FlowError> {
        let info = Arc::new(PipelineInfo::new(name));
        let config = Arc::new(RwLock::new(config));
        let dispatcher = Arc::new(ObserverDispatcher::new(observers, Arc::clone(&config)));

        let pipeline = Self {
            info,
            config,
            dispatcher,
            services: HashMap::new(),
            graph: DependencyGraph::new(),
        };

        info!(pipeline = %pipeline.name(), pipeline_id = %pipeline.id(), "Pipeline created");
        pipeline.dispatcher.pipeline_create(&pipeline.info).await?;
        Ok(pipeline)
    }

    /// Creates a pipeline configured from a JSON file.
    pub async fn create_from_file(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        observers: Vec<Arc<dyn Observer>>,
    ) -> Result<Self, FlowError> {
        let config = load_config(path)?;
        Self::create(name, config, observers).await
    }

    /// Returns the pipeline id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.info.id()
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.info.name()
    }

    /// Returns the identity shared with observers.
    #[must_use]
    pub fn info(&self) -> &PipelineInfo {
        &self.info
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.info.status()
    }

    /// Returns a copy of the live configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    /// Deep-merges `patch` into the live configuration.
    ///
    /// Service settings are resolved at registration, so the patch affects
    /// services registered afterwards and all later event kwargs.
    pub fn update_config(&self, patch: &Config) {
        merge_config(&mut self.config.write(), patch);
    }

    /// Returns the services in registration order.
    pub fn services(&self) -> impl Iterator<Item = &Arc<Service>> {
        self.graph.order().iter().filter_map(|id| self.services.get(id))
    }

    /// Returns a service by id.
    #[must_use]
    pub fn service(&self, id: &str) -> Option<&Arc<Service>> {
        self.services.get(id)
    }

    /// Returns the first registered service with this name.
    #[must_use]
    pub fn service_by_name(&self, name: &str) -> Option<&Arc<Service>> {
        self.services().find(|service| service.name() == name)
    }

    /// Returns the first registered service running task type `T`.
    #[must_use]
    pub fn find<T: Task>(&self) -> Option<&Arc<Service>> {
        let reference = TaskRef::of::<T>();
        self.services().find(|service| reference.matches(service))
    }

    /// Returns the dependency graph.
    #[must_use]
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Sends a pipeline-level side-channel message to the observers.
    pub async fn message(&self, payload: Payload) -> Result<(), FlowError> {
        self.dispatcher.pipeline_message(&self.info, payload).await
    }

    /// Registers a task with no dependencies.
    pub async fn register<T: Task>(&mut self, task: T) -> Result<&mut Self, FlowError> {
        self.register_with(task, ServiceOptions::new()).await
    }

    /// Registers a task with dependencies and default settings.
    ///
    /// Every referenced upstream must already be registered. The
    /// `service_create` event is dispatched once the registration is valid.
    pub async fn register_with<T: Task>(
        &mut self,
        task: T,
        options: ServiceOptions,
    ) -> Result<&mut Self, FlowError> {
        let status = self.status();
        if status != PipelineStatus::Pending {
            return Err(InvalidStateError::new(
                self.name(),
                status,
                "services can only be registered before the run",
            )
            .into());
        }

        let ServiceOptions { dependencies, defaults } = options;
        let service = {
            let config = self.config.read();
            Service::new(task, self.graph.len(), self.id(), &config, &defaults)?
        };
        let dependencies = self.resolve_dependencies(&service, dependencies)?;

        debug!(
            service = %service.id(),
            upstreams = ?dependencies.iter().map(|d| d.upstream.as_str()).collect::<Vec<_>>(),
            "Registering service"
        );

        let service = Arc::new(service);
        self.dispatcher.service_create(&service).await?;
        self.graph.insert(service.id(), dependencies);
        self.services.insert(service.id().to_string(), service);
        Ok(self)
    }

    fn resolve_dependencies(
        &self,
        service: &Service,
        declared: Vec<(TaskRef, KeyPaths)>,
    ) -> Result<Vec<Dependency>, ConfigurationError> {
        let mut resolved: Vec<Dependency> = Vec::new();
        for (upstream, paths) in declared {
            paths
                .validate(&upstream)
                .map_err(|err| err.with_service(service.name()))?;

            let upstream_id = self
                .services()
                .find(|candidate| upstream.matches(candidate))
                .map(|candidate| candidate.id().to_string())
                .ok_or_else(|| {
                    ConfigurationError::new(format!("Service {upstream} not registered"))
                        .with_service(service.name())
                })?;

            match resolved.iter_mut().find(|dep| dep.upstream == upstream_id) {
                Some(existing) => existing.paths.extend(paths),
                None => resolved.push(Dependency {
                    upstream: upstream_id,
                    paths,
                }),
            }
        }
        Ok(resolved)
    }

    /// Runs the pipeline on the current runtime.
    pub async fn run(&self) -> Result<RunSummary, FlowError> {
        self.run_on(&Handle::current()).await
    }

    /// Runs the pipeline, spawning services on `handle`.
    ///
    /// A pipeline runs at most once. On failure the pipeline is marked
    /// `Failed`, `pipeline_failed` is dispatched once, and the error is
    /// returned.
    pub async fn run_on(&self, handle: &Handle) -> Result<RunSummary, FlowError> {
        let span = info_span!("pipeline", pipeline = %self.name(), pipeline_id = %self.id());
        self.execute(handle).instrument(span).await
    }

    async fn execute(&self, handle: &Handle) -> Result<RunSummary, FlowError> {
        self.info
            .transition(PipelineStatus::Pending, PipelineStatus::Processing)?;
        let timer = SpanTimer::start(self.name());
        info!(services = self.services.len(), "Pipeline started");

        if let Err(err) = self.dispatcher.pipeline_start(&self.info).await {
            error!(error = %err, "Pipeline start rejected by observer");
            self.info
                .transition(PipelineStatus::Processing, PipelineStatus::Failed)?;
            return Err(err);
        }

        match self.drive(handle).await {
            Ok(mut summary) => {
                self.info
                    .transition(PipelineStatus::Processing, PipelineStatus::Done)?;
                summary.duration_ms = timer.finish();
                info!(
                    waves = summary.waves,
                    done = summary.done.len(),
                    failed = summary.failed.len(),
                    duration_ms = summary.duration_ms,
                    "Pipeline done"
                );
                self.dispatcher.pipeline_done(&self.info).await?;
                Ok(summary)
            }
            Err(err) => Err(self.abort(err).await),
        }
    }

    async fn abort(&self, err: FlowError) -> FlowError {
        if let Err(state) = self
            .info
            .transition(PipelineStatus::Processing, PipelineStatus::Failed)
        {
            warn!(error = %state, "Unexpected pipeline status while failing");
        }
        error!(error = %err, kind = err.kind(), "Pipeline failed");

        match self.dispatcher.pipeline_failed(&self.info, &err).await {
            Ok(()) => err,
            Err(observer_err) => {
                error!(error = %observer_err, "Observer failed while reporting pipeline failure");
                observer_err
            }
        }
    }

    async fn drive(&self, handle: &Handle) -> Result<RunSummary, FlowError> {
        let mut scheduler = WaveScheduler::new();
        while let Some(wave) = scheduler.next_wave(&self.graph, &self.services)? {
            self.run_wave(handle, &wave).await?;
            scheduler.complete(&wave);
        }

        let unscheduled = scheduler.unscheduled(&self.graph);
        if !unscheduled.is_empty() {
            warn!(services = ?unscheduled, "Services never became runnable; check for dependency cycles");
        }

        Ok(RunSummary {
            pipeline_id: self.id(),
            waves: scheduler.waves_yielded(),
            done: self.ids_with(ServiceStatus::Done),
            failed: self.ids_with(ServiceStatus::Failed),
            unscheduled,
            duration_ms: 0.0,
        })
    }

    async fn run_wave(&self, handle: &Handle, wave: &Wave) -> Result<(), FlowError> {
        let timer = SpanTimer::start(format!("wave-{}", wave.index));
        debug!(wave = wave.index, services = wave.services.len(), "Starting wave");

        let mut members = Vec::with_capacity(wave.services.len());
        for scheduled in &wave.services {
            let service = self.registered(&scheduled.service_id)?;
            service.begin()?;
            service.set_number(scheduled.number);
            members.push(Arc::clone(service));
        }

        let mut running = FuturesUnordered::new();
        let mut abort_handles = Vec::with_capacity(members.len());
        for (service, scheduled) in members.iter().zip(&wave.services) {
            let span = info_span!(
                "service",
                service = %service.id(),
                number = scheduled.number,
                wave = wave.index
            );
            let task = handle.spawn(
                Arc::clone(service)
                    .settle(Arc::clone(&self.dispatcher), scheduled.inputs.clone())
                    .instrument(span),
            );
            abort_handles.push(task.abort_handle());
            running.push(task);
        }

        let mut failure: Option<FlowError> = None;
        while let Some(joined) = running.next().await {
            let outcome = joined.unwrap_or_else(|join_err| {
                Err(FlowError::Internal(format!("service task did not complete: {join_err}")))
            });
            if let Err(err) = outcome {
                if failure.is_none() {
                    for abort_handle in &abort_handles {
                        abort_handle.abort();
                    }
                    failure = Some(err);
                }
            }
        }

        if let Some(err) = failure {
            self.cancel_unsettled(wave, &members, &err).await;
            return Err(err);
        }

        debug!(wave = wave.index, duration_ms = timer.finish(), "Wave settled");
        Ok(())
    }

    /// Marks services still `Processing` after an aborted wave as failed.
    async fn cancel_unsettled(&self, wave: &Wave, members: &[Arc<Service>], cause: &FlowError) {
        for service in members {
            if service.status() != ServiceStatus::Processing {
                continue;
            }
            if let Err(state) = service.fail() {
                warn!(service = %service.id(), error = %state, "Could not mark cancelled service");
                continue;
            }

            warn!(service = %service.id(), wave = wave.index, "Service cancelled");
            let cancelled = FlowError::Cancelled {
                service: service.name().to_string(),
                reason: format!("wave {} aborted: {cause}", wave.index),
            };
            if let Err(observer_err) = self.dispatcher.service_failed(service, &cancelled).await {
                warn!(service = %service.id(), error = %observer_err, "Observer failed while reporting cancellation");
            }
        }
    }

    fn registered(&self, id: &str) -> Result<&Arc<Service>, FlowError> {
        self.services
            .get(id)
            .ok_or_else(|| FlowError::Internal(format!("service '{id}' missing from registry")))
    }

    fn ids_with(&self, status: ServiceStatus) -> Vec<String> {
        self.services()
            .filter(|service| service.status() == status)
            .map(|service| service.id().to_string())
            .collect()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.status())
            .field("services", &self.graph.order())
            .field("observers", &self.dispatcher.len())
            .finish()
    }
}
