//! In-memory persistence of pipeline and service records.

use super::Observer;
use crate::core::{Payload, PipelineStatus, ServiceStatus};
use crate::errors::FlowError;
use crate::pipeline::PipelineInfo;
use crate::service::Service;
use crate::utils::{now, Timestamp};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Persisted state of one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRecord {
    /// Pipeline id.
    pub id: Uuid,
    /// Pipeline name.
    pub name: String,
    /// Last recorded status.
    pub status: PipelineStatus,
    /// When the pipeline was created.
    pub created: Timestamp,
    /// When the run started.
    pub started: Option<Timestamp>,
    /// When the run ended.
    pub ended: Option<Timestamp>,
    /// The run error, if it failed.
    pub error: Option<String>,
}

/// Persisted state of one service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceRecord {
    /// Service id, unique within the pipeline.
    pub id: String,
    /// Owning pipeline id.
    pub pipeline_id: Uuid,
    /// Service name.
    pub name: String,
    /// Last recorded status.
    pub status: ServiceStatus,
    /// When the service was registered.
    pub created: Timestamp,
    /// When the service started.
    pub started: Option<Timestamp>,
    /// When the service ended.
    pub ended: Option<Timestamp>,
    /// JSON-encoded result, once done.
    pub result_json: Option<String>,
    /// The service error, if it failed.
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    pipelines: HashMap<Uuid, PipelineRecord>,
    services: Vec<ServiceRecord>,
}

impl StoreState {
    fn pipeline_mut(&mut self, id: Uuid) -> anyhow::Result<&mut PipelineRecord> {
        self.pipelines
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("pipeline {id} has no record"))
    }

    fn service_mut(&mut self, pipeline_id: Uuid, id: &str) -> anyhow::Result<&mut ServiceRecord> {
        self.services
            .iter_mut()
            .find(|record| record.pipeline_id == pipeline_id && record.id == id)
            .ok_or_else(|| anyhow::anyhow!("service {id} of pipeline {pipeline_id} has no record"))
    }
}

/// Observer persisting pipeline and service records in memory.
///
/// Records are created on the `*_create` events; later events for an
/// unrecorded pipeline or service are errors.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record of a pipeline.
    #[must_use]
    pub fn pipeline(&self, id: Uuid) -> Option<PipelineRecord> {
        self.state.read().pipelines.get(&id).cloned()
    }

    /// Returns the record of a service.
    #[must_use]
    pub fn service(&self, pipeline_id: Uuid, id: &str) -> Option<ServiceRecord> {
        self.state
            .read()
            .services
            .iter()
            .find(|record| record.pipeline_id == pipeline_id && record.id == id)
            .cloned()
    }

    /// Returns the service records of a pipeline in registration order.
    #[must_use]
    pub fn services_of(&self, pipeline_id: Uuid) -> Vec<ServiceRecord> {
        self.state
            .read()
            .services
            .iter()
            .filter(|record| record.pipeline_id == pipeline_id)
            .cloned()
            .collect()
    }

    /// Serializes every record as a JSON document.
    pub fn to_json(&self) -> Result<String, FlowError> {
        let state = self.state.read();
        let mut pipelines: Vec<&PipelineRecord> = state.pipelines.values().collect();
        pipelines.sort_by_key(|record| record.created);
        let document = serde_json::json!({
            "pipelines": pipelines,
            "services": state.services,
        });
        Ok(serde_json::to_string(&document)?)
    }
}

#[async_trait]
impl Observer for MemoryStore {
    async fn pipeline_create(&self, pipeline: &PipelineInfo, _kwargs: &Payload) -> anyhow::Result<()> {
        self.state.write().pipelines.insert(
            pipeline.id(),
            PipelineRecord {
                id: pipeline.id(),
                name: pipeline.name().to_string(),
                status: PipelineStatus::Pending,
                created: now(),
                started: None,
                ended: None,
                error: None,
            },
        );
        Ok(())
    }

    async fn pipeline_start(&self, pipeline: &PipelineInfo, _kwargs: &Payload) -> anyhow::Result<()> {
        let mut state = self.state.write();
        let record = state.pipeline_mut(pipeline.id())?;
        record.started = Some(now());
        record.status = PipelineStatus::Processing;
        Ok(())
    }

    async fn pipeline_done(&self, pipeline: &PipelineInfo, _kwargs: &Payload) -> anyhow::Result<()> {
        let mut state = self.state.write();
        let record = state.pipeline_mut(pipeline.id())?;
        record.ended = Some(now());
        record.status = PipelineStatus::Done;
        Ok(())
    }

    async fn pipeline_failed(
        &self,
        pipeline: &PipelineInfo,
        error: &FlowError,
        _kwargs: &Payload,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write();
        let record = state.pipeline_mut(pipeline.id())?;
        record.ended = Some(now());
        record.status = PipelineStatus::Failed;
        record.error = Some(error.to_string());
        Ok(())
    }

    async fn service_create(&self, service: &Service, _kwargs: &Payload) -> anyhow::Result<()> {
        self.state.write().services.push(ServiceRecord {
            id: service.id().to_string(),
            pipeline_id: service.pipeline_id(),
            name: service.name().to_string(),
            status: ServiceStatus::Pending,
            created: now(),
            started: None,
            ended: None,
            result_json: None,
            error: None,
        });
        Ok(())
    }

    async fn service_start(&self, service: &Service, _kwargs: &Payload) -> anyhow::Result<()> {
        let mut state = self.state.write();
        let record = state.service_mut(service.pipeline_id(), service.id())?;
        record.started = Some(now());
        record.status = ServiceStatus::Processing;
        Ok(())
    }

    async fn service_done(&self, service: &Service, _kwargs: &Payload) -> anyhow::Result<()> {
        let result_json = service.json_result()?;
        let mut state = self.state.write();
        let record = state.service_mut(service.pipeline_id(), service.id())?;
        record.ended = Some(now());
        record.status = ServiceStatus::Done;
        record.result_json = Some(result_json);
        Ok(())
    }

    async fn service_failed(
        &self,
        service: &Service,
        error: &FlowError,
        _kwargs: &Payload,
    ) -> anyhow::Result<()> {
        let mut state = self.state.write();
        let record = state.service_mut(service.pipeline_id(), service.id())?;
        record.ended = Some(now());
        record.status = ServiceStatus::Failed;
        record.error = Some(error.to_string());
        Ok(())
    }
}
