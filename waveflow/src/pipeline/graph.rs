//! Dependency graph and result projection.

use crate::core::{Payload, ServiceStatus};
use crate::errors::{ConfigurationError, FlowError, InvalidStateError, KeyLookupError};
use crate::service::{service_name_of, Service, Task};
use serde_json::Value;
use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Input key carrying the dispatch sequence number.
pub const SERVICE_NUMBER_KEY: &str = "__service_number";

/// Payload key naming the service that sent a message.
pub const SERVICE_NAME_KEY: &str = "__service_name";

/// Reference to an upstream service in a dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRef {
    /// The first registered service whose task has this type.
    Type {
        /// The task type.
        id: TypeId,
        /// Service name derived from the type, for messages.
        name: String,
    },
    /// The first registered service with this name.
    Name(String),
}

impl TaskRef {
    /// References a service by task type.
    #[must_use]
    pub fn of<T: Task>() -> Self {
        Self::Type {
            id: TypeId::of::<T>(),
            name: service_name_of::<T>(),
        }
    }

    /// References a service by name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Returns true if `service` is what this reference points to.
    #[must_use]
    pub fn matches(&self, service: &Service) -> bool {
        match self {
            Self::Type { id, .. } => service.task_type() == *id,
            Self::Name(name) => service.name() == name,
        }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type { name, .. } | Self::Name(name) => f.write_str(name),
        }
    }
}

/// Ordered dotted key paths a dependent reads from one upstream result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyPaths(Vec<String>);

impl KeyPaths {
    /// Returns the paths in declaration order.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Checks that there is at least one path and no path or segment is empty.
    pub fn validate(&self, upstream: &TaskRef) -> Result<(), ConfigurationError> {
        if self.0.is_empty() {
            return Err(ConfigurationError::new(format!(
                "bad dependency spec for '{upstream}': no key paths"
            )));
        }
        for path in &self.0 {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(ConfigurationError::new(format!(
                    "bad dependency spec for '{upstream}': invalid key path '{path}'"
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn extend(&mut self, other: Self) {
        for path in other.0 {
            if !self.0.contains(&path) {
                self.0.push(path);
            }
        }
    }
}

impl From<&str> for KeyPaths {
    fn from(path: &str) -> Self {
        Self(vec![path.to_string()])
    }
}

impl From<String> for KeyPaths {
    fn from(path: String) -> Self {
        Self(vec![path])
    }
}

impl From<Vec<&str>> for KeyPaths {
    fn from(paths: Vec<&str>) -> Self {
        Self(paths.into_iter().map(str::to_string).collect())
    }
}

impl From<Vec<String>> for KeyPaths {
    fn from(paths: Vec<String>) -> Self {
        Self(paths)
    }
}

impl<const N: usize> From<[&str; N]> for KeyPaths {
    fn from(paths: [&str; N]) -> Self {
        Self(paths.iter().map(|path| (*path).to_string()).collect())
    }
}

/// One resolved upstream of a dependent service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Id of the upstream service.
    pub upstream: String,
    /// Paths read from the upstream result.
    pub paths: KeyPaths,
}

/// Registration-ordered services and their resolved upstreams.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    order: Vec<String>,
    edges: HashMap<String, Vec<Dependency>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a service with its upstreams.
    ///
    /// Upstream ids are not checked here; the pipeline only inserts resolved
    /// ids.
    pub fn insert(&mut self, service_id: impl Into<String>, dependencies: Vec<Dependency>) {
        let service_id = service_id.into();
        if !self.edges.contains_key(&service_id) {
            self.order.push(service_id.clone());
        }
        self.edges.insert(service_id, dependencies);
    }

    /// Returns service ids in registration order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Returns the upstreams of a service.
    #[must_use]
    pub fn dependencies(&self, service_id: &str) -> &[Dependency] {
        self.edges.get(service_id).map_or(&[], Vec::as_slice)
    }

    /// Returns the upstream ids of a service.
    pub fn upstream_ids<'a>(&'a self, service_id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.dependencies(service_id)
            .iter()
            .map(|dependency| dependency.upstream.as_str())
    }

    /// Returns the number of services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if no service was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Walks `result` along the dotted `path` through nested mappings.
#[must_use]
pub fn resolve_path<'a>(result: &'a Payload, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = result.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Builds the inputs of `service`.
///
/// Order: the sequence number, then the static kwargs, then one
/// `"<upstream>.<path>"` key per declared path.
pub(crate) fn project_inputs(
    service: &Service,
    dependencies: &[Dependency],
    registry: &HashMap<String, Arc<Service>>,
    number: usize,
) -> Result<Payload, FlowError> {
    let mut inputs = Payload::new();
    inputs.insert(SERVICE_NUMBER_KEY.to_string(), Value::from(number));
    inputs.extend(service.kwargs().iter().map(|(k, v)| (k.clone(), v.clone())));

    for dependency in dependencies {
        let upstream = registry.get(&dependency.upstream).ok_or_else(|| {
            FlowError::Internal(format!("upstream '{}' missing from registry", dependency.upstream))
        })?;

        let result = match upstream.status() {
            ServiceStatus::Done => upstream.result()?,
            status => {
                return Err(InvalidStateError::new(
                    upstream.name(),
                    status,
                    format!("'{}' depends on its result", service.name()),
                )
                .into());
            }
        };

        for path in dependency.paths.as_slice() {
            let value = resolve_path(&result, path).ok_or_else(|| {
                error!(service = %service.name(), upstream = %upstream.name(), path = %path, "Key not found in upstream result");
                KeyLookupError::new(path, upstream.name())
            })?;
            inputs.insert(format!("{}.{path}", upstream.name()), value.clone());
        }
    }

    Ok(inputs)
}

/// Removes the sequence number from `inputs`.
pub(crate) fn take_service_number(inputs: &mut Payload) -> Option<usize> {
    inputs
        .shift_remove(SERVICE_NUMBER_KEY)
        .and_then(|value| value.as_u64())
        .and_then(|number| usize::try_from(number).ok())
}
