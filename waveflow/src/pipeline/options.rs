//! Registration options.

use super::{KeyPaths, TaskRef};
use crate::config::ServiceSettings;
use crate::core::Payload;
use crate::service::Task;
use std::time::Duration;

/// Dependencies and default settings for one registration.
///
/// The settings here are the lowest layer; the `__global` and per-service
/// configuration sections override them.
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub(crate) dependencies: Vec<(TaskRef, KeyPaths)>,
    pub(crate) defaults: ServiceSettings,
}

impl ServiceOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `paths` from the result of the service running task type `T`.
    #[must_use]
    pub fn depends_on<T: Task>(self, paths: impl Into<KeyPaths>) -> Self {
        self.depends_on_ref(TaskRef::of::<T>(), paths)
    }

    /// Reads `paths` from the result of the service called `name`.
    #[must_use]
    pub fn depends_on_named(self, name: impl Into<String>, paths: impl Into<KeyPaths>) -> Self {
        self.depends_on_ref(TaskRef::named(name), paths)
    }

    /// Reads `paths` from the result of the referenced service.
    #[must_use]
    pub fn depends_on_ref(mut self, upstream: TaskRef, paths: impl Into<KeyPaths>) -> Self {
        self.dependencies.push((upstream, paths.into()));
        self
    }

    /// Sets the default timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout = Some(timeout);
        self
    }

    /// Sets the default failure policy.
    #[must_use]
    pub fn allow_failure(mut self, allow: bool) -> Self {
        self.defaults.allow_failure = allow;
        self
    }

    /// Sets the default static inputs.
    #[must_use]
    pub fn kwargs(mut self, kwargs: Payload) -> Self {
        self.defaults.kwargs = kwargs;
        self
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[(TaskRef, KeyPaths)] {
        &self.dependencies
    }
}
