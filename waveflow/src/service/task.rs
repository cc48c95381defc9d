//! Task trait and function-based tasks.

use super::ServiceContext;
use crate::core::Payload;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

/// Trait for the computation behind a service.
///
/// The service name defaults to the lower-cased type name, which is also the
/// configuration section key and the prefix of the keys this task exposes to
/// its dependents.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    /// Returns the service name.
    fn name(&self) -> String {
        service_name_of::<Self>()
    }

    /// Runs the task.
    ///
    /// # Arguments
    ///
    /// * `ctx` - The service context, used for side-channel messages
    /// * `inputs` - Static inputs plus values projected from upstream results
    async fn payload(&self, ctx: &ServiceContext, inputs: Payload) -> anyhow::Result<Payload>;
}

/// Lower-cased last path segment of `T`'s type name, generics stripped.
#[must_use]
pub fn service_name_of<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_lowercase()
}

type TaskFn = Arc<dyn Fn(ServiceContext, Payload) -> BoxFuture<'static, anyhow::Result<Payload>> + Send + Sync>;

/// A task built from a function.
///
/// All function tasks share one type, so dependents should reference them by
/// name (`depends_on_named`) rather than by type.
#[derive(Clone)]
pub struct FnTask {
    name: String,
    func: TaskFn,
}

impl FnTask {
    /// Creates a task from an async function.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(ServiceContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |ctx, inputs| func(ctx, inputs).boxed()),
        }
    }

    /// Creates a task from a synchronous function.
    pub fn from_sync<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Payload) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        Self::new(name, move |_ctx, inputs| std::future::ready(func(inputs)))
    }
}

impl Debug for FnTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTask")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl Task for FnTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn payload(&self, ctx: &ServiceContext, inputs: Payload) -> anyhow::Result<Payload> {
        (self.func)(ctx.clone(), inputs).await
    }
}
