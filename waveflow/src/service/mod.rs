//! Services: task instances with lifecycle state.
//!
//! A [`Task`] is the one-method computation a caller provides. Registering it
//! into a pipeline wraps it in a [`Service`], which owns the status, the
//! timeout and failure policy, and the result.

mod context;
mod state;
mod task;

pub use context::ServiceContext;
pub use state::Service;
pub use task::{service_name_of, FnTask, Task};
