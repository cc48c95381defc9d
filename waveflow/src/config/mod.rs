//! Pipeline configuration.
//!
//! Configuration is a nested string-keyed mapping. Recognized keys:
//! - `__global`: defaults merged under every per-service section
//! - `<service-name>`: per-service section with `timeout` (seconds),
//!   `allow_failure` and `__kwargs` (static inputs)
//! - `__{event}_kwargs`: extra keyword payload for a lifecycle dispatch

mod loader;
mod merge;
mod settings;

pub use loader::{load_config, parse_config};
pub use merge::merge_config;
pub use settings::{event_kwargs, ServiceSettings};

/// A nested string-keyed configuration mapping.
pub type Config = serde_json::Map<String, serde_json::Value>;

/// Section merged under every per-service section.
pub const GLOBAL_SECTION: &str = "__global";
/// Per-service static input mapping.
pub const KWARGS_KEY: &str = "__kwargs";
/// Per-service timeout, in seconds.
pub const TIMEOUT_KEY: &str = "timeout";
/// Per-service failure policy.
pub const ALLOW_FAILURE_KEY: &str = "allow_failure";
