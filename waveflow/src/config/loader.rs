//! Loading configuration from JSON documents.

use super::Config;
use crate::errors::{ConfigurationError, FlowError};
use serde_json::Value;
use std::path::Path;

/// Parses a JSON document into a configuration mapping.
///
/// The document root must be an object.
pub fn parse_config(source: &str) -> Result<Config, FlowError> {
    match serde_json::from_str::<Value>(source)? {
        Value::Object(config) => Ok(config),
        other => Err(ConfigurationError::new(format!(
            "configuration root must be a mapping, got {other}"
        ))
        .into()),
    }
}

/// Reads and parses a JSON configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, FlowError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "Loading configuration");
    let source = std::fs::read_to_string(path)?;
    parse_config(&source)
}
