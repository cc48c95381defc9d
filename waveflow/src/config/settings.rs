//! Per-service settings resolved from configuration.

use super::{merge_config, Config, ALLOW_FAILURE_KEY, GLOBAL_SECTION, KWARGS_KEY, TIMEOUT_KEY};
use crate::core::Payload;
use crate::errors::ConfigurationError;
use crate::observers::LifecycleEvent;
use serde_json::Value;
use std::time::Duration;

/// Timeout, failure policy and static inputs of a service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceSettings {
    /// Upper bound on a single invocation.
    pub timeout: Option<Duration>,
    /// Whether a failure of this service is absorbed instead of failing the run.
    pub allow_failure: bool,
    /// Static inputs merged into every invocation.
    pub kwargs: Payload,
}

impl ServiceSettings {
    /// Resolves the settings of `service_name`.
    ///
    /// Layers, lowest first: `defaults`, the `__global` section, the section
    /// keyed by the service name.
    pub fn resolve(
        config: &Config,
        service_name: &str,
        defaults: &Self,
    ) -> Result<Self, ConfigurationError> {
        let mut section = Config::new();
        for key in [GLOBAL_SECTION, service_name] {
            if let Some(layer) = section_of(config, key)? {
                merge_config(&mut section, layer);
            }
        }

        let timeout = match section.get(TIMEOUT_KEY) {
            None => defaults.timeout,
            Some(Value::Null) => None,
            Some(value) => Some(parse_timeout(value, service_name)?),
        };

        let allow_failure = match section.get(ALLOW_FAILURE_KEY) {
            None => defaults.allow_failure,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(ConfigurationError::new(format!(
                    "'{ALLOW_FAILURE_KEY}' must be a boolean, got {other}"
                ))
                .with_service(service_name));
            }
        };

        let mut kwargs = defaults.kwargs.clone();
        match section.get(KWARGS_KEY) {
            None | Some(Value::Null) => {}
            Some(Value::Object(static_inputs)) => merge_config(&mut kwargs, static_inputs),
            Some(other) => {
                return Err(ConfigurationError::new(format!(
                    "'{KWARGS_KEY}' must be a mapping, got {other}"
                ))
                .with_service(service_name));
            }
        }

        Ok(Self {
            timeout,
            allow_failure,
            kwargs,
        })
    }
}

/// Returns the extra keyword payload configured for a lifecycle event.
pub fn event_kwargs(config: &Config, event: LifecycleEvent) -> Result<Payload, ConfigurationError> {
    Ok(section_of(config, &event.kwargs_key())?
        .cloned()
        .unwrap_or_default())
}

fn section_of<'a>(config: &'a Config, key: &str) -> Result<Option<&'a Config>, ConfigurationError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(section)) => Ok(Some(section)),
        Some(other) => Err(ConfigurationError::new(format!(
            "configuration section '{key}' must be a mapping, got {other}"
        ))),
    }
}

fn parse_timeout(value: &Value, service_name: &str) -> Result<Duration, ConfigurationError> {
    let invalid = || {
        ConfigurationError::new(format!(
            "'{TIMEOUT_KEY}' must be a non-negative number of seconds, got {value}"
        ))
        .with_service(service_name)
    };

    let seconds = value.as_f64().ok_or_else(invalid)?;
    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}
