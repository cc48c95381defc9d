//! Pipeline identity and status.

use crate::core::PipelineStatus;
use crate::errors::InvalidStateError;
use crate::utils::generate_uuid;
use parking_lot::RwLock;
use uuid::Uuid;

/// Identity and status of a pipeline, as seen by observers.
#[derive(Debug)]
pub struct PipelineInfo {
    id: Uuid,
    name: String,
    status: RwLock<PipelineStatus>,
}

impl PipelineInfo {
    /// Creates a pending pipeline identity with a fresh id.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: generate_uuid(),
            name: name.into(),
            status: RwLock::new(PipelineStatus::Pending),
        }
    }

    /// Returns the pipeline id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        *self.status.read()
    }

    /// Moves from `from` to `to`, failing if the status is not `from`.
    pub(crate) fn transition(&self, from: PipelineStatus, to: PipelineStatus) -> Result<(), InvalidStateError> {
        let mut status = self.status.write();
        if *status != from {
            return Err(InvalidStateError::new(
                &self.name,
                *status,
                format!("expected {from} to move to {to}"),
            ));
        }
        *status = to;
        Ok(())
    }
}
