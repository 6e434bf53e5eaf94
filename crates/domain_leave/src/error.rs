//! Leave domain errors

use thiserror::Error;

use core_kernel::{LeaveId, PortError, TemporalError};

/// Errors that can occur in the leave domain
#[derive(Debug, Error)]
pub enum LeaveError {
    /// Dates or commands outside the domain (e.g. end before start)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Leave record not found
    #[error("Leave record not found: {0}")]
    NotFound(LeaveId),

    /// Storage failure
    #[error(transparent)]
    Port(PortError),
}

impl LeaveError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        LeaveError::InvalidInput(message.into())
    }
}

impl From<TemporalError> for LeaveError {
    fn from(err: TemporalError) -> Self {
        LeaveError::InvalidInput(err.to_string())
    }
}

impl From<PortError> for LeaveError {
    fn from(err: PortError) -> Self {
        if let PortError::NotFound { id, .. } = &err {
            if let Ok(leave_id) = id.parse() {
                return LeaveError::NotFound(leave_id);
            }
        }
        LeaveError::Port(err)
    }
}
