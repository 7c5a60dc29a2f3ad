use thiserror::Error;

/// Failures surfaced to whoever asked for a start or stop. Everything else is
/// absorbed inside the coordinator and at most logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("A recording session is already active")]
    AlreadyRecording,
    #[error("No recording session is active")]
    NotRecording,
    #[error("Capture provisioning failed: {0}")]
    CaptureProvisioningFailed(String),
}

impl SessionError {
    pub fn provisioning(reason: impl ToString) -> Self {
        SessionError::CaptureProvisioningFailed(reason.to_string())
    }
}
