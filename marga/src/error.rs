//! Error types for Marga

use std::time::Duration;

use thiserror::Error;

/// Marga error type
#[derive(Error, Debug)]
pub enum MargaError {
    /// Camera, step counter or compass could not be initialised or read.
    #[error("Sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// A capture was requested while another one is outstanding.
    #[error("Camera busy: another capture is in progress")]
    CameraBusy,

    #[error("Capture timed out after {0:?}")]
    CaptureTimeout(Duration),

    #[error("Capture failed: {0}")]
    Capture(String),

    /// Recovery retries exhausted; the current navigation is abandoned.
    #[error("Localization lost after {attempts} recovery attempts")]
    LocalizationLost { attempts: u32 },

    /// `finish` was requested before any segment was completed.
    #[error("Recording session has no completed segments")]
    EmptySession,

    #[error("Operation `{operation}` is not valid in state {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<toml::de::Error> for MargaError {
    fn from(e: toml::de::Error) -> Self {
        MargaError::Config(e.to_string())
    }
}

impl MargaError {
    /// Shorthand for rejecting an operation in the wrong state.
    pub fn invalid_state(operation: &'static str, state: &'static str) -> Self {
        MargaError::InvalidState { operation, state }
    }

    /// Short message suitable for speaking or displaying to the user,
    /// including a suggested retry action where one exists.
    pub fn user_message(&self) -> String {
        match self {
            MargaError::SensorUnavailable(what) => {
                format!("{} is not available. Check permissions and try again.", what)
            }
            MargaError::CameraBusy | MargaError::CaptureTimeout(_) | MargaError::Capture(_) => {
                "The camera did not respond. Hold still and try again.".to_string()
            }
            MargaError::LocalizationLost { .. } => {
                "I could not find your position on this route. Return to a known location and start again."
                    .to_string()
            }
            MargaError::EmptySession => {
                "Mark at least one checkpoint before finishing the recording.".to_string()
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MargaError>;
