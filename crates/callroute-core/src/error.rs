//! Error types for call audio routing

use thiserror::Error;
use uuid::Uuid;

use crate::platform::{PlatformError, PlatformOperation};

/// Fixed error code rendered across the application boundary
pub const ERROR_CODE: &str = "ERROR";

/// Result type for call audio operations
pub type AudioResult<T> = Result<T, AudioError>;

/// Errors that can occur while routing call audio
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    /// The platform audio service could not be obtained at construction
    #[error("Audio service not available")]
    ServiceUnavailable,

    /// A platform primitive failed
    #[error("Platform call {operation} failed: {message}")]
    PlatformCallFailure {
        operation: PlatformOperation,
        message: String,
    },

    /// `start` was called while a session is already active
    #[error("Call audio session {session_id} is already active")]
    AlreadyActive { session_id: Uuid },

    /// `start` was called while another `start` is still running
    #[error("Call audio start already in progress")]
    StartInProgress,

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl AudioError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a platform call failure
    pub fn platform(operation: PlatformOperation, message: impl Into<String>) -> Self {
        Self::PlatformCallFailure {
            operation,
            message: message.into(),
        }
    }

    /// Error code exposed to the application layer.
    ///
    /// Callers can only branch on success vs failure, so every kind maps to
    /// the same code.
    pub fn code(&self) -> &'static str {
        ERROR_CODE
    }

    /// Whether this error rejected a duplicate `start`
    pub fn is_start_rejection(&self) -> bool {
        matches!(self, Self::AlreadyActive { .. } | Self::StartInProgress)
    }
}

impl From<PlatformError> for AudioError {
    fn from(err: PlatformError) -> Self {
        Self::PlatformCallFailure {
            operation: err.operation,
            message: err.message,
        }
    }
}
