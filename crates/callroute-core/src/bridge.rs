//! Application-facing async surface
//!
//! [`CallAudioBridge`] exposes the three call audio operations to the UI layer
//! as futures that resolve exactly once: `Ok(true)` on success or a
//! [`BridgeError`] carrying the fixed `"ERROR"` code and a message.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::controller::AudioSessionController;
use crate::error::{AudioError, AudioResult, ERROR_CODE};

/// Result type of the application surface
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Failure rendered to the application layer
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct BridgeError {
    pub code: String,
    pub message: String,
}

impl BridgeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: ERROR_CODE.to_string(),
            message: message.into(),
        }
    }

    /// JSON payload for hosts that forward errors as text
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"code\":\"{}\"}}", self.code))
    }
}

impl From<AudioError> for BridgeError {
    fn from(err: AudioError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Call audio operations as seen by the application
#[async_trait]
pub trait AudioRoutingApi: Send + Sync {
    /// Route call audio to the loudspeaker (`true`) or earpiece (`false`)
    async fn set_speaker_on(&self, enabled: bool) -> BridgeResult<bool>;

    /// Enter call audio
    async fn start_audio_routing(&self) -> BridgeResult<bool>;

    /// Leave call audio
    async fn stop_audio_routing(&self) -> BridgeResult<bool>;
}

/// Async bridge over an [`AudioSessionController`]
pub struct CallAudioBridge {
    controller: Arc<AudioSessionController>,
    listener_task: Option<JoinHandle<()>>,
}

impl CallAudioBridge {
    /// Wrap `controller` and, inside a tokio runtime, start the focus
    /// listener task
    pub fn new(controller: Arc<AudioSessionController>) -> Self {
        let listener_task = match tokio::runtime::Handle::try_current() {
            Ok(_) => controller.arbiter().and_then(|arbiter| arbiter.spawn_listener()),
            Err(_) => {
                debug!("no tokio runtime; focus notifications must be drained manually");
                None
            }
        };

        Self {
            controller,
            listener_task,
        }
    }

    pub fn controller(&self) -> &Arc<AudioSessionController> {
        &self.controller
    }

    /// Whether a listener task consumes focus notifications
    pub fn has_listener(&self) -> bool {
        self.listener_task.is_some()
    }

    async fn run<F>(&self, operation: &'static str, f: F) -> BridgeResult<bool>
    where
        F: FnOnce(&AudioSessionController) -> AudioResult<()> + Send + 'static,
    {
        let controller = self.controller.clone();
        let joined = tokio::task::spawn_blocking(move || f(controller.as_ref())).await;

        match joined {
            Ok(Ok(())) => Ok(true),
            Ok(Err(e)) => {
                debug!(operation, error = %e, "call audio operation rejected");
                Err(e.into())
            }
            Err(e) => {
                error!(operation, error = %e, "call audio operation did not complete");
                Err(BridgeError::new(format!("{} did not complete: {}", operation, e)))
            }
        }
    }
}

#[async_trait]
impl AudioRoutingApi for CallAudioBridge {
    async fn set_speaker_on(&self, enabled: bool) -> BridgeResult<bool> {
        self.run("set_speaker_on", move |controller| controller.set_speaker(enabled))
            .await
    }

    async fn start_audio_routing(&self) -> BridgeResult<bool> {
        self.run("start_audio_routing", |controller| controller.start().map(|_| ()))
            .await
    }

    async fn stop_audio_routing(&self) -> BridgeResult<bool> {
        self.run("stop_audio_routing", |controller| controller.stop()).await
    }
}

impl Drop for CallAudioBridge {
    fn drop(&mut self) {
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CallAudioConfig;
    use crate::platform::NoAudioService;

    #[test]
    fn test_error_payload() {
        let err: BridgeError = AudioError::ServiceUnavailable.into();
        assert_eq!(err.code, "ERROR");
        assert_eq!(err.message, "Audio service not available");
        assert_eq!(err.to_json(), r#"{"code":"ERROR","message":"Audio service not available"}"#);
    }

    #[test]
    fn test_new_outside_runtime_has_no_listener() {
        let controller = Arc::new(
            AudioSessionController::from_provider(&NoAudioService, CallAudioConfig::default()).unwrap(),
        );
        let bridge = CallAudioBridge::new(controller);
        assert!(!bridge.has_listener());
    }

    #[tokio::test]
    async fn test_unavailable_service_rejects_every_call() {
        let controller = Arc::new(
            AudioSessionController::from_provider(&NoAudioService, CallAudioConfig::default()).unwrap(),
        );
        let bridge = CallAudioBridge::new(controller);

        for result in [
            bridge.start_audio_routing().await,
            bridge.set_speaker_on(true).await,
            bridge.stop_audio_routing().await,
        ] {
            assert_eq!(result.unwrap_err().code, ERROR_CODE);
        }
    }
}
