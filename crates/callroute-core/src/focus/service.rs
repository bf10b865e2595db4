//! Focus service implementations
//!
//! The platform offers two focus API generations. Each gets one
//! [`FocusService`] implementation and the choice is made once, when the
//! controller is built, instead of branching on every request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FocusGrant, FocusHandle, FocusKind, FocusListener, FocusRequest};
use crate::platform::{AudioPlatform, FocusResponse, PlatformResult, StreamType};

/// Which focus API to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusApi {
    /// Pick from the platform capabilities
    #[default]
    Auto,
    /// Request-object API
    Request,
    /// Stream + listener API
    Stream,
}

/// Requests and abandons platform audio focus
pub trait FocusService: Send + Sync {
    /// API generation this service talks to
    fn api(&self) -> FocusApi;

    /// Single synchronous focus request
    fn request(&self, kind: FocusKind, listener: &FocusListener) -> PlatformResult<FocusGrant>;

    /// Give a granted focus back to the platform
    fn abandon(&self, handle: FocusHandle) -> PlatformResult<()>;
}

/// Focus through request objects
pub struct RequestFocusService {
    platform: Arc<dyn AudioPlatform>,
    stream: StreamType,
    next_request_id: AtomicU64,
}

impl RequestFocusService {
    pub fn new(platform: Arc<dyn AudioPlatform>, stream: StreamType) -> Self {
        Self {
            platform,
            stream,
            next_request_id: AtomicU64::new(1),
        }
    }
}

impl FocusService for RequestFocusService {
    fn api(&self) -> FocusApi {
        FocusApi::Request
    }

    fn request(&self, kind: FocusKind, listener: &FocusListener) -> PlatformResult<FocusGrant> {
        let request = FocusRequest {
            id: self.next_request_id.fetch_add(1, Ordering::Relaxed),
            kind,
            stream: self.stream,
            listener: listener.clone(),
        };
        debug!(request_id = request.id, ?kind, "requesting audio focus");

        match self.platform.request_audio_focus(&request)? {
            FocusResponse::Granted => Ok(FocusGrant::Granted(FocusHandle::for_request(request))),
            FocusResponse::Failed => Ok(FocusGrant::Denied),
        }
    }

    fn abandon(&self, handle: FocusHandle) -> PlatformResult<()> {
        match handle.request() {
            Some(request) => self.platform.abandon_audio_focus_request(request),
            // Handle minted by the stream API; abandon it the way it was obtained
            None => self.platform.abandon_stream_focus(handle.listener()),
        }
    }
}

/// Focus through stream type + listener
pub struct StreamFocusService {
    platform: Arc<dyn AudioPlatform>,
    stream: StreamType,
}

impl StreamFocusService {
    pub fn new(platform: Arc<dyn AudioPlatform>, stream: StreamType) -> Self {
        Self { platform, stream }
    }
}

impl FocusService for StreamFocusService {
    fn api(&self) -> FocusApi {
        FocusApi::Stream
    }

    fn request(&self, kind: FocusKind, listener: &FocusListener) -> PlatformResult<FocusGrant> {
        debug!(listener_id = listener.id(), ?kind, stream = ?self.stream, "requesting stream audio focus");

        match self.platform.request_stream_focus(listener, self.stream, kind)? {
            FocusResponse::Granted => Ok(FocusGrant::Granted(FocusHandle::for_listener(listener.clone()))),
            FocusResponse::Failed => Ok(FocusGrant::Denied),
        }
    }

    fn abandon(&self, handle: FocusHandle) -> PlatformResult<()> {
        self.platform.abandon_stream_focus(handle.listener())
    }
}

/// Build the focus service for `api`, resolving `Auto` from the platform capabilities
pub fn select_focus_service(
    platform: Arc<dyn AudioPlatform>,
    api: FocusApi,
    stream: StreamType,
) -> Arc<dyn FocusService> {
    let resolved = match api {
        FocusApi::Auto if platform.capabilities().focus_requests => FocusApi::Request,
        FocusApi::Auto => FocusApi::Stream,
        explicit => explicit,
    };
    debug!(requested = ?api, ?resolved, "selected focus service");

    match resolved {
        FocusApi::Stream => Arc::new(StreamFocusService::new(platform, stream)),
        _ => Arc::new(RequestFocusService::new(platform, stream)),
    }
}
