//! Platform audio service abstraction
//!
//! The telephony/media stack is consumed through a handful of synchronous
//! primitives: focus request/abandon, audio mode, speakerphone route and
//! stream volume. Each concern has its own trait; [`AudioPlatform`] is the
//! union a controller is built on.
//!
//! ```text
//! ┌──────────────────────┐    ┌──────────────────────┐
//! │ SessionController    │───▶│ ModeService          │
//! │                      │───▶│ RouteService         │
//! │                      │───▶│ VolumeService        │
//! └──────────┬───────────┘    └──────────────────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐    ┌──────────────────────┐
//! │ FocusArbiter         │───▶│ FocusPrimitives      │
//! │ (FocusService impl)  │◄───│ FocusListener events │
//! └──────────────────────┘    └──────────────────────┘
//! ```
//!
//! Platforms that cannot hand out an audio service at all are modelled by a
//! [`PlatformProvider`] returning `None`.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::focus::{FocusKind, FocusListener, FocusRequest};

pub mod simulated;

pub use simulated::{PlatformCall, SimulatedPlatform};

/// Process-wide audio mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioMode {
    /// Regular media playback
    Normal,
    /// Two-way voice communication (call audio)
    InCommunication,
}

impl fmt::Display for AudioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioMode::Normal => write!(f, "normal"),
            AudioMode::InCommunication => write!(f, "in_communication"),
        }
    }
}

/// Audio stream whose volume is controlled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    /// Call audio
    VoiceCall,
    /// Ringtone
    Ring,
    /// Media playback
    Music,
}

/// Flags passed along with a volume change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeFlags(u32);

impl VolumeFlags {
    /// No side effects
    pub const NONE: VolumeFlags = VolumeFlags(0);
    /// Show the platform volume UI
    pub const SHOW_UI: VolumeFlags = VolumeFlags(1);
    /// Play a feedback tone
    pub const PLAY_SOUND: VolumeFlags = VolumeFlags(1 << 2);

    /// Raw flag bits
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub fn contains(self, other: VolumeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for VolumeFlags {
    type Output = VolumeFlags;

    fn bitor(self, rhs: VolumeFlags) -> VolumeFlags {
        VolumeFlags(self.0 | rhs.0)
    }
}

/// What the platform supports, sampled once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    /// Request-object focus API is available (otherwise stream + listener API)
    pub focus_requests: bool,
    /// Volume is fixed; graduated volume changes are not supported
    pub fixed_volume: bool,
}

impl Default for PlatformCapabilities {
    fn default() -> Self {
        Self {
            focus_requests: true,
            fixed_volume: false,
        }
    }
}

/// Platform primitive identifiers, used in errors and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformOperation {
    RequestFocus,
    AbandonFocus,
    SetMode,
    SetSpeakerphone,
    GetMaxVolume,
    GetCurrentVolume,
    SetVolume,
}

impl PlatformOperation {
    /// Stable name of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformOperation::RequestFocus => "request_focus",
            PlatformOperation::AbandonFocus => "abandon_focus",
            PlatformOperation::SetMode => "set_mode",
            PlatformOperation::SetSpeakerphone => "set_speakerphone",
            PlatformOperation::GetMaxVolume => "get_max_volume",
            PlatformOperation::GetCurrentVolume => "get_current_volume",
            PlatformOperation::SetVolume => "set_volume",
        }
    }
}

impl fmt::Display for PlatformOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A platform primitive threw or returned an error code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} failed: {message}")]
pub struct PlatformError {
    pub operation: PlatformOperation,
    pub message: String,
}

impl PlatformError {
    pub fn new(operation: PlatformOperation, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Result type for platform primitives
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Raw answer of a platform focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusResponse {
    Granted,
    Failed,
}

/// Focus request/abandon primitives.
///
/// Platforms expose two API generations: a request-object API and an older
/// stream + listener API. Both are listed here; a [`crate::focus::FocusService`]
/// picks one of them once.
pub trait FocusPrimitives: Send + Sync {
    /// Request focus with a request object carrying the listener
    fn request_audio_focus(&self, request: &FocusRequest) -> PlatformResult<FocusResponse>;

    /// Abandon a focus request previously issued with [`Self::request_audio_focus`]
    fn abandon_audio_focus_request(&self, request: &FocusRequest) -> PlatformResult<()>;

    /// Request focus for a stream type with a bare listener
    fn request_stream_focus(
        &self,
        listener: &FocusListener,
        stream: StreamType,
        kind: FocusKind,
    ) -> PlatformResult<FocusResponse>;

    /// Abandon focus held through [`Self::request_stream_focus`]
    fn abandon_stream_focus(&self, listener: &FocusListener) -> PlatformResult<()>;
}

/// Audio mode primitive
pub trait ModeService: Send + Sync {
    fn set_mode(&self, mode: AudioMode) -> PlatformResult<()>;
}

/// Output route primitive
pub trait RouteService: Send + Sync {
    fn set_speakerphone_on(&self, on: bool) -> PlatformResult<()>;
}

/// Stream volume primitives
pub trait VolumeService: Send + Sync {
    fn max_volume(&self, stream: StreamType) -> PlatformResult<u32>;

    /// Current volume, `None` when the platform does not expose a reading
    fn current_volume(&self, stream: StreamType) -> PlatformResult<Option<u32>>;

    fn set_volume(&self, stream: StreamType, value: u32, flags: VolumeFlags) -> PlatformResult<()>;
}

/// Everything the controller needs from the platform audio service
pub trait AudioPlatform: FocusPrimitives + ModeService + RouteService + VolumeService {
    fn capabilities(&self) -> PlatformCapabilities;
}

/// Source of the platform audio service.
///
/// Returns `None` when the service handle cannot be obtained; controllers built
/// from such a provider fail every operation with `ServiceUnavailable`.
pub trait PlatformProvider {
    fn audio_service(&self) -> Option<Arc<dyn AudioPlatform>>;
}

impl<P: AudioPlatform + 'static> PlatformProvider for Arc<P> {
    fn audio_service(&self) -> Option<Arc<dyn AudioPlatform>> {
        let platform: Arc<dyn AudioPlatform> = self.clone();
        Some(platform)
    }
}

/// Provider for environments without an audio service
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAudioService;

impl PlatformProvider for NoAudioService {
    fn audio_service(&self) -> Option<Arc<dyn AudioPlatform>> {
        None
    }
}
