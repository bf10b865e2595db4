//! # Call Route Core - Call Audio Routing
//!
//! Puts a device's audio subsystem into call mode for a voice call and takes
//! it back out when the call ends:
//! - **controller**: the call audio session lifecycle (`start`, `set_speaker`, `stop`)
//! - **focus**: audio focus negotiation and platform focus notifications
//! - **platform**: the platform audio service traits plus an in-memory simulation
//! - **bridge**: the async, application-facing surface
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use callroute_core::{AudioSessionController, CallAudioConfig, SimulatedPlatform};
//!
//! let platform = Arc::new(SimulatedPlatform::new().with_max_volume(10));
//! let controller = AudioSessionController::new(platform.clone(), CallAudioConfig::default())?;
//!
//! let report = controller.start()?;
//! assert_eq!(report.volume.target, 8);
//!
//! controller.set_speaker(true)?;
//! assert!(controller.route_is_speaker());
//!
//! controller.stop()?;
//! assert!(!platform.speakerphone_on());
//! # Ok::<(), callroute_core::AudioError>(())
//! ```
//!
//! ## Architecture
//!
//! The controller owns exactly one session slot and one [`FocusArbiter`].
//! Platform primitives are synchronous; [`CallAudioBridge`] runs controller
//! operations on the blocking pool and owns the task that feeds focus
//! notifications into the arbiter.

pub mod error;
pub mod platform;
pub mod focus;
pub mod session;
pub mod volume;
pub mod config;
pub mod events;
pub mod controller;
pub mod bridge;

pub use error::{AudioError, AudioResult, ERROR_CODE};
pub use platform::{
    AudioMode, AudioPlatform, NoAudioService, PlatformCall, PlatformCapabilities, PlatformError,
    PlatformOperation, PlatformProvider, SimulatedPlatform, StreamType, VolumeFlags,
};
pub use focus::{
    FocusApi, FocusArbiter, FocusChange, FocusKind, FocusNotification, FocusOutcome, FocusSnapshot, FocusState,
};
pub use session::{CallAudioSession, OutputRoute, SessionState};
pub use volume::{VolumePolicy, VolumeReport, VolumeRounding};
pub use config::{CallAudioConfig, RoutingPolicy};
pub use events::{CallAudioEvent, EventStream};
pub use controller::{AudioSessionController, StartReport, StartWarning};
pub use bridge::{AudioRoutingApi, BridgeError, BridgeResult, CallAudioBridge};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
