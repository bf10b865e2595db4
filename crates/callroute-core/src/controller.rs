//! Audio Session Controller
//!
//! Owns the call audio lifecycle and drives the platform:
//!
//! ```text
//! start()                      set_speaker(on)             stop()
//!   │                            │                           │
//!   ├─ FocusArbiter::acquire     ├─ set_mode(InCommunication)├─ FocusArbiter::release
//!   ├─ set_mode(InCommunication) └─ set_speakerphone_on(on)  ├─ set_mode(Normal)
//!   ├─ set_speakerphone_on(default route)                    └─ set_speakerphone_on(false)
//!   └─ max/current volume, set_volume(target)
//! ```
//!
//! Denied focus degrades `start` but never fails it: call audio matters more
//! than focus on platforms that allow concurrent playback. A failing mode
//! change is fatal. Focus release problems never fail `stop`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::{CallAudioConfig, RoutingPolicy};
use crate::error::{AudioError, AudioResult};
use crate::events::{CallAudioEvent, EventEmitter, EventStream};
use crate::focus::{select_focus_service, FocusArbiter, FocusOutcome, FocusSnapshot};
use crate::platform::{AudioMode, AudioPlatform, PlatformProvider, PlatformResult};
use crate::session::{CallAudioSession, OutputRoute, SessionState};
use crate::volume::VolumeReport;

/// Degraded-but-successful outcomes of `start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartWarning {
    /// The platform refused focus; call audio runs without it
    FocusDenied,
    /// The focus request itself failed; call audio runs without focus
    FocusRequestFailed { message: String },
}

/// What a successful `start` did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReport {
    pub session_id: Uuid,
    pub focus: FocusOutcome,
    pub route: OutputRoute,
    pub volume: VolumeReport,
    pub warnings: Vec<StartWarning>,
}

struct Backend {
    platform: Arc<dyn AudioPlatform>,
    arbiter: Arc<FocusArbiter>,
}

/// Resets the in-flight flag when `start` returns
struct StartGuard<'a>(&'a AtomicBool);

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Controller for the call audio session
pub struct AudioSessionController {
    /// `None` when the platform audio service was unavailable at construction
    backend: Option<Backend>,
    config: CallAudioConfig,
    session: Mutex<CallAudioSession>,
    starting: AtomicBool,
    events: EventEmitter,
}

impl AudioSessionController {
    /// Build a controller on top of `platform`
    pub fn new(platform: Arc<dyn AudioPlatform>, config: CallAudioConfig) -> AudioResult<Self> {
        config.validate()?;
        let events = EventEmitter::new(config.event_capacity);
        let service = select_focus_service(platform.clone(), config.focus_api, config.call_stream);
        let arbiter = Arc::new(FocusArbiter::new(service, config.focus_kind, events.clone()));

        info!(focus_api = ?arbiter.api(), "call audio controller ready");

        Ok(Self {
            backend: Some(Backend { platform, arbiter }),
            config,
            session: Mutex::new(CallAudioSession::new()),
            starting: AtomicBool::new(false),
            events,
        })
    }

    /// Build a controller from a provider that may not have an audio service
    pub fn from_provider(provider: &dyn PlatformProvider, config: CallAudioConfig) -> AudioResult<Self> {
        match provider.audio_service() {
            Some(platform) => Self::new(platform, config),
            None => {
                config.validate()?;
                warn!("audio service not available; every call audio operation will fail");
                Ok(Self {
                    backend: None,
                    events: EventEmitter::new(config.event_capacity),
                    config,
                    session: Mutex::new(CallAudioSession::new()),
                    starting: AtomicBool::new(false),
                })
            }
        }
    }

    /// Enter call audio: focus, mode, default route, volume.
    pub fn start(&self) -> AudioResult<StartReport> {
        let backend = self.backend()?;

        if self
            .starting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("rejecting start: another start is in progress");
            return Err(AudioError::StartInProgress);
        }
        let _guard = StartGuard(&self.starting);

        let mut session = self.session.lock();
        if session.is_active() {
            warn!(session_id = %session.id(), "rejecting start: session already active");
            return Err(AudioError::AlreadyActive {
                session_id: session.id(),
            });
        }
        if session.state() == SessionState::Ended {
            *session = CallAudioSession::new();
        }

        let span = info_span!("call_audio_start", session_id = %session.id());
        let _enter = span.enter();

        let policy = self.config.policy;
        let mut warnings = Vec::new();

        let focus = if policy.negotiate_focus {
            match backend.arbiter.acquire() {
                Ok(FocusOutcome::Denied) => {
                    warn!("starting call audio without audio focus");
                    warnings.push(StartWarning::FocusDenied);
                    FocusOutcome::Denied
                }
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "audio focus request failed; starting call audio without focus");
                    warnings.push(StartWarning::FocusRequestFailed { message: e.to_string() });
                    FocusOutcome::Failed
                }
            }
        } else {
            debug!("focus negotiation disabled by policy");
            FocusOutcome::NotNegotiated
        };

        if let Err(e) = backend.platform.set_mode(AudioMode::InCommunication) {
            error!(error = %e, "failed to enter call audio mode");
            self.abort_start(backend, &mut session, false, &e.to_string());
            return Err(e.into());
        }

        let route = policy.default_route;
        let route_result = backend.platform.set_speakerphone_on(route.is_speaker());
        let volume_result = self.normalize_volume(backend.platform.as_ref());

        let volume = match (route_result, volume_result) {
            (Ok(()), Ok(volume)) => volume,
            (Err(e), _) | (Ok(()), Err(e)) => {
                error!(error = %e, "failed to apply call audio route/volume");
                self.abort_start(backend, &mut session, true, &e.to_string());
                return Err(e.into());
            }
        };

        session.activate(route, volume);
        self.events.emit(CallAudioEvent::SessionStarted {
            session_id: session.id(),
            route,
            focus,
            target_volume: volume.target,
            at: Utc::now(),
        });
        info!(?route, ?focus, volume = volume.target, "call audio routing started");

        Ok(StartReport {
            session_id: session.id(),
            focus,
            route,
            volume,
            warnings,
        })
    }

    /// Switch between loudspeaker and earpiece.
    ///
    /// Allowed in any state; outside an active session the platform is still
    /// updated but nothing is recorded.
    pub fn set_speaker(&self, enabled: bool) -> AudioResult<()> {
        let backend = self.backend()?;
        let mut session = self.session.lock();

        if !session.is_active() {
            warn!(state = %session.state(), enabled, "speaker route changed outside an active call session");
        }

        // Route setting only takes effect in call audio mode
        backend.platform.set_mode(AudioMode::InCommunication)?;
        backend.platform.set_speakerphone_on(enabled)?;

        let route = OutputRoute::from_speaker(enabled);
        if session.set_route(route) {
            self.events.emit(CallAudioEvent::RouteChanged {
                session_id: session.id(),
                route,
                at: Utc::now(),
            });
        }
        info!(session_id = %session.id(), speaker = enabled, "speaker set");
        Ok(())
    }

    /// Leave call audio. Idempotent.
    pub fn stop(&self) -> AudioResult<()> {
        let backend = self.backend()?;
        let mut session = self.session.lock();
        let was_active = session.is_active();

        if let Err(e) = backend.arbiter.release() {
            warn!(error = %e, "failed to release audio focus; ending call audio anyway");
        }

        let mode_result = backend.platform.set_mode(AudioMode::Normal);
        let route_result = backend.platform.set_speakerphone_on(false);

        if was_active {
            session.end();
            self.events.emit(CallAudioEvent::SessionEnded {
                session_id: session.id(),
                at: Utc::now(),
            });
            info!(session_id = %session.id(), "call audio routing stopped");
        } else {
            debug!(state = %session.state(), "stop without an active session");
        }

        match mode_result.and(route_result) {
            Err(e) if was_active => Err(e.into()),
            Err(e) => {
                debug!(error = %e, "ignoring platform failure while stopping an inactive session");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state()
    }

    /// `true` only while an active session routes to the loudspeaker
    pub fn route_is_speaker(&self) -> bool {
        self.session.lock().route_is_speaker()
    }

    pub fn session_id(&self) -> Uuid {
        self.session.lock().id()
    }

    /// Copy of the current session
    pub fn session(&self) -> CallAudioSession {
        self.session.lock().clone()
    }

    /// Volume applied by the last successful `start`
    pub fn last_volume(&self) -> Option<VolumeReport> {
        self.session.lock().volume().copied()
    }

    /// Focus state; default (`NotRequested`) when the service is unavailable
    pub fn focus_snapshot(&self) -> FocusSnapshot {
        self.backend
            .as_ref()
            .map(|backend| backend.arbiter.snapshot())
            .unwrap_or_default()
    }

    pub fn arbiter(&self) -> Option<&Arc<FocusArbiter>> {
        self.backend.as_ref().map(|backend| &backend.arbiter)
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.config.policy
    }

    pub fn config(&self) -> &CallAudioConfig {
        &self.config
    }

    pub fn subscribe(&self) -> EventStream {
        self.events.subscribe()
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    fn backend(&self) -> AudioResult<&Backend> {
        self.backend.as_ref().ok_or(AudioError::ServiceUnavailable)
    }

    fn normalize_volume(&self, platform: &dyn AudioPlatform) -> PlatformResult<VolumeReport> {
        let stream = self.config.call_stream;
        let fixed_volume = platform.capabilities().fixed_volume;

        let max = platform.max_volume(stream)?;
        let current = match platform.current_volume(stream) {
            Ok(current) => current,
            Err(e) => {
                debug!(error = %e, "current volume unavailable");
                None
            }
        };
        debug!(?current, max, "call stream volume");

        let volume_policy = self.config.policy.volume;
        let target = volume_policy.target(max, fixed_volume);
        platform.set_volume(stream, target, self.config.volume_flags)?;

        Ok(VolumeReport {
            max,
            current,
            target,
            scaled: volume_policy.is_scaled() && !fixed_volume,
        })
    }

    /// Tear down after a fatal `start` failure
    fn abort_start(&self, backend: &Backend, session: &mut CallAudioSession, restore_mode: bool, reason: &str) {
        if let Err(e) = backend.arbiter.release() {
            warn!(error = %e, "failed to release audio focus after start failure");
        }
        if restore_mode {
            if let Err(e) = backend.platform.set_mode(AudioMode::Normal) {
                warn!(error = %e, "failed to restore normal audio mode after start failure");
            }
        }

        session.end();
        self.events.emit(CallAudioEvent::StartFailed {
            session_id: session.id(),
            reason: reason.to_string(),
            at: Utc::now(),
        });
    }
}
