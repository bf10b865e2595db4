//! Call audio session state
//!
//! A [`CallAudioSession`] lives for one call. It starts `Idle`, becomes
//! `Active` after a successful start and ends in `Ended`; an ended session is
//! never reactivated, the controller builds a fresh one instead.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::volume::VolumeReport;

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, call audio not yet applied
    #[default]
    Idle,
    /// Call audio mode, route and volume applied
    Active,
    /// Stopped or failed during start; never reactivated
    Ended,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Active => write!(f, "active"),
            SessionState::Ended => write!(f, "ended"),
        }
    }
}

/// Output path for call audio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRoute {
    /// Receiver held to the ear
    #[default]
    Earpiece,
    /// Loudspeaker
    Speaker,
}

impl OutputRoute {
    /// Route for a speakerphone flag
    pub fn from_speaker(enabled: bool) -> Self {
        if enabled {
            OutputRoute::Speaker
        } else {
            OutputRoute::Earpiece
        }
    }

    /// Whether this route needs the speakerphone on
    pub fn is_speaker(self) -> bool {
        self == OutputRoute::Speaker
    }
}

/// State of the single call audio session
#[derive(Debug, Clone)]
pub struct CallAudioSession {
    /// Unique session identifier
    id: Uuid,
    state: SessionState,
    /// Defined only while `Active`
    route: Option<OutputRoute>,
    /// Volume applied by `start`
    volume: Option<VolumeReport>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl CallAudioSession {
    /// Create an idle session with a fresh id
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            route: None,
            volume: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Get the session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if call audio is currently applied
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Current output route, `None` outside `Active`
    pub fn route(&self) -> Option<OutputRoute> {
        self.route
    }

    /// `false` whenever no route is defined
    pub fn route_is_speaker(&self) -> bool {
        self.route.is_some_and(OutputRoute::is_speaker)
    }

    /// Volume readings and target of the successful start, kept after `end`
    pub fn volume(&self) -> Option<&VolumeReport> {
        self.volume.as_ref()
    }

    /// When the session became active
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// When the session ended
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Idle → Active
    pub(crate) fn activate(&mut self, route: OutputRoute, volume: VolumeReport) {
        debug_assert_eq!(self.state, SessionState::Idle, "only idle sessions can be activated");
        self.route = Some(route);
        self.volume = Some(volume);
        self.started_at = Some(Utc::now());
        self.update_state(SessionState::Active);
    }

    /// Record a route change; ignored unless active
    pub(crate) fn set_route(&mut self, route: OutputRoute) -> bool {
        if !self.is_active() {
            return false;
        }
        self.route = Some(route);
        true
    }

    /// Move to `Ended` and drop the route
    pub(crate) fn end(&mut self) {
        self.route = None;
        self.ended_at = Some(Utc::now());
        self.update_state(SessionState::Ended);
    }

    fn update_state(&mut self, new_state: SessionState) {
        let old_state = self.state;
        self.state = new_state;
        debug!("Call audio session {} state: {} -> {}", self.id, old_state, new_state);
    }
}

impl Default for CallAudioSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> VolumeReport {
        VolumeReport {
            max: 10,
            current: Some(3),
            target: 8,
            scaled: true,
        }
    }

    #[test]
    fn test_new_session_is_idle_without_route() {
        let session = CallAudioSession::new();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.route(), None);
        assert!(!session.route_is_speaker());
    }

    #[test]
    fn test_route_only_recorded_while_active() {
        let mut session = CallAudioSession::new();
        assert!(!session.set_route(OutputRoute::Speaker));
        assert!(!session.route_is_speaker());

        session.activate(OutputRoute::Earpiece, report());
        assert!(session.set_route(OutputRoute::Speaker));
        assert!(session.route_is_speaker());
        assert!(session.started_at().is_some());
    }

    #[test]
    fn test_end_clears_route() {
        let mut session = CallAudioSession::new();
        session.activate(OutputRoute::Speaker, report());
        session.end();

        assert_eq!(session.state(), SessionState::Ended);
        assert_eq!(session.route(), None);
        assert!(session.ended_at().is_some());
        assert_eq!(session.volume().map(|v| v.target), Some(8));
    }

    #[test]
    fn test_route_from_speaker_flag() {
        assert_eq!(OutputRoute::from_speaker(true), OutputRoute::Speaker);
        assert_eq!(OutputRoute::from_speaker(false), OutputRoute::Earpiece);
    }
}
