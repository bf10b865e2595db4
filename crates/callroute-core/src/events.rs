//! Event system for call audio routing
//!
//! Lifecycle, route and focus changes are published on a broadcast channel.
//! Publishing never blocks and never fails the operation that emits the
//! event; slow subscribers simply lag.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::focus::{FocusOutcome, FocusState};
use crate::session::OutputRoute;

/// Events emitted by the controller and the focus arbiter
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallAudioEvent {
    /// Call audio is active
    SessionStarted {
        session_id: Uuid,
        route: OutputRoute,
        focus: FocusOutcome,
        target_volume: u32,
        at: DateTime<Utc>,
    },

    /// `start` failed and the session was ended
    StartFailed {
        session_id: Uuid,
        reason: String,
        at: DateTime<Utc>,
    },

    /// Output route changed during an active session
    RouteChanged {
        session_id: Uuid,
        route: OutputRoute,
        at: DateTime<Utc>,
    },

    /// Focus state transition
    FocusChanged {
        from: FocusState,
        to: FocusState,
        at: DateTime<Utc>,
    },

    /// Call audio stopped
    SessionEnded {
        session_id: Uuid,
        at: DateTime<Utc>,
    },
}

/// Stream of events for one subscriber
pub type EventStream = broadcast::Receiver<CallAudioEvent>;

/// Cloneable publishing side of the event channel
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<CallAudioEvent>,
}

impl EventEmitter {
    /// `capacity` must be non-zero
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn emit(&self, event: CallAudioEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> EventStream {
        self.tx.subscribe()
    }
}
