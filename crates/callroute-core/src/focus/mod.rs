//! Audio focus arbitration
//!
//! Focus is requested once per call, released on stop, and in between the
//! platform may revoke or restore it at any time through a [`FocusListener`].
//! Those notifications travel over a channel into the [`FocusArbiter`], which
//! is the only writer of [`FocusState`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::platform::StreamType;

pub mod arbiter;
pub mod service;

pub use arbiter::FocusArbiter;
pub use service::{select_focus_service, FocusApi, FocusService, RequestFocusService, StreamFocusService};

/// Kind of focus requested from the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusKind {
    /// Long-lived focus
    Gain,
    /// Temporary focus; other players are asked to pause
    GainTransient,
    /// Temporary focus; system sounds are silenced as well
    GainTransientExclusive,
}

/// Asynchronous focus notification delivered by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusChange {
    /// Focus returned after a transient loss
    Gain,
    /// Another player took focus for good
    Loss,
    /// Another player took focus temporarily
    LossTransient,
    /// Temporary loss; lowered volume playback is tolerated
    LossTransientCanDuck,
}

/// Focus state owned by the arbiter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusState {
    #[default]
    NotRequested,
    Requested,
    Granted,
    LostTransient,
    LostPermanent,
}

impl fmt::Display for FocusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FocusState::NotRequested => "not_requested",
            FocusState::Requested => "requested",
            FocusState::Granted => "granted",
            FocusState::LostTransient => "lost_transient",
            FocusState::LostPermanent => "lost_permanent",
        };
        f.write_str(name)
    }
}

/// Read-only view of the arbiter state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusSnapshot {
    pub state: FocusState,
    /// A platform focus handle is currently held
    pub holds_handle: bool,
}

impl FocusSnapshot {
    /// Whether focus is currently held
    pub fn is_granted(&self) -> bool {
        self.state == FocusState::Granted
    }
}

/// Outcome of a focus acquisition as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusOutcome {
    Granted,
    Denied,
    /// The request itself failed on the platform
    Failed,
    /// Focus negotiation is disabled by policy
    NotNegotiated,
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Focus change tagged with the listener the platform delivered it to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusNotification {
    pub listener_id: u64,
    pub change: FocusChange,
}

/// Callback endpoint handed to the platform for focus notifications.
///
/// Cloning keeps the same identity; `notify` may be called from any thread.
#[derive(Clone)]
pub struct FocusListener {
    id: u64,
    tx: mpsc::UnboundedSender<FocusNotification>,
}

impl FocusListener {
    /// Create a listener together with the receiving end of its channel
    pub fn channel() -> (FocusListener, mpsc::UnboundedReceiver<FocusNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (FocusListener::with_sender(tx), rx)
    }

    fn with_sender(tx: mpsc::UnboundedSender<FocusNotification>) -> Self {
        FocusListener {
            id: NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed),
            tx,
        }
    }

    /// New identity delivering into the same channel
    pub fn rebind(&self) -> FocusListener {
        FocusListener::with_sender(self.tx.clone())
    }

    /// Identity carried by every notification this listener delivers
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Deliver a notification. Returns `false` once the arbiter is gone.
    pub fn notify(&self, change: FocusChange) -> bool {
        self.tx
            .send(FocusNotification {
                listener_id: self.id,
                change,
            })
            .is_ok()
    }
}

impl fmt::Debug for FocusListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FocusListener").field("id", &self.id).finish()
    }
}

impl PartialEq for FocusListener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FocusListener {}

/// Request object for the request-based focus API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusRequest {
    pub id: u64,
    pub kind: FocusKind,
    /// Stream the focus is requested for (audio attributes usage)
    pub stream: StreamType,
    pub listener: FocusListener,
}

/// Opaque token proving a focus grant; needed to abandon it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusHandle(HandleToken);

#[derive(Debug, Clone, PartialEq, Eq)]
enum HandleToken {
    Request(FocusRequest),
    Listener(FocusListener),
}

impl FocusHandle {
    /// Handle for a grant obtained with a request object
    pub fn for_request(request: FocusRequest) -> Self {
        Self(HandleToken::Request(request))
    }

    /// Handle for a grant obtained with a bare listener
    pub fn for_listener(listener: FocusListener) -> Self {
        Self(HandleToken::Listener(listener))
    }

    pub fn request(&self) -> Option<&FocusRequest> {
        match &self.0 {
            HandleToken::Request(request) => Some(request),
            HandleToken::Listener(_) => None,
        }
    }

    pub fn listener(&self) -> &FocusListener {
        match &self.0 {
            HandleToken::Request(request) => &request.listener,
            HandleToken::Listener(listener) => listener,
        }
    }
}

/// Answer of a [`FocusService`] request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusGrant {
    Granted(FocusHandle),
    Denied,
}
