//! Focus Arbiter
//!
//! Owns the focus state machine. Explicit calls (`acquire`, `release`) come
//! from the controller; asynchronous notifications come from the platform
//! through the arbiter's [`FocusListener`]. Both paths apply transitions under
//! the same mutex and publish a [`FocusSnapshot`] on a watch channel, so the
//! controller only ever reads a consistent copy.
//!
//! | Event                    | From          | To            |
//! |--------------------------|---------------|---------------|
//! | `acquire()`              | NotRequested  | Requested     |
//! | platform grants          | Requested     | Granted       |
//! | platform denies          | Requested     | NotRequested  |
//! | `Loss`                   | Granted       | LostPermanent |
//! | `LossTransient[CanDuck]` | Granted       | LostTransient |
//! | `Gain`                   | LostTransient | Granted       |
//! | `release()`              | any other     | NotRequested  |
//!
//! Every `acquire` hands the platform a freshly bound listener. Notifications
//! are tagged with the listener they were delivered to, and anything not
//! addressed to the current grant is dropped, including changes still queued
//! from an earlier call.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    FocusApi, FocusChange, FocusGrant, FocusHandle, FocusKind, FocusListener, FocusNotification,
    FocusOutcome, FocusService, FocusSnapshot, FocusState,
};
use crate::events::{CallAudioEvent, EventEmitter};
use crate::platform::PlatformResult;

#[derive(Debug, Default)]
struct ArbiterInner {
    state: FocusState,
    /// Visible handle, present only while `Granted`
    handle: Option<FocusHandle>,
    /// Platform token kept while focus is lost so it can still be abandoned
    parked: Option<FocusHandle>,
    /// Listener of the outstanding request or grant
    active: Option<FocusListener>,
}

/// Single writer of the focus state
pub struct FocusArbiter {
    service: Arc<dyn FocusService>,
    kind: FocusKind,
    inner: Mutex<ArbiterInner>,
    /// Channel endpoint every per-grant listener is bound from
    listener: FocusListener,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<FocusNotification>>>,
    snapshot_tx: watch::Sender<FocusSnapshot>,
    snapshot_rx: watch::Receiver<FocusSnapshot>,
    events: EventEmitter,
}

impl FocusArbiter {
    pub fn new(service: Arc<dyn FocusService>, kind: FocusKind, events: EventEmitter) -> Self {
        let (listener, receiver) = FocusListener::channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(FocusSnapshot::default());
        Self {
            service,
            kind,
            inner: Mutex::new(ArbiterInner::default()),
            listener,
            receiver: Mutex::new(Some(receiver)),
            snapshot_tx,
            snapshot_rx,
            events,
        }
    }

    /// API generation of the underlying focus service
    pub fn api(&self) -> FocusApi {
        self.service.api()
    }

    /// Listener bound to the outstanding request or grant, if any
    pub fn listener(&self) -> Option<FocusListener> {
        self.inner.lock().active.clone()
    }

    /// Current focus state
    pub fn snapshot(&self) -> FocusSnapshot {
        *self.snapshot_rx.borrow()
    }

    /// Watch focus state changes
    pub fn watch(&self) -> watch::Receiver<FocusSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Request transient focus. One synchronous attempt, no retry.
    ///
    /// A platform error leaves the arbiter in `NotRequested` and is returned
    /// to the caller, which treats it as focus not being granted.
    pub fn acquire(&self) -> PlatformResult<FocusOutcome> {
        let mut inner = self.inner.lock();

        match inner.state {
            FocusState::Granted => {
                debug!("audio focus already held");
                return Ok(FocusOutcome::Granted);
            }
            FocusState::NotRequested => {}
            stale => {
                warn!(state = %stale, "acquiring focus over an unreleased grant");
                self.abandon_tokens(&mut inner);
            }
        }

        let listener = self.listener.rebind();
        inner.active = Some(listener.clone());
        self.transition(&mut inner, FocusState::Requested);

        match self.service.request(self.kind, &listener) {
            Ok(FocusGrant::Granted(handle)) => {
                inner.handle = Some(handle);
                self.transition(&mut inner, FocusState::Granted);
                info!("audio focus granted");
                Ok(FocusOutcome::Granted)
            }
            Ok(FocusGrant::Denied) => {
                inner.active = None;
                self.transition(&mut inner, FocusState::NotRequested);
                warn!("audio focus not granted");
                Ok(FocusOutcome::Denied)
            }
            Err(e) => {
                inner.active = None;
                self.transition(&mut inner, FocusState::NotRequested);
                Err(e)
            }
        }
    }

    /// Abandon any grant or outstanding request.
    ///
    /// The state always ends in `NotRequested`; the platform error, if any, is
    /// returned for logging only.
    pub fn release(&self) -> PlatformResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == FocusState::NotRequested {
            return Ok(());
        }

        let token = inner.handle.take().or_else(|| inner.parked.take());
        inner.active = None;
        self.transition(&mut inner, FocusState::NotRequested);

        match token {
            Some(handle) => {
                debug!(listener_id = handle.listener().id(), "abandoning audio focus");
                self.service.abandon(handle)
            }
            None => Ok(()),
        }
    }

    /// Apply a notification delivered through a listener; ignored unless it
    /// belongs to the current grant
    pub fn handle_notification(&self, notification: FocusNotification) {
        let mut inner = self.inner.lock();
        let current = inner.active.as_ref().map(FocusListener::id);
        if current != Some(notification.listener_id) {
            debug!(
                listener_id = notification.listener_id,
                ?current,
                change = ?notification.change,
                "dropping focus notification for a released grant"
            );
            return;
        }
        self.apply_change(&mut inner, notification.change);
    }

    /// Apply a focus change to the current grant
    pub fn handle_change(&self, change: FocusChange) {
        let mut inner = self.inner.lock();
        self.apply_change(&mut inner, change);
    }

    fn apply_change(&self, inner: &mut ArbiterInner, change: FocusChange) {
        match (inner.state, change) {
            (FocusState::Granted, FocusChange::Loss) => {
                inner.parked = inner.handle.take();
                self.transition(inner, FocusState::LostPermanent);
                warn!("audio focus lost permanently; call continues with degraded focus");
            }
            (FocusState::Granted, FocusChange::LossTransient | FocusChange::LossTransientCanDuck) => {
                inner.parked = inner.handle.take();
                self.transition(inner, FocusState::LostTransient);
                info!(?change, "audio focus lost temporarily");
            }
            (FocusState::LostTransient, FocusChange::Gain) => {
                inner.handle = inner.parked.take();
                self.transition(inner, FocusState::Granted);
                info!("audio focus regained");
            }
            (state, change) => {
                debug!(%state, ?change, "ignoring focus notification");
            }
        }
    }

    /// Apply every notification already queued on the listener channel.
    ///
    /// Only works while no listener task owns the channel.
    pub fn drain_pending(&self) -> usize {
        let mut notifications = Vec::new();
        if let Some(receiver) = self.receiver.lock().as_mut() {
            while let Ok(notification) = receiver.try_recv() {
                notifications.push(notification);
            }
        }

        let count = notifications.len();
        for notification in notifications {
            self.handle_notification(notification);
        }
        count
    }

    /// Spawn the task that consumes focus notifications.
    ///
    /// Must be called from within a tokio runtime. Returns `None` if the
    /// listener task was already started.
    pub fn spawn_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut receiver = self.receiver.lock().take()?;
        let arbiter = Arc::downgrade(self);

        Some(tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                let Some(arbiter) = arbiter.upgrade() else {
                    break;
                };
                arbiter.handle_notification(notification);
            }
            debug!("focus listener task finished");
        }))
    }

    fn abandon_tokens(&self, inner: &mut ArbiterInner) {
        inner.active = None;
        let tokens = inner.handle.take().into_iter().chain(inner.parked.take());
        for handle in tokens {
            if let Err(e) = self.service.abandon(handle) {
                warn!(error = %e, "failed to abandon stale focus grant");
            }
        }
    }

    fn transition(&self, inner: &mut ArbiterInner, to: FocusState) {
        let from = inner.state;
        inner.state = to;
        self.snapshot_tx.send_replace(FocusSnapshot {
            state: to,
            holds_handle: inner.handle.is_some(),
        });

        if from != to {
            debug!(%from, %to, "focus state changed");
            self.events.emit(CallAudioEvent::FocusChanged {
                from,
                to,
                at: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::select_focus_service;
    use crate::platform::{AudioPlatform, PlatformOperation, SimulatedPlatform, StreamType};

    fn arbiter_for(platform: &Arc<SimulatedPlatform>) -> FocusArbiter {
        let dynamic: Arc<dyn AudioPlatform> = platform.clone();
        let service = select_focus_service(dynamic, FocusApi::Auto, StreamType::VoiceCall);
        FocusArbiter::new(service, FocusKind::GainTransient, EventEmitter::new(16))
    }

    #[test]
    fn test_acquire_grant_and_release() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);

        assert_eq!(arbiter.acquire().unwrap(), FocusOutcome::Granted);
        assert_eq!(arbiter.snapshot(), FocusSnapshot { state: FocusState::Granted, holds_handle: true });

        arbiter.release().unwrap();
        assert_eq!(arbiter.snapshot(), FocusSnapshot::default());
        assert_eq!(platform.abandon_count(), 1);
    }

    #[test]
    fn test_denied_returns_to_not_requested() {
        let platform = Arc::new(SimulatedPlatform::new().deny_focus());
        let arbiter = arbiter_for(&platform);

        assert_eq!(arbiter.acquire().unwrap(), FocusOutcome::Denied);
        assert_eq!(arbiter.snapshot().state, FocusState::NotRequested);
        assert!(!arbiter.snapshot().holds_handle);

        // Nothing to abandon
        arbiter.release().unwrap();
        assert_eq!(platform.abandon_count(), 0);
    }

    #[test]
    fn test_request_failure_is_returned() {
        let platform = Arc::new(SimulatedPlatform::new());
        platform.fail(PlatformOperation::RequestFocus);
        let arbiter = arbiter_for(&platform);

        let err = arbiter.acquire().unwrap_err();
        assert_eq!(err.operation, PlatformOperation::RequestFocus);
        assert_eq!(arbiter.snapshot().state, FocusState::NotRequested);
    }

    #[test]
    fn test_acquire_while_granted_does_not_rerequest() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);

        arbiter.acquire().unwrap();
        assert_eq!(arbiter.acquire().unwrap(), FocusOutcome::Granted);
        assert_eq!(platform.focus_request_count(), 1);
    }

    #[test]
    fn test_transient_loss_and_regain() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);
        arbiter.acquire().unwrap();

        arbiter.handle_change(FocusChange::LossTransientCanDuck);
        assert_eq!(arbiter.snapshot(), FocusSnapshot { state: FocusState::LostTransient, holds_handle: false });

        arbiter.handle_change(FocusChange::Gain);
        assert_eq!(arbiter.snapshot(), FocusSnapshot { state: FocusState::Granted, holds_handle: true });

        // No automatic re-request on regain
        assert_eq!(platform.focus_request_count(), 1);
    }

    #[test]
    fn test_permanent_loss_is_terminal_until_release() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);
        arbiter.acquire().unwrap();

        arbiter.handle_change(FocusChange::Loss);
        arbiter.handle_change(FocusChange::Gain);
        assert_eq!(arbiter.snapshot().state, FocusState::LostPermanent);

        // The parked token is still abandoned exactly once
        arbiter.release().unwrap();
        assert_eq!(platform.abandon_count(), 1);
        assert_eq!(arbiter.snapshot().state, FocusState::NotRequested);
    }

    #[test]
    fn test_stale_notifications_are_ignored() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);

        arbiter.handle_change(FocusChange::Loss);
        arbiter.handle_change(FocusChange::Gain);
        assert_eq!(arbiter.snapshot().state, FocusState::NotRequested);
    }

    #[test]
    fn test_notifications_from_released_grant_are_dropped() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);

        arbiter.acquire().unwrap();
        let first = arbiter.listener().unwrap();
        assert!(platform.emit_focus_change(FocusChange::LossTransient));
        arbiter.release().unwrap();
        assert!(arbiter.listener().is_none());

        arbiter.acquire().unwrap();
        assert_ne!(arbiter.listener(), Some(first));

        // Queued loss belongs to the first grant
        assert_eq!(arbiter.drain_pending(), 1);
        assert_eq!(arbiter.snapshot(), FocusSnapshot { state: FocusState::Granted, holds_handle: true });
    }

    #[test]
    fn test_notification_for_current_grant_applies() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);
        arbiter.acquire().unwrap();

        assert!(arbiter.listener().unwrap().notify(FocusChange::Loss));
        arbiter.drain_pending();
        assert_eq!(arbiter.snapshot().state, FocusState::LostPermanent);
    }

    #[test]
    fn test_release_failure_still_clears_state() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);
        arbiter.acquire().unwrap();
        platform.fail(PlatformOperation::AbandonFocus);

        assert!(arbiter.release().is_err());
        assert_eq!(arbiter.snapshot(), FocusSnapshot::default());
    }

    #[test]
    fn test_drain_pending_applies_queued_notifications() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = arbiter_for(&platform);
        arbiter.acquire().unwrap();

        assert!(platform.emit_focus_change(FocusChange::LossTransient));
        assert_eq!(arbiter.drain_pending(), 1);
        assert_eq!(arbiter.snapshot().state, FocusState::LostTransient);
    }

    #[test]
    fn test_transitions_emit_events() {
        let platform = Arc::new(SimulatedPlatform::new());
        let events = EventEmitter::new(16);
        let mut stream = events.subscribe();
        let dynamic: Arc<dyn AudioPlatform> = platform.clone();
        let arbiter = FocusArbiter::new(
            select_focus_service(dynamic, FocusApi::Auto, StreamType::VoiceCall),
            FocusKind::GainTransient,
            events,
        );

        arbiter.acquire().unwrap();

        let mut seen = Vec::new();
        while let Ok(CallAudioEvent::FocusChanged { to, .. }) = stream.try_recv() {
            seen.push(to);
        }
        assert_eq!(seen, vec![FocusState::Requested, FocusState::Granted]);
    }

    #[tokio::test]
    async fn test_listener_task_applies_notifications() {
        let platform = Arc::new(SimulatedPlatform::new());
        let arbiter = Arc::new(arbiter_for(&platform));
        let task = arbiter.spawn_listener().expect("listener task");
        assert!(arbiter.spawn_listener().is_none());

        arbiter.acquire().unwrap();
        let mut watch = arbiter.watch();
        watch.borrow_and_update();

        assert!(platform.emit_focus_change(FocusChange::LossTransient));
        watch.changed().await.unwrap();
        assert_eq!(watch.borrow().state, FocusState::LostTransient);

        task.abort();
    }
}
