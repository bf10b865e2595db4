//! Simulated platform audio service
//!
//! In-memory implementation of every platform primitive. It records each call
//! in order, can be told to fail individual operations, and can deliver focus
//! notifications to whichever listener currently holds focus. Used by tests
//! and by the CLI to exercise the controller without audio hardware.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde::Serialize;

use super::{
    AudioMode, AudioPlatform, FocusPrimitives, FocusResponse, ModeService, PlatformCapabilities,
    PlatformError, PlatformOperation, PlatformResult, RouteService, StreamType, VolumeFlags,
    VolumeService,
};
use crate::focus::{FocusApi, FocusChange, FocusKind, FocusListener, FocusRequest};

/// One recorded platform call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum PlatformCall {
    RequestFocus {
        api: FocusApi,
        kind: FocusKind,
        stream: StreamType,
    },
    AbandonFocus {
        api: FocusApi,
    },
    SetMode {
        mode: AudioMode,
    },
    SetSpeakerphone {
        on: bool,
    },
    GetMaxVolume {
        stream: StreamType,
    },
    GetCurrentVolume {
        stream: StreamType,
    },
    SetVolume {
        stream: StreamType,
        value: u32,
        flags: VolumeFlags,
    },
}

#[derive(Debug)]
struct SimulatedState {
    capabilities: PlatformCapabilities,
    grant_focus: bool,
    max_volume: u32,
    /// `None` models a platform without a current-volume reading
    current_volume: Option<u32>,
    failures: HashSet<PlatformOperation>,
    mode: AudioMode,
    speakerphone: bool,
    focus_listener: Option<FocusListener>,
    calls: Vec<PlatformCall>,
}

/// In-memory platform audio service
#[derive(Debug)]
pub struct SimulatedPlatform {
    state: Mutex<SimulatedState>,
}

impl SimulatedPlatform {
    /// Platform with the request focus API, graduated volume (max 15, current 5)
    /// and focus granted on request
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimulatedState {
                capabilities: PlatformCapabilities::default(),
                grant_focus: true,
                max_volume: 15,
                current_volume: Some(5),
                failures: HashSet::new(),
                mode: AudioMode::Normal,
                speakerphone: false,
                focus_listener: None,
                calls: Vec::new(),
            }),
        }
    }

    /// Maximum call stream volume reported by the platform
    pub fn with_max_volume(self, max_volume: u32) -> Self {
        self.state.lock().max_volume = max_volume;
        self
    }

    /// Current volume reading; `None` models a platform without one
    pub fn with_current_volume(self, current_volume: Option<u32>) -> Self {
        self.state.lock().current_volume = current_volume;
        self
    }

    /// Platform without graduated volume
    pub fn with_fixed_volume(self) -> Self {
        self.state.lock().capabilities.fixed_volume = true;
        self
    }

    /// Platform that only offers the stream + listener focus API
    pub fn with_stream_focus_only(self) -> Self {
        self.state.lock().capabilities.focus_requests = false;
        self
    }

    /// Answer every focus request with a denial
    pub fn deny_focus(self) -> Self {
        self.state.lock().grant_focus = false;
        self
    }

    /// Make `operation` fail until [`Self::recover`] is called
    pub fn fail(&self, operation: PlatformOperation) {
        self.state.lock().failures.insert(operation);
    }

    /// Undo [`Self::fail`] for `operation`
    pub fn recover(&self, operation: PlatformOperation) {
        self.state.lock().failures.remove(&operation);
    }

    /// Deliver a focus notification to the current focus holder.
    ///
    /// Returns `false` when nobody holds focus or the listener is gone.
    pub fn emit_focus_change(&self, change: FocusChange) -> bool {
        let listener = self.state.lock().focus_listener.clone();
        listener.map(|listener| listener.notify(change)).unwrap_or(false)
    }

    /// Audio mode last applied successfully
    pub fn mode(&self) -> AudioMode {
        self.state.lock().mode
    }

    /// Speakerphone state last applied successfully
    pub fn speakerphone_on(&self) -> bool {
        self.state.lock().speakerphone
    }

    /// Last volume set on `stream`, or the initial reading
    pub fn volume(&self, stream: StreamType) -> Option<u32> {
        let state = self.state.lock();
        state
            .calls
            .iter()
            .rev()
            .find_map(|call| match call {
                PlatformCall::SetVolume { stream: s, value, .. } if *s == stream => Some(*value),
                _ => None,
            })
            .or(state.current_volume)
    }

    /// Whether some listener currently holds focus
    pub fn holds_focus_listener(&self) -> bool {
        self.state.lock().focus_listener.is_some()
    }

    /// Every recorded call, in order
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state.lock().calls.clone()
    }

    /// Forget every recorded call
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of focus requests, across both focus APIs
    pub fn focus_request_count(&self) -> usize {
        self.count(|call| matches!(call, PlatformCall::RequestFocus { .. }))
    }

    /// Number of focus abandon calls, across both focus APIs
    pub fn abandon_count(&self) -> usize {
        self.count(|call| matches!(call, PlatformCall::AbandonFocus { .. }))
    }

    fn count(&self, predicate: impl Fn(&PlatformCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Record `call` and fail it if `operation` is marked as failing
    fn record(
        state: &mut SimulatedState,
        operation: PlatformOperation,
        call: PlatformCall,
    ) -> PlatformResult<()> {
        state.calls.push(call);
        if state.failures.contains(&operation) {
            return Err(PlatformError::new(operation, "simulated platform failure"));
        }
        Ok(())
    }

    fn grant(state: &mut SimulatedState, listener: &FocusListener) -> FocusResponse {
        if state.grant_focus {
            state.focus_listener = Some(listener.clone());
            FocusResponse::Granted
        } else {
            FocusResponse::Failed
        }
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl FocusPrimitives for SimulatedPlatform {
    fn request_audio_focus(&self, request: &FocusRequest) -> PlatformResult<FocusResponse> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            PlatformOperation::RequestFocus,
            PlatformCall::RequestFocus {
                api: FocusApi::Request,
                kind: request.kind,
                stream: request.stream,
            },
        )?;
        Ok(Self::grant(&mut state, &request.listener))
    }

    fn abandon_audio_focus_request(&self, request: &FocusRequest) -> PlatformResult<()> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            PlatformOperation::AbandonFocus,
            PlatformCall::AbandonFocus { api: FocusApi::Request },
        )?;
        if state.focus_listener.as_ref() == Some(&request.listener) {
            state.focus_listener = None;
        }
        Ok(())
    }

    fn request_stream_focus(
        &self,
        listener: &FocusListener,
        stream: StreamType,
        kind: FocusKind,
    ) -> PlatformResult<FocusResponse> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            PlatformOperation::RequestFocus,
            PlatformCall::RequestFocus {
                api: FocusApi::Stream,
                kind,
                stream,
            },
        )?;
        Ok(Self::grant(&mut state, listener))
    }

    fn abandon_stream_focus(&self, listener: &FocusListener) -> PlatformResult<()> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            PlatformOperation::AbandonFocus,
            PlatformCall::AbandonFocus { api: FocusApi::Stream },
        )?;
        if state.focus_listener.as_ref() == Some(listener) {
            state.focus_listener = None;
        }
        Ok(())
    }
}

impl ModeService for SimulatedPlatform {
    fn set_mode(&self, mode: AudioMode) -> PlatformResult<()> {
        let mut state = self.state.lock();
        Self::record(&mut state, PlatformOperation::SetMode, PlatformCall::SetMode { mode })?;
        state.mode = mode;
        Ok(())
    }
}

impl RouteService for SimulatedPlatform {
    fn set_speakerphone_on(&self, on: bool) -> PlatformResult<()> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            PlatformOperation::SetSpeakerphone,
            PlatformCall::SetSpeakerphone { on },
        )?;
        state.speakerphone = on;
        Ok(())
    }
}

impl VolumeService for SimulatedPlatform {
    fn max_volume(&self, stream: StreamType) -> PlatformResult<u32> {
        let mut state = self.state.lock();
        Self::record(&mut state, PlatformOperation::GetMaxVolume, PlatformCall::GetMaxVolume { stream })?;
        Ok(state.max_volume)
    }

    fn current_volume(&self, stream: StreamType) -> PlatformResult<Option<u32>> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            PlatformOperation::GetCurrentVolume,
            PlatformCall::GetCurrentVolume { stream },
        )?;
        Ok(state.current_volume)
    }

    fn set_volume(&self, stream: StreamType, value: u32, flags: VolumeFlags) -> PlatformResult<()> {
        let mut state = self.state.lock();
        Self::record(
            &mut state,
            PlatformOperation::SetVolume,
            PlatformCall::SetVolume { stream, value, flags },
        )?;
        Ok(())
    }
}

impl AudioPlatform for SimulatedPlatform {
    fn capabilities(&self) -> PlatformCapabilities {
        self.state.lock().capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_calls_in_order() {
        let platform = SimulatedPlatform::new();
        platform.set_mode(AudioMode::InCommunication).unwrap();
        platform.set_speakerphone_on(true).unwrap();

        assert_eq!(
            platform.calls(),
            vec![
                PlatformCall::SetMode { mode: AudioMode::InCommunication },
                PlatformCall::SetSpeakerphone { on: true },
            ]
        );
        assert_eq!(platform.mode(), AudioMode::InCommunication);
        assert!(platform.speakerphone_on());
    }

    #[test]
    fn test_injected_failure_does_not_apply() {
        let platform = SimulatedPlatform::new();
        platform.fail(PlatformOperation::SetMode);

        let err = platform.set_mode(AudioMode::InCommunication).unwrap_err();
        assert_eq!(err.operation, PlatformOperation::SetMode);
        assert_eq!(platform.mode(), AudioMode::Normal);

        platform.recover(PlatformOperation::SetMode);
        platform.set_mode(AudioMode::InCommunication).unwrap();
        assert_eq!(platform.mode(), AudioMode::InCommunication);
    }

    #[test]
    fn test_focus_listener_cleared_on_abandon() {
        let platform = SimulatedPlatform::new();
        let (listener, mut rx) = FocusListener::channel();

        let response = platform
            .request_stream_focus(&listener, StreamType::VoiceCall, FocusKind::GainTransient)
            .unwrap();
        assert_eq!(response, FocusResponse::Granted);
        assert!(platform.emit_focus_change(FocusChange::Loss));
        assert_eq!(rx.try_recv().ok().map(|n| n.change), Some(FocusChange::Loss));

        platform.abandon_stream_focus(&listener).unwrap();
        assert!(!platform.holds_focus_listener());
        assert!(!platform.emit_focus_change(FocusChange::Gain));
    }

    #[test]
    fn test_volume_reading() {
        let platform = SimulatedPlatform::new().with_current_volume(None);
        assert_eq!(platform.volume(StreamType::VoiceCall), None);
        platform.set_volume(StreamType::VoiceCall, 9, VolumeFlags::NONE).unwrap();
        assert_eq!(platform.volume(StreamType::VoiceCall), Some(9));
    }
}
