//! Async bridge tests
//!
//! Exercises the application-facing surface, including the listener task that
//! feeds platform focus notifications into the arbiter.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use callroute_core::{
    AudioMode, AudioRoutingApi, AudioSessionController, BridgeError, CallAudioBridge, CallAudioConfig,
    FocusChange, FocusState, PlatformOperation, SessionState, SimulatedPlatform,
};

fn bridge_for(platform: &Arc<SimulatedPlatform>) -> CallAudioBridge {
    let controller = AudioSessionController::new(platform.clone(), CallAudioConfig::default()).unwrap();
    CallAudioBridge::new(Arc::new(controller))
}

#[tokio::test]
async fn test_bridge_call_lifecycle() {
    let platform = Arc::new(SimulatedPlatform::new());
    let bridge = bridge_for(&platform);
    assert!(bridge.has_listener());

    assert_eq!(bridge.start_audio_routing().await, Ok(true));
    assert_eq!(bridge.set_speaker_on(true).await, Ok(true));
    assert!(bridge.controller().route_is_speaker());
    assert_eq!(bridge.stop_audio_routing().await, Ok(true));

    assert_eq!(platform.mode(), AudioMode::Normal);
    assert!(!platform.speakerphone_on());
    assert_eq!(platform.abandon_count(), 1);
}

#[tokio::test]
async fn test_bridge_rejects_second_start() {
    let platform = Arc::new(SimulatedPlatform::new());
    let bridge = bridge_for(&platform);

    bridge.start_audio_routing().await.unwrap();
    let err = bridge.start_audio_routing().await.unwrap_err();

    assert_eq!(err.code, "ERROR");
    assert!(err.message.contains("already active"), "message: {}", err.message);
    assert_eq!(platform.focus_request_count(), 1);
}

#[tokio::test]
async fn test_bridge_renders_platform_failure() {
    let platform = Arc::new(SimulatedPlatform::new());
    platform.fail(PlatformOperation::SetMode);
    let bridge = bridge_for(&platform);

    let err = bridge.start_audio_routing().await.unwrap_err();

    assert_eq!(
        err,
        BridgeError {
            code: "ERROR".to_string(),
            message: "Platform call set_mode failed: simulated platform failure".to_string(),
        }
    );
    assert_eq!(bridge.controller().state(), SessionState::Ended);
}

#[tokio::test]
async fn test_listener_task_applies_focus_notifications() {
    let platform = Arc::new(SimulatedPlatform::new());
    let bridge = bridge_for(&platform);
    bridge.start_audio_routing().await.unwrap();

    let mut focus = bridge.controller().arbiter().unwrap().watch();

    assert!(platform.emit_focus_change(FocusChange::LossTransientCanDuck));
    timeout(Duration::from_secs(1), focus.wait_for(|s| s.state == FocusState::LostTransient))
        .await
        .expect("transient loss not applied")
        .unwrap();

    assert!(platform.emit_focus_change(FocusChange::Gain));
    timeout(Duration::from_secs(1), focus.wait_for(|s| s.state == FocusState::Granted))
        .await
        .expect("regain not applied")
        .unwrap();

    bridge.stop_audio_routing().await.unwrap();
    assert_eq!(platform.abandon_count(), 1);
    assert!(!platform.holds_focus_listener());
}
