//! Call audio configuration
//!
//! [`CallAudioConfig`] bundles the routing policy with the platform-facing
//! settings (focus kind and API, call stream, volume flags). It deserializes
//! from TOML with every field optional:
//!
//! ```rust
//! use callroute_core::config::CallAudioConfig;
//! use callroute_core::session::OutputRoute;
//!
//! let config = CallAudioConfig::from_toml_str(r#"
//!     focus_api = "stream"
//!
//!     [policy]
//!     default_route = "speaker"
//!     volume = { kind = "max" }
//! "#).unwrap();
//!
//! assert_eq!(config.policy.default_route, OutputRoute::Speaker);
//! assert!(config.policy.negotiate_focus);
//! ```
//!
//! Two presets match the routing policies seen in the field:
//!
//! ```rust
//! use callroute_core::config::{CallAudioConfig, RoutingPolicy};
//!
//! let config = CallAudioConfig::new().with_policy(RoutingPolicy::speaker_max());
//! assert!(!config.policy.negotiate_focus);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AudioError, AudioResult};
use crate::focus::{FocusApi, FocusKind};
use crate::platform::{StreamType, VolumeFlags};
use crate::session::OutputRoute;
use crate::volume::VolumePolicy;

/// Default capacity of the event broadcast channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// What `start` does besides entering call audio mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingPolicy {
    /// Request transient focus before routing audio
    pub negotiate_focus: bool,
    /// Route applied by `start`
    pub default_route: OutputRoute,
    /// Volume applied by `start`
    pub volume: VolumePolicy,
}

impl RoutingPolicy {
    /// Focus negotiation, earpiece, 80% volume
    pub fn focus_aware() -> Self {
        Self {
            negotiate_focus: true,
            default_route: OutputRoute::Earpiece,
            volume: VolumePolicy::default(),
        }
    }

    /// No focus negotiation, loudspeaker, maximum volume
    pub fn speaker_max() -> Self {
        Self {
            negotiate_focus: false,
            default_route: OutputRoute::Speaker,
            volume: VolumePolicy::Max,
        }
    }
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self::focus_aware()
    }
}

/// Call audio configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallAudioConfig {
    pub policy: RoutingPolicy,
    pub focus_kind: FocusKind,
    pub focus_api: FocusApi,
    pub call_stream: StreamType,
    pub volume_flags: VolumeFlags,
    pub event_capacity: usize,
}

impl Default for CallAudioConfig {
    fn default() -> Self {
        Self {
            policy: RoutingPolicy::default(),
            focus_kind: FocusKind::GainTransient,
            focus_api: FocusApi::Auto,
            call_stream: StreamType::VoiceCall,
            volume_flags: VolumeFlags::NONE,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CallAudioConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: RoutingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_default_route(mut self, route: OutputRoute) -> Self {
        self.policy.default_route = route;
        self
    }

    pub fn with_volume_policy(mut self, volume: VolumePolicy) -> Self {
        self.policy.volume = volume;
        self
    }

    pub fn with_focus_negotiation(mut self, enabled: bool) -> Self {
        self.policy.negotiate_focus = enabled;
        self
    }

    pub fn with_focus_kind(mut self, kind: FocusKind) -> Self {
        self.focus_kind = kind;
        self
    }

    pub fn with_focus_api(mut self, api: FocusApi) -> Self {
        self.focus_api = api;
        self
    }

    pub fn with_volume_flags(mut self, flags: VolumeFlags) -> Self {
        self.volume_flags = flags;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(input: &str) -> AudioResult<Self> {
        let config: CallAudioConfig =
            toml::from_str(input).map_err(|e| AudioError::config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> AudioResult<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path)
            .map_err(|e| AudioError::config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&input)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> AudioResult<String> {
        toml::to_string_pretty(self).map_err(|e| AudioError::config(e.to_string()))
    }

    pub fn validate(&self) -> AudioResult<()> {
        if let VolumePolicy::Scaled { percent, .. } = self.policy.volume {
            if percent > 100 {
                return Err(AudioError::config(format!(
                    "volume percent must be at most 100, got {}",
                    percent
                )));
            }
        }
        if self.event_capacity == 0 {
            return Err(AudioError::config("event_capacity must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::VolumeRounding;

    #[test]
    fn test_defaults() {
        let config = CallAudioConfig::default();
        assert_eq!(config.policy, RoutingPolicy::focus_aware());
        assert_eq!(config.focus_kind, FocusKind::GainTransient);
        assert_eq!(config.call_stream, StreamType::VoiceCall);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(CallAudioConfig::from_toml_str("").unwrap(), CallAudioConfig::default());
    }

    #[test]
    fn test_toml_overrides() {
        let config = CallAudioConfig::from_toml_str(
            r#"
            focus_kind = "gain_transient_exclusive"
            volume_flags = 1

            [policy]
            negotiate_focus = false
            volume = { kind = "scaled", percent = 60, rounding = "nearest" }
            "#,
        )
        .unwrap();

        assert_eq!(config.focus_kind, FocusKind::GainTransientExclusive);
        assert_eq!(config.volume_flags, VolumeFlags::SHOW_UI);
        assert!(!config.policy.negotiate_focus);
        assert_eq!(config.policy.default_route, OutputRoute::Earpiece);
        assert_eq!(
            config.policy.volume,
            VolumePolicy::Scaled { percent: 60, rounding: VolumeRounding::Nearest }
        );
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let too_loud = CallAudioConfig::new().with_volume_policy(VolumePolicy::Scaled {
            percent: 120,
            rounding: VolumeRounding::Floor,
        });
        assert!(matches!(too_loud.validate(), Err(AudioError::Configuration { .. })));

        let no_events = CallAudioConfig::new().with_event_capacity(0);
        assert!(no_events.validate().is_err());

        assert!(CallAudioConfig::from_toml_str("event_capacity = 0").is_err());
        assert!(CallAudioConfig::from_toml_str("focus_api = \"telepathy\"").is_err());
    }

    #[test]
    fn test_toml_round_trip_of_preset() {
        let config = CallAudioConfig::new().with_policy(RoutingPolicy::speaker_max());
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(CallAudioConfig::from_toml_str(&rendered).unwrap(), config);
    }
}
