//! Call stream volume normalization

use serde::{Deserialize, Serialize};

/// Default share of the maximum volume applied at call start
pub const DEFAULT_VOLUME_PERCENT: u8 = 80;

/// How a scaled volume is rounded to a platform step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeRounding {
    /// Truncate toward zero: 10 → 8, 1 → 0
    #[default]
    Floor,
    /// Round half up: 10 → 8, 1 → 1
    Nearest,
}

/// Volume applied to the call stream on start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VolumePolicy {
    /// `percent` of the platform maximum
    Scaled { percent: u8, rounding: VolumeRounding },
    /// Platform maximum
    Max,
}

impl Default for VolumePolicy {
    fn default() -> Self {
        VolumePolicy::Scaled {
            percent: DEFAULT_VOLUME_PERCENT,
            rounding: VolumeRounding::Floor,
        }
    }
}

impl VolumePolicy {
    /// Target volume for a stream whose maximum is `max`.
    ///
    /// Platforms without graduated volume always get `max`.
    pub fn target(&self, max: u32, fixed_volume: bool) -> u32 {
        if fixed_volume {
            return max;
        }

        match *self {
            VolumePolicy::Max => max,
            VolumePolicy::Scaled { percent, rounding } => scale(max, percent, rounding),
        }
    }

    /// Whether `target` scales the maximum
    pub fn is_scaled(&self) -> bool {
        matches!(self, VolumePolicy::Scaled { .. })
    }
}

fn scale(max: u32, percent: u8, rounding: VolumeRounding) -> u32 {
    let product = u64::from(max) * u64::from(percent.min(100));
    let scaled = match rounding {
        VolumeRounding::Floor => product / 100,
        VolumeRounding::Nearest => (product + 50) / 100,
    };
    // percent <= 100 keeps the result within max
    scaled as u32
}

/// Volume readings and the value applied during `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeReport {
    pub max: u32,
    /// Volume before normalization, diagnostics only
    pub current: Option<u32>,
    pub target: u32,
    /// `false` when the maximum was applied unscaled
    pub scaled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const FLOOR: VolumePolicy = VolumePolicy::Scaled {
        percent: 80,
        rounding: VolumeRounding::Floor,
    };
    const NEAREST: VolumePolicy = VolumePolicy::Scaled {
        percent: 80,
        rounding: VolumeRounding::Nearest,
    };

    #[test]
    fn test_floor_rounding() {
        assert_eq!(FLOOR.target(10, false), 8);
        assert_eq!(FLOOR.target(1, false), 0);
        assert_eq!(FLOOR.target(7, false), 5);
        assert_eq!(FLOOR.target(15, false), 12);
    }

    #[test]
    fn test_nearest_rounding() {
        assert_eq!(NEAREST.target(10, false), 8);
        assert_eq!(NEAREST.target(1, false), 1);
        assert_eq!(NEAREST.target(7, false), 6);
        assert_eq!(NEAREST.target(15, false), 12);
    }

    #[test]
    fn test_zero_max() {
        assert_eq!(FLOOR.target(0, false), 0);
        assert_eq!(NEAREST.target(0, false), 0);
        assert_eq!(VolumePolicy::Max.target(0, false), 0);
    }

    #[test]
    fn test_fixed_volume_skips_scaling() {
        assert_eq!(FLOOR.target(7, true), 7);
        assert_eq!(VolumePolicy::Max.target(7, false), 7);
    }

    #[test]
    fn test_default_policy() {
        assert_eq!(VolumePolicy::default(), FLOOR);
        assert!(VolumePolicy::default().is_scaled());
        assert!(!VolumePolicy::Max.is_scaled());
    }

    proptest! {
        #[test]
        fn prop_target_never_exceeds_max(max in 0u32..=10_000, percent in 0u8..=100) {
            for rounding in [VolumeRounding::Floor, VolumeRounding::Nearest] {
                let policy = VolumePolicy::Scaled { percent, rounding };
                prop_assert!(policy.target(max, false) <= max);
            }
        }

        #[test]
        fn prop_eighty_percent_matches_float_rounding(max in 0u32..=10_000) {
            let exact = f64::from(max) * 0.8;
            prop_assert_eq!(FLOOR.target(max, false), exact.floor() as u32);
            prop_assert_eq!(NEAREST.target(max, false), (exact + 0.5).floor() as u32);
        }
    }
}
