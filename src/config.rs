//! Pipeline tuning: thresholds, timing windows, keyboard layout.
//!
//! Loaded from a JSON file when one is given (missing fields fall back to
//! defaults), then overridden from the command line.

use crate::error::PipelineError;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which landmark coordinate carries the press signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAxis {
    /// Image y from a side camera; grows as the fingertip goes down.
    Y,
    /// Detector depth proxy; negated so that it grows toward the surface.
    Z,
}

/// Where lateral (keyboard-position) samples come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LateralSource {
    /// The frame carrying the press signal also supplies x/y.
    SameView,
    /// Only frames from the top camera supply x/y.
    TopView,
}

/// How key indices on the playing region become note numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum KeyLayout {
    /// One keyboard spanning the region: `note = octave_base + key`.
    Single,
    /// Region split into halves, each an independent range.
    Dual {
        keys_per_hand: usize,
        lower_base: u8,
        upper_base: u8,
    },
}

/// Note-on velocity policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VelocityMode {
    Fixed { velocity: u8 },
    /// Louder the further past the reference plane the fingertip goes.
    Depth { min: u8, max: u8, full_depth: f32 },
}

impl VelocityMode {
    /// Velocity for a press `depth` past the start of the press band.
    pub fn velocity(&self, depth: f32) -> u8 {
        match *self {
            VelocityMode::Fixed { velocity } => velocity.clamp(1, 127),
            VelocityMode::Depth {
                min,
                max,
                full_depth,
            } => {
                let t = if full_depth > 0.0 {
                    (depth / full_depth).clamp(0.0, 1.0)
                } else {
                    1.0
                };
                let v = min as f32 + (max as f32 - min as f32) * t;
                (v.round() as i32).clamp(1, 127) as u8
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tolerance band around the reference plane that counts as contact.
    pub press_threshold: f32,
    /// Minimum time between two press transitions of the same fingertip.
    pub cooldown_ms: u64,
    /// Maximum age of a lateral sample for a press to be accepted.
    pub stale_window_ms: u64,
    pub key_count: usize,
    pub octave_base: u8,
    pub layout: KeyLayout,
    pub velocity: VelocityMode,
    pub signal_axis: SignalAxis,
    pub lateral_source: LateralSource,
    /// Countdown before the calibration sample is taken.
    pub calibration_ms: u64,
    /// Smallest accepted side of a drawn region.
    pub min_region_size: f32,
    /// Idle time after the last playback note-off before playback ends.
    pub playback_tail_ms: u64,
    /// Duration of the exercise feedback flash on a key.
    pub flash_ms: u64,
    /// Fraction of the remaining distance the arm pose covers per 60 Hz frame.
    pub arm_smoothing: f32,
    pub midi_channel: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            press_threshold: 0.035,
            cooldown_ms: 150,
            stale_window_ms: 150,
            key_count: 14,
            octave_base: 60,
            layout: KeyLayout::Single,
            velocity: VelocityMode::Fixed { velocity: 100 },
            signal_axis: SignalAxis::Y,
            lateral_source: LateralSource::SameView,
            calibration_ms: 3000,
            min_region_size: 0.05,
            playback_tail_ms: 500,
            flash_ms: 250,
            arm_smoothing: 0.2,
            midi_channel: 0,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file and validate it.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    /// Total number of keys on the region for the configured layout.
    pub fn total_keys(&self) -> usize {
        match self.layout {
            KeyLayout::Single => self.key_count,
            KeyLayout::Dual { keys_per_hand, .. } => keys_per_hand * 2,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if !(self.press_threshold >= 0.0 && self.press_threshold < 1.0) {
            return bad(format!("press_threshold {} not in [0, 1)", self.press_threshold));
        }
        if self.midi_channel > 15 {
            return bad(format!("midi_channel {} > 15", self.midi_channel));
        }
        if !(self.arm_smoothing > 0.0 && self.arm_smoothing <= 1.0) {
            return bad(format!("arm_smoothing {} not in (0, 1]", self.arm_smoothing));
        }
        if !(self.min_region_size > 0.0 && self.min_region_size < 1.0) {
            return bad(format!("min_region_size {} not in (0, 1)", self.min_region_size));
        }
        if self.stale_window_ms == 0 {
            return bad("stale_window_ms must be at least 1".into());
        }
        if self.flash_ms == 0 {
            return bad("flash_ms must be at least 1".into());
        }
        match self.layout {
            KeyLayout::Single => {
                if self.key_count == 0 {
                    return bad("key_count must be at least 1".into());
                }
                if self.octave_base as usize + self.key_count - 1 > 127 {
                    return bad(format!(
                        "octave_base {} + key_count {} exceeds MIDI range",
                        self.octave_base, self.key_count
                    ));
                }
            }
            KeyLayout::Dual {
                keys_per_hand,
                lower_base,
                upper_base,
            } => {
                if keys_per_hand == 0 {
                    return bad("keys_per_hand must be at least 1".into());
                }
                for base in [lower_base, upper_base] {
                    if base as usize + keys_per_hand - 1 > 127 {
                        return bad(format!(
                            "base {} + keys_per_hand {} exceeds MIDI range",
                            base, keys_per_hand
                        ));
                    }
                }
            }
        }
        if let VelocityMode::Depth { min, max, .. } = self.velocity {
            if min > max || max > 127 {
                return bad(format!("depth velocity range {}..{} invalid", min, max));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let cfg = PipelineConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.total_keys(), 14);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"press_threshold":0.03,"cooldown_ms":200}"#).unwrap();
        assert!((cfg.press_threshold - 0.03).abs() < 1e-6);
        assert_eq!(cfg.cooldown_ms, 200);
        assert_eq!(cfg.stale_window_ms, 150);
        assert_eq!(cfg.layout, KeyLayout::Single);
    }

    #[test]
    fn test_tagged_layout_json() {
        let cfg: PipelineConfig = serde_json::from_str(
            r#"{"layout":{"kind":"dual","keys_per_hand":7,"lower_base":48,"upper_base":60},
                "velocity":{"kind":"depth","min":40,"max":120,"full_depth":0.05}}"#,
        )
        .unwrap();
        assert_eq!(cfg.total_keys(), 14);
        assert!(matches!(cfg.velocity, VelocityMode::Depth { min: 40, .. }));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_keys() {
        let cfg = PipelineConfig {
            octave_base: 120,
            key_count: 14,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_windows() {
        for cfg in [
            PipelineConfig { stale_window_ms: 0, ..Default::default() },
            PipelineConfig { flash_ms: 0, ..Default::default() },
            PipelineConfig { press_threshold: f32::NAN, ..Default::default() },
            PipelineConfig { min_region_size: -0.1, ..Default::default() },
        ] {
            assert!(matches!(cfg.validate(), Err(PipelineError::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_depth_velocity_monotonic() {
        let mode = VelocityMode::Depth {
            min: 40,
            max: 120,
            full_depth: 0.05,
        };
        assert_eq!(mode.velocity(0.0), 40);
        assert_eq!(mode.velocity(0.05), 120);
        assert_eq!(mode.velocity(1.0), 120);
        let mut prev = 0;
        for i in 0..=20 {
            let v = mode.velocity(i as f32 * 0.003);
            assert!(v >= prev, "velocity decreased at step {}", i);
            prev = v;
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let path = std::env::temp_dir().join(format!("handkeys_cfg_{}.json", std::process::id()));
        let cfg = PipelineConfig {
            cooldown_ms: 123,
            ..Default::default()
        };
        cfg.save(&path).unwrap();
        let loaded = PipelineConfig::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, cfg);
    }
}
