//! Configuration for the tape instrument
//!
//! All gesture, scheduling and tone parameters are fixed at initialization
//! and collected here:
//!
//! - [`TransportConfig`]: knob feel and grain scheduling constants
//! - [`ToneMode`] / [`TonePreset`]: the two tonal flavors of the shared
//!   tone-chain topology
//! - Generic YAML config loading/saving ([`load_config`] / [`save_config`])

mod io;
mod paths;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};

use serde::{Deserialize, Serialize};

/// Tonal flavor of the output chain
///
/// Both modes share one chain topology (HP -> presence -> tremolo ->
/// saturation -> LP); only the parameters differ. `Radio` narrows the band,
/// pushes presence and saturation harder, and enables tremolo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMode {
    #[default]
    Tape,
    Radio,
}

impl ToneMode {
    /// Get display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Tape => "Tape",
            Self::Radio => "Radio",
        }
    }
}

/// Parameters for one tone-chain preset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TonePreset {
    /// High-pass cutoff in Hz (rumble removal)
    pub hp_hz: f32,
    /// High-pass Q
    pub hp_q: f32,
    /// Presence peaking filter center frequency in Hz
    pub presence_hz: f32,
    /// Presence Q
    pub presence_q: f32,
    /// Presence boost in dB
    pub presence_gain_db: f32,
    /// Tremolo rate in Hz (ignored when depth is zero)
    pub tremolo_hz: f32,
    /// Tremolo depth in [0, 1]; zero bypasses the AM stage
    pub tremolo_depth: f32,
    /// Soft-saturation amount in [0, 1]
    pub saturation: f32,
    /// Low-pass cutoff in Hz (top-end rolloff)
    pub lp_hz: f32,
    /// Low-pass Q
    pub lp_q: f32,
}

impl TonePreset {
    /// Get the preset for a tone mode
    pub fn for_mode(mode: ToneMode) -> Self {
        match mode {
            // Wider band, gentle presence, no tremolo
            ToneMode::Tape => Self {
                hp_hz: 90.0,
                hp_q: 0.7,
                presence_hz: 1700.0,
                presence_q: 0.85,
                presence_gain_db: 1.4,
                tremolo_hz: 0.0,
                tremolo_depth: 0.0,
                saturation: 0.55,
                lp_hz: 5200.0,
                lp_q: 0.7,
            },
            // Tight telephone-ish band, hotter presence and saturation,
            // audible carrier wobble
            ToneMode::Radio => Self {
                hp_hz: 320.0,
                hp_q: 0.8,
                presence_hz: 2200.0,
                presence_q: 1.2,
                presence_gain_db: 3.0,
                tremolo_hz: 5.5,
                tremolo_depth: 0.25,
                saturation: 0.7,
                lp_hz: 3400.0,
                lp_q: 0.8,
            },
        }
    }
}

/// Knob feel and grain scheduling constants
///
/// Velocities and the playhead step are expressed in seconds of tape per
/// tick (the engine ticks at a fixed 60 Hz cadence derived from the sample
/// clock), matching how the instrument was originally tuned.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Raw velocity gained per degree of knob rotation
    pub drag_sensitivity: f64,
    /// Extra velocity multiplier applied to rewind (negative) deltas,
    /// making reverse winding feel faster than forward
    pub rewind_multiplier: f64,
    /// Maximum forward tape speed (seconds of tape per tick)
    pub max_forward_speed: f64,
    /// Maximum reverse tape speed magnitude (seconds of tape per tick)
    pub max_reverse_speed: f64,
    /// Per-tick exponential decay of raw velocity (inertial coasting)
    pub friction: f64,
    /// Speeds below this magnitude are treated as stopped
    pub deadzone: f64,
    /// Exponential smoothing factor from raw velocity to tape speed
    pub speed_smoothing: f64,
    /// Grain duration in seconds
    pub grain_size: f64,
    /// How far ahead of the output clock grains must be scheduled
    pub lookahead: f64,
    /// Grain spacing at maximum speed (dense overlap)
    pub step_min: f64,
    /// Grain spacing near the deadzone (sparse)
    pub step_max: f64,
    /// Slow pitch-wobble rate in Hz
    pub wow_hz: f64,
    /// Slow pitch-wobble depth (playback-rate offset)
    pub wow_depth: f64,
    /// Fast pitch-wobble rate in Hz
    pub flutter_hz: f64,
    /// Fast pitch-wobble depth (playback-rate offset)
    pub flutter_depth: f64,
    /// Tone chain preset selection
    pub tone_mode: ToneMode,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            drag_sensitivity: 0.00038,
            rewind_multiplier: 1.25,
            max_forward_speed: 0.028,
            max_reverse_speed: 0.036,
            friction: 0.935,
            deadzone: 0.00006,
            speed_smoothing: 0.16,
            grain_size: 0.06,
            lookahead: 0.14,
            step_min: 0.016,
            step_max: 0.05,
            wow_hz: 0.38,
            wow_depth: 0.0022,
            flutter_hz: 5.2,
            flutter_depth: 0.0010,
            tone_mode: ToneMode::Tape,
        }
    }
}

impl TransportConfig {
    /// Maximum speed magnitude for a movement direction
    ///
    /// The clamp is asymmetric: rewind may be allowed to run faster than
    /// forward playback.
    #[inline]
    pub fn max_speed_for(&self, forward: bool) -> f64 {
        if forward {
            self.max_forward_speed
        } else {
            self.max_reverse_speed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_original_tuning() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.drag_sensitivity, 0.00038);
        assert_eq!(cfg.friction, 0.935);
        assert_eq!(cfg.grain_size, 0.06);
        assert_eq!(cfg.tone_mode, ToneMode::Tape);
    }

    #[test]
    fn test_asymmetric_speed_bounds() {
        let cfg = TransportConfig::default();
        assert!(cfg.max_speed_for(false) > cfg.max_speed_for(true));
    }

    #[test]
    fn test_tape_preset_has_no_tremolo() {
        let tape = TonePreset::for_mode(ToneMode::Tape);
        let radio = TonePreset::for_mode(ToneMode::Radio);
        assert_eq!(tape.tremolo_depth, 0.0);
        assert!(radio.tremolo_depth > 0.0);
        // Radio band sits inside the tape band
        assert!(radio.hp_hz > tape.hp_hz);
        assert!(radio.lp_hz < tape.lp_hz);
    }

    #[test]
    fn test_tone_mode_serde_lowercase() {
        let yaml = serde_yaml::to_string(&ToneMode::Radio).unwrap();
        assert!(yaml.contains("radio"));
        let parsed: ToneMode = serde_yaml::from_str("tape").unwrap();
        assert_eq!(parsed, ToneMode::Tape);
    }
}
