//! Audio output configuration

use serde::{Deserialize, Serialize};

/// Preferred sample rate when the device doesn't dictate one
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default buffer size in frames
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Largest buffer size we pre-allocate for
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Buffer size preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferSize {
    /// Let the backend pick a sensible default
    #[default]
    Default,
    /// Request a specific size in frames
    Fixed(u32),
    /// Small known-good buffer for responsive knob feel
    LowLatency,
}

/// Audio output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name substring; `None` uses the system default
    pub device: Option<String>,
    /// Preferred sample rate; `None` uses [`DEFAULT_SAMPLE_RATE`]
    pub sample_rate: Option<u32>,
    /// Buffer size preference
    pub buffer_size: BufferSize,
}

impl AudioConfig {
    /// Resolve a buffer size in frames from the preference
    pub fn frames(&self) -> u32 {
        match self.buffer_size {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => frames.clamp(64, MAX_BUFFER_SIZE as u32),
            BufferSize::LowLatency => 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size_resolution() {
        let mut config = AudioConfig::default();
        assert_eq!(config.frames(), DEFAULT_BUFFER_SIZE);

        config.buffer_size = BufferSize::Fixed(16);
        assert_eq!(config.frames(), 64, "tiny sizes are clamped up");

        config.buffer_size = BufferSize::Fixed(1_000_000);
        assert_eq!(config.frames(), MAX_BUFFER_SIZE as u32);

        config.buffer_size = BufferSize::LowLatency;
        assert_eq!(config.frames(), 256);
    }

    #[test]
    fn test_config_yaml_roundtrip() {
        let config = AudioConfig {
            device: Some("USB Audio".to_string()),
            sample_rate: Some(48000),
            buffer_size: BufferSize::Fixed(256),
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: AudioConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.device.as_deref(), Some("USB Audio"));
        assert_eq!(parsed.frames(), 256);
    }
}
