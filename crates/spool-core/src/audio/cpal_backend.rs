//! CPAL audio backend
//!
//! Opens a single stereo output stream and moves the [`TapeEngine`] into its
//! callback. The callback owns the engine exclusively: the UI talks to it
//! through the lock-free command queue and reads transport state back through
//! relaxed atomics, so no lock is ever taken on the audio thread.
//!
//! ```text
//! ┌──────────────┐ ──commands──► ┌─────────────────────┐
//! │   UI thread   │               │  CPAL audio thread  │
//! │               │ ◄──atomics──  │  (owns TapeEngine)  │
//! │  (analyser)   │ ◄──mono tap── │                     │
//! └──────────────┘               └─────────────────────┘
//! ```

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, MAX_BUFFER_SIZE};
use super::error::{AudioError, AudioResult};
use crate::config::TransportConfig;
use crate::engine::{EngineHandle, TapeEngine};
use crate::types::StereoBuffer;

/// Keeps the audio stream alive; drop to stop audio
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    /// Sample rate of the running stream
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Negotiated buffer size in frames
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// Everything the caller needs after the audio system starts
pub struct AudioSystemResult {
    /// Keeps the stream alive
    pub handle: AudioHandle,
    /// Command/state handle for the UI
    pub engine: EngineHandle,
    /// Mono post-tone tap for the spectrum analyser
    pub spectrum_tap: rtrb::Consumer<f32>,
    pub sample_rate: u32,
    pub buffer_size: u32,
}

/// Start the audio output and put a tape engine on it
pub fn start_audio_system(
    config: &AudioConfig,
    transport: TransportConfig,
) -> AudioResult<AudioSystemResult> {
    let device = find_output_device(config)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let (supported_config, buffer_size) = get_output_config(&device, config)?;
    let sample_rate = supported_config.sample_rate().0;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        (buffer_size as f32 / sample_rate as f32) * 1000.0
    );

    let (engine_handle, engine, spectrum_tap) = TapeEngine::new(transport, sample_rate);

    let stream = build_output_stream(&device, &stream_config, engine)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(AudioSystemResult {
        handle: AudioHandle {
            _stream: stream,
            sample_rate,
            buffer_size,
        },
        engine: engine_handle,
        spectrum_tap,
        sample_rate,
        buffer_size,
    })
}

/// Pick an output device, matching the configured name as a substring
fn find_output_device(config: &AudioConfig) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();

    if let Some(wanted) = &config.device {
        let devices = host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?;
        for device in devices {
            if let Ok(name) = device.name() {
                if name.contains(wanted.as_str()) {
                    return Ok(device);
                }
            }
        }
        return Err(AudioError::DeviceNotFound(wanted.clone()));
    }

    host.default_output_device()
        .ok_or(AudioError::NoDefaultDevice)
}

/// Get the best output configuration for a device
///
/// Returns (SupportedStreamConfig, buffer size in frames). Prefers f32
/// stereo at the requested sample rate, falling back to whatever the
/// device offers.
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<(cpal::SupportedStreamConfig, u32)> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    if supported_configs.is_empty() {
        return Err(AudioError::ConfigError(
            "No supported output configurations".to_string(),
        ));
    }

    let target_sample_rate = config
        .sample_rate
        .unwrap_or(super::config::DEFAULT_SAMPLE_RATE);

    let best_config = supported_configs
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= 2)
        .find(|c| {
            target_sample_rate >= c.min_sample_rate().0
                && target_sample_rate <= c.max_sample_rate().0
        })
        .or_else(|| supported_configs.iter().find(|c| c.channels() >= 2))
        .or_else(|| supported_configs.first())
        .ok_or_else(|| {
            AudioError::ConfigError("No suitable output configuration found".to_string())
        })?;

    let sample_rate = if target_sample_rate >= best_config.min_sample_rate().0
        && target_sample_rate <= best_config.max_sample_rate().0
    {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    let stream_config = best_config.clone().with_sample_rate(sample_rate);

    Ok((stream_config, config.frames()))
}

/// Build the output stream, moving the engine into the callback
fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: TapeEngine,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;
    let mut render_buffer = StereoBuffer::silence(MAX_BUFFER_SIZE);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let n_frames = (data.len() / channels).min(MAX_BUFFER_SIZE);

                // RT-safe: resizes within pre-allocated capacity
                render_buffer.set_len_from_capacity(n_frames);
                engine.process(&mut render_buffer);

                let samples = render_buffer.as_slice();
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    if i < samples.len() {
                        let sample = samples[i];
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    } else {
                        for ch in frame.iter_mut() {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
