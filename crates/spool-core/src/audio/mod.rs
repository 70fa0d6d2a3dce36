//! Audio output for the tape instrument
//!
//! A single stereo CPAL stream whose callback owns the [`TapeEngine`]. The
//! design is lock-free end to end: the UI sends commands over a ringbuffer,
//! reads transport state from relaxed atomics, and pulls the analyser feed
//! from a mono sample tap.

mod config;
mod cpal_backend;
mod error;

pub use config::{
    AudioConfig, BufferSize, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use cpal_backend::{start_audio_system, AudioHandle, AudioSystemResult};
pub use error::{AudioError, AudioResult};
