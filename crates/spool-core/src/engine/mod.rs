//! Real-time tape engine
//!
//! Everything that runs on (or feeds) the audio thread:
//!
//! - [`motion`]: knob-to-playhead physics on a 60 Hz tick
//! - [`grains`]: lookahead grain scheduling and the rendering voice pool
//! - [`ambient`]: hiss, rewind squeal and reversal clicks
//! - [`tone`]: the fixed output-coloring filter chain
//! - [`command`]: the lock-free UI-to-audio command queue
//! - [`gc`]: deferred deallocation for clip buffers
//! - [`engine`]: the [`TapeEngine`] that wires them together

pub mod ambient;
pub mod command;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod gc;
pub mod grains;
pub mod motion;
pub mod tone;

pub use command::{command_channel, EngineCommand};
pub use engine::{EngineHandle, TapeEngine, TransportAtomics, TICK_HZ};
pub use grains::{Grain, GrainScheduler, GrainVoicePool, MAX_GRAIN_VOICES};
pub use motion::{MotionDirection, MotionIntegrator};
pub use tone::{Biquad, SoftSaturator, ToneChain};
