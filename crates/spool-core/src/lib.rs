//! Spool - a simulated tape-recorder instrument
//!
//! A rotary knob winds a virtual tape reel: knob deltas become tape speed,
//! tape speed moves a playhead, and the playhead is voiced as a gapless
//! stream of overlapping audio grains with wow and flutter, mechanical
//! ambience, and a tape-style tone chain on the output.

pub mod audio;
pub mod clip;
pub mod config;
pub mod engine;
pub mod loader;
pub mod spectrum;
pub mod types;

pub use types::*;
