//! Lock-free command queue for real-time engine control
//!
//! The UI thread sends commands through a wait-free `rtrb` ring buffer and
//! the audio thread drains them at the top of each callback. Neither side
//! ever blocks or allocates, so knob gestures can stream in at pointer-move
//! rate without risking dropouts.

use basedrop::Shared;

use crate::clip::AudioClip;
use crate::config::ToneMode;

/// Commands sent from the UI thread to the audio thread
///
/// Each variant is an atomic operation, applied at a block boundary. The
/// clip travels as a `Shared` pointer so swapping tapes on the audio thread
/// is pointer-sized and the old clip is freed off-thread.
pub enum EngineCommand {
    /// Put a new tape on the machine; resets playhead and motion
    LoadClip(Shared<AudioClip>),
    /// Knob rotation delta in degrees (positive = forward wind)
    KnobDelta(f64),
    /// Jump the playhead to a position in seconds, killing motion
    Seek(f64),
    /// Kill all motion; in-flight grains finish their envelopes
    Stop,
    /// Switch the tone chain preset
    SetToneMode(ToneMode),
}

/// Capacity of the command queue
///
/// Knob deltas arrive one per pointer event, comfortably under a thousand
/// per second; 256 slots is ample headroom between audio callbacks.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a command channel (producer for the UI, consumer for the engine)
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
