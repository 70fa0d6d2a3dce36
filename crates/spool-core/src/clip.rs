//! Audio clip store - the immutable tape
//!
//! An [`AudioClip`] holds the decoded PCM of the loaded recording twice: once
//! forward and once time-reversed. Reverse playback reads the reversed copy
//! linearly instead of seeking backwards through the forward buffer, which
//! keeps grain rendering a simple forward read regardless of direction.
//!
//! Clips are built once after decode and never mutated. The engine holds them
//! as `basedrop::Shared<AudioClip>` so that replacing a clip on the audio
//! thread defers the (potentially large) deallocation to the GC thread.

use crate::types::StereoBuffer;

/// Playback direction through the tape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapeDirection {
    /// Reading the forward buffer (positive tape speed)
    Forward,
    /// Reading the time-reversed buffer (negative tape speed)
    Reverse,
}

/// Decoded audio clip with forward and time-reversed PCM
///
/// Invariant: `reverse[i] == forward[len - 1 - i]` per channel; both buffers
/// always have equal length.
#[derive(Debug, Clone)]
pub struct AudioClip {
    /// Forward PCM
    forward: StereoBuffer,
    /// Time-reversed PCM (same length as forward)
    reverse: StereoBuffer,
    /// Sample rate the PCM was decoded at
    sample_rate: u32,
}

impl AudioClip {
    /// Create a clip from forward PCM, computing the reversed copy
    pub fn new(forward: StereoBuffer, sample_rate: u32) -> Self {
        let reverse = forward.reversed();
        Self {
            forward,
            reverse,
            sample_rate,
        }
    }

    /// Get the buffer for a playback direction
    #[inline]
    pub fn buffer(&self, direction: TapeDirection) -> &StereoBuffer {
        match direction {
            TapeDirection::Forward => &self.forward,
            TapeDirection::Reverse => &self.reverse,
        }
    }

    /// Clip length in frames
    #[inline]
    pub fn len_frames(&self) -> usize {
        self.forward.len()
    }

    /// Check if the clip contains no audio
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Sample rate of the decoded PCM
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Clip duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.forward.len() as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn ramp_clip(len: usize) -> AudioClip {
        let mut buffer = StereoBuffer::with_capacity(len);
        for i in 0..len {
            buffer.push(StereoSample::mono(i as f32));
        }
        AudioClip::new(buffer, 1000)
    }

    #[test]
    fn test_reverse_buffer_mirrors_forward() {
        let clip = ramp_clip(100);
        let fwd = clip.buffer(TapeDirection::Forward);
        let rev = clip.buffer(TapeDirection::Reverse);

        assert_eq!(fwd.len(), rev.len());
        for i in 0..fwd.len() {
            assert_eq!(rev[i], fwd[fwd.len() - 1 - i]);
        }
    }

    #[test]
    fn test_duration() {
        let clip = ramp_clip(2500);
        assert!((clip.duration_seconds() - 2.5).abs() < 1e-9);
    }
}
