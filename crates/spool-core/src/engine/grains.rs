//! Granular scrub playback
//!
//! Tape audio is produced as a stream of short overlapping grains rather than
//! by resampling the clip directly. Each engine tick tops up a lookahead
//! window: grains are scheduled at a spacing that tightens with tape speed,
//! each stamped with a start time on the sample clock, a source offset taken
//! from the playhead, and a playback rate wobbled by wow, flutter and a tiny
//! random drift. A fixed-size voice pool then renders scheduled grains into
//! the output, applying a trapezoid envelope per grain.
//!
//! The pool is pre-allocated and the scheduler hands grains over through a
//! spawn callback, so the audio thread never allocates.

use crate::clip::{AudioClip, TapeDirection};
use crate::config::TransportConfig;
use crate::types::{StereoBuffer, StereoSample};

/// Grain envelope attack time in seconds
const GRAIN_ATTACK: f64 = 0.012;

/// Grain envelope release time in seconds
const GRAIN_RELEASE: f64 = 0.022;

/// Grain envelope plateau gain
const GRAIN_PEAK: f32 = 0.78;

/// Peak-to-peak magnitude of the per-grain random rate drift
const RATE_JITTER: f64 = 0.0016;

/// Maximum simultaneous grain voices (live plus lookahead-pending)
pub const MAX_GRAIN_VOICES: usize = 64;

/// A scheduled grain, ready to be taken by a voice
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grain {
    /// Engine-clock sample at which the grain starts sounding
    pub start_sample: u64,
    /// Offset into the direction buffer, in clip frames
    pub offset_frames: f64,
    /// Wobbled playback rate (nominal 1.0)
    pub rate: f64,
    /// Which buffer the grain reads from
    pub direction: TapeDirection,
}

/// Schedules grains ahead of the output clock
pub struct GrainScheduler {
    config: TransportConfig,
    /// Engine-clock time (seconds) the next grain will start at
    next_grain_time: f64,
    rng: fastrand::Rng,
}

impl GrainScheduler {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            next_grain_time: 0.0,
            rng: fastrand::Rng::with_seed(0x5b00_1e5c),
        }
    }

    /// Forget the scheduling cursor; the next call snaps to the clock
    pub fn reset(&mut self) {
        self.next_grain_time = 0.0;
    }

    /// Top up the lookahead window with grains
    ///
    /// `now` is the engine clock in seconds, `speed` the smoothed tape speed,
    /// `playhead` the position in seconds. Does nothing inside the deadzone,
    /// so a stationary tape is silent. Emitted grains are handed to `spawn`.
    pub fn schedule<F>(
        &mut self,
        now: f64,
        speed: f64,
        playhead: f64,
        clip: &AudioClip,
        engine_rate: u32,
        mut spawn: F,
    ) where
        F: FnMut(Grain),
    {
        if speed.abs() <= self.config.deadzone || clip.is_empty() {
            return;
        }

        let forward = speed > 0.0;
        let direction = if forward {
            TapeDirection::Forward
        } else {
            TapeDirection::Reverse
        };

        // Faster tape = denser grains
        let speed_norm = (speed.abs() / self.config.max_speed_for(forward)).min(1.0);
        let step = self.config.step_max
            + (self.config.step_min - self.config.step_max) * speed_norm;

        if self.next_grain_time < now {
            self.next_grain_time = now;
        }

        let clip_rate = clip.sample_rate() as f64;
        let duration = clip.duration_seconds();

        while self.next_grain_time < now + self.config.lookahead {
            // The reverse buffer is time-mirrored, so its offset mirrors too
            let offset = if forward {
                playhead
            } else {
                (duration - playhead).max(0.0)
            };
            let offset = offset.clamp(0.0, (duration - self.config.grain_size).max(0.0));

            let t = self.next_grain_time;
            let wow = (2.0 * std::f64::consts::PI * self.config.wow_hz * t).sin()
                * self.config.wow_depth;
            let flutter = (2.0 * std::f64::consts::PI * self.config.flutter_hz * t).sin()
                * self.config.flutter_depth;
            let drift = (self.rng.f64() - 0.5) * RATE_JITTER;

            spawn(Grain {
                start_sample: (t * engine_rate as f64).round() as u64,
                offset_frames: offset * clip_rate,
                rate: 1.0 + wow + flutter + drift,
                direction,
            });

            self.next_grain_time += step;
        }
    }
}

/// One grain being (or waiting to be) rendered
#[derive(Debug, Clone, Copy)]
struct GrainVoice {
    active: bool,
    direction: TapeDirection,
    start_sample: u64,
    /// Read position in the source buffer, in clip frames
    src_pos: f64,
    /// Source frames this grain may consume in total
    src_remaining: f64,
    /// Clip frames advanced per output sample
    step: f64,
    /// Output samples rendered so far
    elapsed: u64,
    /// Envelope breakpoints, in output samples
    attack_end: u64,
    sustain_end: u64,
    release_end: u64,
}

impl GrainVoice {
    const IDLE: Self = Self {
        active: false,
        direction: TapeDirection::Forward,
        start_sample: 0,
        src_pos: 0.0,
        src_remaining: 0.0,
        step: 0.0,
        elapsed: 0,
        attack_end: 0,
        sustain_end: 0,
        release_end: 0,
    };

    /// Trapezoid envelope gain for the current output sample
    #[inline]
    fn envelope(&self) -> f32 {
        if self.elapsed < self.attack_end {
            GRAIN_PEAK * self.elapsed as f32 / self.attack_end as f32
        } else if self.elapsed < self.sustain_end {
            GRAIN_PEAK
        } else if self.elapsed < self.release_end {
            let fall = (self.elapsed - self.sustain_end) as f32
                / (self.release_end - self.sustain_end) as f32;
            GRAIN_PEAK * (1.0 - fall)
        } else {
            0.0
        }
    }
}

/// Fixed-capacity pool of grain voices
pub struct GrainVoicePool {
    voices: [GrainVoice; MAX_GRAIN_VOICES],
    grain_size: f64,
    engine_rate: u32,
}

impl GrainVoicePool {
    pub fn new(config: &TransportConfig, engine_rate: u32) -> Self {
        Self {
            voices: [GrainVoice::IDLE; MAX_GRAIN_VOICES],
            grain_size: config.grain_size,
            engine_rate,
        }
    }

    /// Take a free voice for a scheduled grain; a full pool drops the grain
    pub fn spawn(&mut self, grain: Grain, clip: &AudioClip) {
        let Some(voice) = self.voices.iter_mut().find(|v| !v.active) else {
            return;
        };

        let clip_rate = clip.sample_rate() as f64;
        let sr = self.engine_rate as f64;

        // Envelope is sized so attack + sustain + release = grain_size
        let attack = (GRAIN_ATTACK * sr) as u64;
        let sustain = ((self.grain_size - GRAIN_ATTACK - GRAIN_RELEASE).max(0.0) * sr) as u64;
        let release = (GRAIN_RELEASE * sr) as u64;

        *voice = GrainVoice {
            active: true,
            direction: grain.direction,
            start_sample: grain.start_sample,
            src_pos: grain.offset_frames,
            src_remaining: self.grain_size * clip_rate,
            // Device/clip rate mismatch folds into the per-sample step
            step: grain.rate * clip_rate / sr,
            elapsed: 0,
            attack_end: attack.max(1),
            sustain_end: attack + sustain,
            release_end: attack + sustain + release,
        };
    }

    /// Number of voices currently held (pending or sounding)
    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.active).count()
    }

    /// Drop every voice (tape stopped hard or clip replaced)
    pub fn clear(&mut self) {
        for voice in &mut self.voices {
            voice.active = false;
        }
    }

    /// Mix all voices into `out`, which covers samples starting at `block_start`
    pub fn render(&mut self, clip: &AudioClip, block_start: u64, out: &mut [StereoSample]) {
        let block_len = out.len() as u64;
        for voice in &mut self.voices {
            if !voice.active {
                continue;
            }
            // Still waiting inside the lookahead window
            if voice.start_sample >= block_start + block_len {
                continue;
            }

            let buf = clip.buffer(voice.direction);
            let first = voice.start_sample.saturating_sub(block_start) as usize;

            for frame in out[first..].iter_mut() {
                if voice.src_remaining <= 0.0 || voice.elapsed >= voice.release_end {
                    voice.active = false;
                    break;
                }
                let gain = voice.envelope();
                *frame += sample_at(buf, voice.src_pos).scale(gain);
                voice.src_pos += voice.step;
                voice.src_remaining -= voice.step;
                voice.elapsed += 1;
            }
        }
    }
}

/// Linear-interpolated stereo read, silent past either end
#[inline]
fn sample_at(buf: &StereoBuffer, pos: f64) -> StereoSample {
    if pos < 0.0 {
        return StereoSample::silence();
    }
    let base = pos as usize;
    if base + 1 >= buf.len() {
        return StereoSample::silence();
    }
    let frac = (pos - base as f64) as f32;
    let a = buf[base];
    let b = buf[base + 1];
    StereoSample::new(
        a.left + (b.left - a.left) * frac,
        a.right + (b.right - a.right) * frac,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44100;

    fn test_clip(seconds: f64) -> AudioClip {
        let frames = (seconds * SR as f64) as usize;
        let mut buffer = StereoBuffer::with_capacity(frames);
        for i in 0..frames {
            buffer.push(StereoSample::mono((i as f32 * 0.01).sin() * 0.5));
        }
        AudioClip::new(buffer, SR)
    }

    fn collect_grains(speed: f64, playhead: f64, clip: &AudioClip) -> Vec<Grain> {
        let mut sched = GrainScheduler::new(TransportConfig::default());
        let mut grains = Vec::new();
        sched.schedule(1.0, speed, playhead, clip, SR, |g| grains.push(g));
        grains
    }

    #[test]
    fn test_moderate_speed_fills_lookahead() {
        // speed 0.02 of max 0.028 -> step ~= 0.0257s, six grains in 0.14s
        let clip = test_clip(30.0);
        let grains = collect_grains(0.02, 10.0, &clip);
        assert_eq!(grains.len(), 6);

        let spacing = (grains[1].start_sample - grains[0].start_sample) as f64 / SR as f64;
        assert!((spacing - 0.0257).abs() < 0.001, "spacing {}", spacing);

        for g in &grains {
            assert_eq!(g.direction, TapeDirection::Forward);
            assert!((g.rate - 1.0).abs() < 0.01, "rate wandered: {}", g.rate);
        }
    }

    #[test]
    fn test_deadzone_schedules_nothing() {
        let clip = test_clip(30.0);
        assert!(collect_grains(0.00005, 10.0, &clip).is_empty());
        assert!(collect_grains(0.0, 10.0, &clip).is_empty());
    }

    #[test]
    fn test_reverse_grains_mirror_offset() {
        let clip = test_clip(30.0);
        let grains = collect_grains(-0.02, 10.0, &clip);
        assert!(!grains.is_empty());
        let g = grains[0];
        assert_eq!(g.direction, TapeDirection::Reverse);
        // playhead 10s from the start = 20s from the end of a 30s tape
        assert!((g.offset_frames / SR as f64 - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_offset_clamped_before_tape_end() {
        let clip = test_clip(30.0);
        let grains = collect_grains(0.027, 29.99, &clip);
        let max_offset = (30.0 - TransportConfig::default().grain_size) * SR as f64;
        for g in &grains {
            assert!(g.offset_frames <= max_offset + 1.0);
        }
    }

    #[test]
    fn test_faster_tape_packs_grains_tighter() {
        let clip = test_clip(30.0);
        let slow = collect_grains(0.005, 10.0, &clip);
        let fast = collect_grains(0.028, 10.0, &clip);
        assert!(fast.len() > slow.len());
    }

    #[test]
    fn test_scheduler_does_not_double_book() {
        let clip = test_clip(30.0);
        let mut sched = GrainScheduler::new(TransportConfig::default());
        let mut count = 0;
        sched.schedule(1.0, 0.02, 10.0, &clip, SR, |_| count += 1);
        let first = count;
        // Same clock again: window is already full
        sched.schedule(1.0, 0.02, 10.0, &clip, SR, |_| count += 1);
        assert_eq!(count, first);
        // Advancing the clock opens room for more
        sched.schedule(1.05, 0.02, 10.0, &clip, SR, |_| count += 1);
        assert!(count > first);
    }

    #[test]
    fn test_voice_renders_enveloped_audio() {
        let clip = test_clip(30.0);
        let cfg = TransportConfig::default();
        let mut pool = GrainVoicePool::new(&cfg, SR);

        pool.spawn(
            Grain {
                start_sample: 0,
                offset_frames: SR as f64, // 1s in
                rate: 1.0,
                direction: TapeDirection::Forward,
            },
            &clip,
        );
        assert_eq!(pool.active_count(), 1);

        // Render well past the grain's 0.06s length
        let mut rendered = StereoBuffer::silence(4096);
        pool.render(&clip, 0, rendered.as_mut_slice());

        // First sample sits at the very foot of the attack ramp
        assert!(rendered[0].left.abs() < 1e-3);
        assert!(rendered.peak() > 0.0);

        // Voice retired itself after consuming its grain
        assert_eq!(pool.active_count(), 0);

        // Nothing audible past the grain end (0.06s = 2646 samples)
        let tail_start = (0.061 * SR as f64) as usize;
        for s in &rendered.as_slice()[tail_start..] {
            assert_eq!(s.left, 0.0);
        }
    }

    #[test]
    fn test_pending_voice_waits_for_its_start() {
        let clip = test_clip(30.0);
        let cfg = TransportConfig::default();
        let mut pool = GrainVoicePool::new(&cfg, SR);

        pool.spawn(
            Grain {
                start_sample: 1000,
                offset_frames: SR as f64,
                rate: 1.0,
                direction: TapeDirection::Forward,
            },
            &clip,
        );

        let mut out = StereoBuffer::silence(512);
        pool.render(&clip, 0, out.as_mut_slice());
        assert_eq!(out.peak(), 0.0, "grain sounded before its start time");
        assert_eq!(pool.active_count(), 1);

        // Block containing sample 1000: audio starts exactly there
        let mut out = StereoBuffer::silence(512);
        pool.render(&clip, 768, out.as_mut_slice());
        for s in &out.as_slice()[..232] {
            assert_eq!(s.left, 0.0);
        }
        assert!(out.as_slice()[232..].iter().any(|s| s.left != 0.0));
    }

    #[test]
    fn test_full_pool_drops_grains() {
        let clip = test_clip(30.0);
        let cfg = TransportConfig::default();
        let mut pool = GrainVoicePool::new(&cfg, SR);
        for i in 0..(MAX_GRAIN_VOICES + 10) {
            pool.spawn(
                Grain {
                    start_sample: i as u64 * 100,
                    offset_frames: 0.0,
                    rate: 1.0,
                    direction: TapeDirection::Forward,
                },
                &clip,
            );
        }
        assert_eq!(pool.active_count(), MAX_GRAIN_VOICES);
    }

    #[test]
    fn test_clear_silences_pool() {
        let clip = test_clip(30.0);
        let cfg = TransportConfig::default();
        let mut pool = GrainVoicePool::new(&cfg, SR);
        pool.spawn(
            Grain {
                start_sample: 0,
                offset_frames: 0.0,
                rate: 1.0,
                direction: TapeDirection::Forward,
            },
            &clip,
        );
        pool.clear();
        assert_eq!(pool.active_count(), 0);
    }
}
