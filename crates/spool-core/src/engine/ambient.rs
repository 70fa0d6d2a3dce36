//! Mechanical ambience: hiss, rewind squeal, direction-change clicks
//!
//! Three always-present layers sell the tape-machine illusion:
//!
//! - a looping hiss bed, low-passed and a touch louder when the tape is
//!   running forward
//! - a band-passed squeal that fades up with reverse speed
//! - a short square-wave click fired once on every direction reversal
//!
//! All three are mixed in before the tone chain so they take on the same
//! color as the tape audio. Gains move through one-pole smoothers, never
//! stepping discontinuously.

use crate::config::TransportConfig;
use crate::engine::motion::MotionDirection;
use crate::engine::tone::Biquad;
use crate::types::StereoSample;

const HISS_AMP: f32 = 0.11;
const HISS_LP_HZ: f32 = 6500.0;
const HISS_GAIN_FORWARD: f32 = 0.028;
const HISS_GAIN_REVERSE: f32 = 0.016;
const HISS_GAIN_IDLE: f32 = 0.010;
const HISS_TC_MOVING: f32 = 0.05;
const HISS_TC_IDLE: f32 = 0.08;

const SQUEAL_AMP: f32 = 0.20;
const SQUEAL_BP_HZ: f32 = 2400.0;
const SQUEAL_BP_Q: f32 = 1.1;
const SQUEAL_GAIN_MAX: f32 = 0.20;
const SQUEAL_TC_ON: f32 = 0.03;
const SQUEAL_TC_OFF: f32 = 0.04;

const CLICK_HZ: f32 = 1300.0;
const CLICK_PEAK: f32 = 0.06;
const CLICK_ATTACK: f32 = 0.002;
const CLICK_DECAY_END: f32 = 0.03;
const CLICK_STOP: f32 = 0.035;
const CLICK_FLOOR: f32 = 0.0001;

/// Rapid knob jiggling can stack reversals before a click dies out
const MAX_CLICKS: usize = 4;

/// One-pole gain smoother, `setTargetAtTime`-style
struct SmoothedGain {
    value: f32,
    target: f32,
    coef: f32,
    sample_rate: f32,
}

impl SmoothedGain {
    fn new(sample_rate: u32, initial: f32) -> Self {
        Self {
            value: initial,
            target: initial,
            coef: 0.0,
            sample_rate: sample_rate as f32,
        }
    }

    /// Aim at `target`, approaching with the given time constant (seconds)
    fn set_target(&mut self, target: f32, time_constant: f32) {
        self.target = target;
        self.coef = 1.0 - (-1.0 / (time_constant * self.sample_rate)).exp();
    }

    #[inline]
    fn next(&mut self) -> f32 {
        self.value += (self.target - self.value) * self.coef;
        self.value
    }
}

/// A one-second loop of white noise
struct NoiseLoop {
    samples: Vec<f32>,
    pos: usize,
}

impl NoiseLoop {
    fn new(sample_rate: u32, amp: f32, seed: u64) -> Self {
        let mut rng = fastrand::Rng::with_seed(seed);
        let samples = (0..sample_rate as usize)
            .map(|_| (rng.f32() * 2.0 - 1.0) * amp)
            .collect();
        Self { samples, pos: 0 }
    }

    #[inline]
    fn next(&mut self) -> f32 {
        let s = self.samples[self.pos];
        self.pos += 1;
        if self.pos == self.samples.len() {
            self.pos = 0;
        }
        s
    }
}

/// Square-wave click burst with a 2 ms attack and exponential tail
#[derive(Clone, Copy)]
struct ClickVoice {
    active: bool,
    phase: f32,
    elapsed: u32,
    gain: f32,
}

impl ClickVoice {
    const IDLE: Self = Self {
        active: false,
        phase: 0.0,
        elapsed: 0,
        gain: 0.0,
    };
}

/// The full ambience generator
pub struct AmbientLayer {
    sample_rate: u32,
    max_reverse_speed: f64,
    deadzone: f64,

    hiss_noise: NoiseLoop,
    hiss_lp: Biquad,
    hiss_gain: SmoothedGain,

    squeal_noise: NoiseLoop,
    squeal_bp: Biquad,
    squeal_gain: SmoothedGain,

    clicks: [ClickVoice; MAX_CLICKS],
    /// Last non-stopped direction, for reversal detection
    last_direction: Option<MotionDirection>,

    click_attack_samples: u32,
    click_stop_samples: u32,
    click_decay_mult: f32,
    click_phase_inc: f32,
}

impl AmbientLayer {
    pub fn new(config: &TransportConfig, sample_rate: u32) -> Self {
        let mut hiss_lp = Biquad::new();
        hiss_lp.set_lowpass(sample_rate, HISS_LP_HZ, 0.707);
        let mut squeal_bp = Biquad::new();
        squeal_bp.set_bandpass(sample_rate, SQUEAL_BP_HZ, SQUEAL_BP_Q);

        let sr = sample_rate as f32;
        let decay_samples = (CLICK_DECAY_END - CLICK_ATTACK) * sr;

        Self {
            sample_rate,
            max_reverse_speed: config.max_reverse_speed,
            deadzone: config.deadzone,
            hiss_noise: NoiseLoop::new(sample_rate, HISS_AMP, 0x4155_7353),
            hiss_lp,
            hiss_gain: SmoothedGain::new(sample_rate, HISS_GAIN_IDLE),
            squeal_noise: NoiseLoop::new(sample_rate, SQUEAL_AMP, 0x5153_4c21),
            squeal_bp,
            squeal_gain: SmoothedGain::new(sample_rate, 0.0),
            clicks: [ClickVoice::IDLE; MAX_CLICKS],
            last_direction: None,
            click_attack_samples: (CLICK_ATTACK * sr) as u32,
            click_stop_samples: (CLICK_STOP * sr) as u32,
            click_decay_mult: (CLICK_FLOOR / CLICK_PEAK).powf(1.0 / decay_samples),
            click_phase_inc: CLICK_HZ / sr,
        }
    }

    /// Update gain targets and reversal detection from the current tape speed
    ///
    /// Called once per engine tick. Passing through the deadzone does not
    /// count as settling: a forward-coast-reverse gesture still clicks.
    pub fn update(&mut self, speed: f64) {
        let direction = if speed > self.deadzone {
            MotionDirection::Forward
        } else if speed < -self.deadzone {
            MotionDirection::Reverse
        } else {
            MotionDirection::Stopped
        };

        if direction != MotionDirection::Stopped {
            if let Some(last) = self.last_direction {
                if last != direction {
                    self.trigger_click();
                }
            }
            self.last_direction = Some(direction);
        }

        match direction {
            MotionDirection::Forward => {
                self.hiss_gain.set_target(HISS_GAIN_FORWARD, HISS_TC_MOVING)
            }
            MotionDirection::Reverse => {
                self.hiss_gain.set_target(HISS_GAIN_REVERSE, HISS_TC_MOVING)
            }
            MotionDirection::Stopped => self.hiss_gain.set_target(HISS_GAIN_IDLE, HISS_TC_IDLE),
        }

        if direction == MotionDirection::Reverse {
            let amount =
                (speed.abs() / self.max_reverse_speed) as f32 * SQUEAL_GAIN_MAX;
            self.squeal_gain
                .set_target(amount.min(SQUEAL_GAIN_MAX), SQUEAL_TC_ON);
        } else {
            self.squeal_gain.set_target(0.0, SQUEAL_TC_OFF);
        }
    }

    fn trigger_click(&mut self) {
        if let Some(voice) = self.clicks.iter_mut().find(|c| !c.active) {
            *voice = ClickVoice {
                active: true,
                phase: 0.0,
                elapsed: 0,
                gain: 0.0,
            };
        }
    }

    /// Add the ambience into `out`
    pub fn render(&mut self, out: &mut [StereoSample]) {
        for frame in out.iter_mut() {
            let hiss = self.hiss_lp.process_mono(self.hiss_noise.next()) * self.hiss_gain.next();
            let squeal =
                self.squeal_bp.process_mono(self.squeal_noise.next()) * self.squeal_gain.next();

            let mut click = 0.0;
            for voice in &mut self.clicks {
                if !voice.active {
                    continue;
                }
                if voice.elapsed < self.click_attack_samples {
                    voice.gain = CLICK_PEAK * voice.elapsed as f32
                        / self.click_attack_samples as f32;
                } else {
                    voice.gain *= self.click_decay_mult;
                }
                let square = if voice.phase < 0.5 { 1.0 } else { -1.0 };
                click += square * voice.gain;

                voice.phase += self.click_phase_inc;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
                voice.elapsed += 1;
                if voice.elapsed >= self.click_stop_samples {
                    voice.active = false;
                }
            }

            *frame += StereoSample::mono(hiss + squeal + click);
        }
    }

    /// Current smoothed hiss gain (for tests and debug views)
    pub fn hiss_level(&self) -> f32 {
        self.hiss_gain.value
    }

    /// Current smoothed squeal gain
    pub fn squeal_level(&self) -> f32 {
        self.squeal_gain.value
    }

    /// Number of click bursts currently sounding
    pub fn active_clicks(&self) -> usize {
        self.clicks.iter().filter(|c| c.active).count()
    }

    /// Engine sample rate this layer was built for
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoBuffer;

    const SR: u32 = 44100;

    fn layer() -> AmbientLayer {
        AmbientLayer::new(&TransportConfig::default(), SR)
    }

    fn settle(layer: &mut AmbientLayer, speed: f64, ticks: usize) {
        let mut buf = StereoBuffer::silence(SR as usize / 60);
        for _ in 0..ticks {
            layer.update(speed);
            buf.fill_silence();
            layer.render(buf.as_mut_slice());
        }
    }

    #[test]
    fn test_one_click_per_reversal() {
        let mut a = layer();
        a.update(0.01);
        assert_eq!(a.active_clicks(), 0, "first motion is not a reversal");

        a.update(-0.01);
        assert_eq!(a.active_clicks(), 1);

        // Staying in reverse fires nothing further
        a.update(-0.02);
        a.update(-0.015);
        assert_eq!(a.active_clicks(), 1);
    }

    #[test]
    fn test_reversal_through_deadzone_still_clicks() {
        let mut a = layer();
        a.update(0.01);
        a.update(0.0);
        a.update(0.00003); // inside the deadzone
        assert_eq!(a.active_clicks(), 0);
        a.update(-0.01);
        assert_eq!(a.active_clicks(), 1);
    }

    #[test]
    fn test_click_dies_within_its_burst_length() {
        let mut a = layer();
        a.update(0.01);
        a.update(-0.01);
        assert_eq!(a.active_clicks(), 1);

        // 35ms of audio retires the burst
        let mut buf = StereoBuffer::silence((0.036 * SR as f64) as usize);
        a.render(buf.as_mut_slice());
        assert_eq!(a.active_clicks(), 0);
        assert!(buf.peak() > 0.0);
    }

    #[test]
    fn test_idle_hiss_settles_at_floor_level() {
        let mut a = layer();
        settle(&mut a, 0.0, 120);
        assert!((a.hiss_level() - HISS_GAIN_IDLE).abs() < 0.001);

        settle(&mut a, 0.02, 120);
        assert!((a.hiss_level() - HISS_GAIN_FORWARD).abs() < 0.002);

        settle(&mut a, -0.02, 120);
        assert!((a.hiss_level() - HISS_GAIN_REVERSE).abs() < 0.002);
    }

    #[test]
    fn test_squeal_tracks_reverse_speed_only() {
        let mut a = layer();
        settle(&mut a, 0.02, 120);
        assert!(a.squeal_level() < 0.001, "no squeal going forward");

        settle(&mut a, -0.018, 120);
        let half = a.squeal_level();
        assert!(half > 0.01);

        settle(&mut a, -0.036, 120);
        assert!(a.squeal_level() > half, "squeal scales with reverse speed");
        assert!(a.squeal_level() <= SQUEAL_GAIN_MAX + 0.001);
    }

    #[test]
    fn test_hiss_is_always_audible() {
        let mut a = layer();
        let mut buf = StereoBuffer::silence(SR as usize / 10);
        a.render(buf.as_mut_slice());
        assert!(buf.peak() > 0.0);
        // Mono ambience lands identically on both channels
        assert_eq!(buf[100].left, buf[100].right);
    }
}
