//! Tone-shaping chain - the "tape machine" output color
//!
//! A fixed cascade every signal (grains, hiss, squeal, clicks) passes through
//! before the analyser tap and the output:
//!
//! ```text
//! in -> HPF (rumble) -> presence peak -> tremolo AM -> soft saturation -> LPF
//! ```
//!
//! The two presets ([`ToneMode::Tape`] / [`ToneMode::Radio`]) share this
//! topology; the tape preset runs the tremolo stage at zero depth, which
//! bypasses it.

use crate::config::{ToneMode, TonePreset};
use crate::types::StereoBuffer;

/// Two-pole RBJ biquad filter (direct form I, stereo state)
pub struct Biquad {
    // Normalized coefficients
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,
    // State per channel
    x1_l: f32,
    x2_l: f32,
    y1_l: f32,
    y2_l: f32,
    x1_r: f32,
    x2_r: f32,
    y1_r: f32,
    y2_r: f32,
}

impl Biquad {
    /// Create a pass-through biquad
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1_l: 0.0,
            x2_l: 0.0,
            y1_l: 0.0,
            y2_l: 0.0,
            x1_r: 0.0,
            x2_r: 0.0,
            y1_r: 0.0,
            y2_r: 0.0,
        }
    }

    fn set_normalized(&mut self, b0: f32, b1: f32, b2: f32, a0: f32, a1: f32, a2: f32) {
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    fn omega(sample_rate: u32, cutoff: f32) -> (f32, f32, f32) {
        let cutoff = cutoff.clamp(10.0, sample_rate as f32 * 0.45);
        let w = 2.0 * std::f32::consts::PI * cutoff / sample_rate as f32;
        (w.sin(), w.cos(), w)
    }

    /// Configure as a low-pass filter
    pub fn set_lowpass(&mut self, sample_rate: u32, cutoff: f32, q: f32) {
        let (sin_w, cos_w, _) = Self::omega(sample_rate, cutoff);
        let alpha = sin_w / (2.0 * q.max(0.1));
        self.set_normalized(
            (1.0 - cos_w) / 2.0,
            1.0 - cos_w,
            (1.0 - cos_w) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        );
    }

    /// Configure as a high-pass filter
    pub fn set_highpass(&mut self, sample_rate: u32, cutoff: f32, q: f32) {
        let (sin_w, cos_w, _) = Self::omega(sample_rate, cutoff);
        let alpha = sin_w / (2.0 * q.max(0.1));
        self.set_normalized(
            (1.0 + cos_w) / 2.0,
            -(1.0 + cos_w),
            (1.0 + cos_w) / 2.0,
            1.0 + alpha,
            -2.0 * cos_w,
            1.0 - alpha,
        );
    }

    /// Configure as a peaking EQ with the given boost/cut in dB
    pub fn set_peaking(&mut self, sample_rate: u32, center: f32, q: f32, gain_db: f32) {
        let (sin_w, cos_w, _) = Self::omega(sample_rate, center);
        let a = 10.0_f32.powf(gain_db / 40.0);
        let alpha = sin_w / (2.0 * q.max(0.1));
        self.set_normalized(
            1.0 + alpha * a,
            -2.0 * cos_w,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos_w,
            1.0 - alpha / a,
        );
    }

    /// Configure as a band-pass filter (0 dB peak gain)
    pub fn set_bandpass(&mut self, sample_rate: u32, center: f32, q: f32) {
        let (sin_w, cos_w, _) = Self::omega(sample_rate, center);
        let alpha = sin_w / (2.0 * q.max(0.1));
        self.set_normalized(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w, 1.0 - alpha);
    }

    /// Process one stereo frame
    #[inline]
    pub fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let out_l = self.b0 * left + self.b1 * self.x1_l + self.b2 * self.x2_l
            - self.a1 * self.y1_l
            - self.a2 * self.y2_l;
        self.x2_l = self.x1_l;
        self.x1_l = left;
        self.y2_l = self.y1_l;
        self.y1_l = out_l;

        let out_r = self.b0 * right + self.b1 * self.x1_r + self.b2 * self.x2_r
            - self.a1 * self.y1_r
            - self.a2 * self.y2_r;
        self.x2_r = self.x1_r;
        self.x1_r = right;
        self.y2_r = self.y1_r;
        self.y1_r = out_r;

        (out_l, out_r)
    }

    /// Process one mono sample (left channel state only)
    #[inline]
    pub fn process_mono(&mut self, input: f32) -> f32 {
        let out = self.b0 * input + self.b1 * self.x1_l + self.b2 * self.x2_l
            - self.a1 * self.y1_l
            - self.a2 * self.y2_l;
        self.x2_l = self.x1_l;
        self.x1_l = input;
        self.y2_l = self.y1_l;
        self.y1_l = out;
        out
    }

    /// Clear filter state
    pub fn reset(&mut self) {
        self.x1_l = 0.0;
        self.x2_l = 0.0;
        self.y1_l = 0.0;
        self.y2_l = 0.0;
        self.x1_r = 0.0;
        self.x2_r = 0.0;
        self.y1_r = 0.0;
        self.y2_r = 0.0;
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

/// Soft tape-style saturation
///
/// `y = tanh(k x) / tanh(k)` with `k = 2 + 8 * amount`. The tanh(k)
/// normalization keeps output within [-1, 1] and makes the curve hit exactly
/// 1.0 at full-scale input.
pub struct SoftSaturator {
    k: f32,
    norm: f32,
}

impl SoftSaturator {
    /// Create a saturator; `amount` in [0, 1] maps to curve sharpness
    pub fn new(amount: f32) -> Self {
        let k = 2.0 + amount.clamp(0.0, 1.0) * 8.0;
        Self {
            k,
            norm: k.tanh(),
        }
    }

    /// Shape one sample
    ///
    /// Input is pinned to [-1, 1] before the curve, so an overdriven bus
    /// (stacked grains plus ambience) cannot push the output past full scale.
    #[inline]
    pub fn process(&self, input: f32) -> f32 {
        (self.k * input.clamp(-1.0, 1.0)).tanh() / self.norm
    }
}

/// Sinusoidal amplitude modulation (tremolo)
///
/// Gain swings between 1.0 and `1.0 - depth`. Zero depth is a bypass.
struct Tremolo {
    phase: f32,
    phase_inc: f32,
    depth: f32,
}

impl Tremolo {
    fn new(sample_rate: u32, rate_hz: f32, depth: f32) -> Self {
        Self {
            phase: 0.0,
            phase_inc: 2.0 * std::f32::consts::PI * rate_hz / sample_rate as f32,
            depth: depth.clamp(0.0, 1.0),
        }
    }

    #[inline]
    fn next_gain(&mut self) -> f32 {
        if self.depth == 0.0 {
            return 1.0;
        }
        let gain = 1.0 - self.depth * (0.5 + 0.5 * self.phase.sin());
        self.phase += self.phase_inc;
        if self.phase > 2.0 * std::f32::consts::PI {
            self.phase -= 2.0 * std::f32::consts::PI;
        }
        gain
    }
}

/// The fixed tone-shaping cascade
pub struct ToneChain {
    sample_rate: u32,
    mode: ToneMode,
    hp: Biquad,
    presence: Biquad,
    tremolo: Tremolo,
    saturator: SoftSaturator,
    lp: Biquad,
}

impl ToneChain {
    /// Create a chain configured for the given mode
    pub fn new(sample_rate: u32, mode: ToneMode) -> Self {
        let preset = TonePreset::for_mode(mode);
        let mut chain = Self {
            sample_rate,
            mode,
            hp: Biquad::new(),
            presence: Biquad::new(),
            tremolo: Tremolo::new(sample_rate, preset.tremolo_hz, preset.tremolo_depth),
            saturator: SoftSaturator::new(preset.saturation),
            lp: Biquad::new(),
        };
        chain.apply_preset(&preset);
        chain
    }

    fn apply_preset(&mut self, preset: &TonePreset) {
        self.hp.set_highpass(self.sample_rate, preset.hp_hz, preset.hp_q);
        self.presence.set_peaking(
            self.sample_rate,
            preset.presence_hz,
            preset.presence_q,
            preset.presence_gain_db,
        );
        self.lp.set_lowpass(self.sample_rate, preset.lp_hz, preset.lp_q);
    }

    /// Current tone mode
    pub fn mode(&self) -> ToneMode {
        self.mode
    }

    /// Switch preset; filter state is cleared to avoid coefficient-jump blips
    pub fn set_mode(&mut self, mode: ToneMode) {
        if mode == self.mode {
            return;
        }
        self.mode = mode;
        let preset = TonePreset::for_mode(mode);
        self.tremolo = Tremolo::new(self.sample_rate, preset.tremolo_hz, preset.tremolo_depth);
        self.saturator = SoftSaturator::new(preset.saturation);
        self.apply_preset(&preset);
        self.reset();
    }

    /// Process a stereo buffer in-place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            let (l, r) = self.hp.process(sample.left, sample.right);
            let (l, r) = self.presence.process(l, r);
            let trem = self.tremolo.next_gain();
            let l = self.saturator.process(l * trem);
            let r = self.saturator.process(r * trem);
            let (l, r) = self.lp.process(l, r);
            sample.left = l;
            sample.right = r;
        }
    }

    /// Clear all filter state
    pub fn reset(&mut self) {
        self.hp.reset();
        self.presence.reset();
        self.lp.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    #[test]
    fn test_saturator_bounded_and_normalized() {
        for amount in [0.0, 0.55, 1.0] {
            let sat = SoftSaturator::new(amount);
            for i in -100..=100 {
                let x = i as f32 / 50.0; // -2.0 ..= 2.0
                let y = sat.process(x);
                assert!(y.abs() <= 1.0 + 1e-6, "amount {} x {} -> {}", amount, x, y);
            }
            // Full-scale input maps to exactly full-scale output
            assert!((sat.process(1.0) - 1.0).abs() < 1e-6);
            assert!((sat.process(-1.0) + 1.0).abs() < 1e-6);
            // Overdriven inputs pin at full scale instead of overshooting
            assert_eq!(sat.process(2.0), sat.process(1.0));
            assert_eq!(sat.process(-3.5), sat.process(-1.0));
        }
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut hp = Biquad::new();
        hp.set_highpass(44100, 90.0, 0.7);

        let mut last = 0.0;
        for _ in 0..4096 {
            (last, _) = hp.process(1.0, 1.0);
        }
        assert!(last.abs() < 0.01, "DC leaked through highpass: {}", last);
    }

    #[test]
    fn test_lowpass_attenuates_nyquist() {
        let mut lp = Biquad::new();
        lp.set_lowpass(44100, 5200.0, 0.7);

        // Alternating +1/-1 = Nyquist
        let mut acc = 0.0;
        let n = 1024;
        for i in 0..n {
            let x = if i % 2 == 0 { 1.0 } else { -1.0 };
            let (y, _) = lp.process(x, x);
            acc += y.abs();
        }
        assert!(acc / (n as f32) < 0.2, "Nyquist not attenuated");
    }

    #[test]
    fn test_peaking_boosts_center_band() {
        let mut peak = Biquad::new();
        let sr = 44100;
        peak.set_peaking(sr, 1700.0, 0.85, 6.0);

        // Feed a 1700 Hz sine and compare output RMS to input RMS
        let mut in_sq = 0.0;
        let mut out_sq = 0.0;
        let n = 8192;
        for i in 0..n {
            let t = i as f32 / sr as f32;
            let x = (2.0 * std::f32::consts::PI * 1700.0 * t).sin();
            let (y, _) = peak.process(x, x);
            if i > 1024 {
                in_sq += x * x;
                out_sq += y * y;
            }
        }
        assert!(out_sq > in_sq * 1.5, "Center band not boosted");
    }

    #[test]
    fn test_tape_mode_has_unity_tremolo() {
        let mut tone = ToneChain::new(44100, ToneMode::Tape);
        for _ in 0..64 {
            assert_eq!(tone.tremolo.next_gain(), 1.0);
        }
        tone.set_mode(ToneMode::Radio);
        let mut min = f32::MAX;
        for _ in 0..44100 {
            min = min.min(tone.tremolo.next_gain());
        }
        assert!(min < 0.8, "Radio tremolo should dip the gain");
    }

    #[test]
    fn test_chain_processes_in_place() {
        let mut tone = ToneChain::new(44100, ToneMode::Tape);
        let mut buffer = StereoBuffer::silence(256);
        for (i, s) in buffer.iter_mut().enumerate() {
            *s = StereoSample::mono(((i as f32) * 0.1).sin() * 0.5);
        }
        tone.process(&mut buffer);
        assert!(buffer.peak() > 0.0);
        // Saturation caps at 1.0; the trailing LP may ring slightly past it
        assert!(buffer.peak() <= 1.1);
    }
}
