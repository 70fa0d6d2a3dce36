//! Spectrum analyser for the bar visualizer
//!
//! Runs on the UI thread, fed by the engine's mono post-tone tap. Each
//! update takes the most recent 1024 samples, applies a Hann window and a
//! real FFT, smooths the magnitudes across frames, and maps them to a dB
//! range. The bar view samples the lower portion of the spectrum (speech
//! and presence bands, where the tape audio lives) and scales bar heights
//! with tape speed so the display breathes with the gesture.

use num_complex::Complex32;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// FFT window length in samples
pub const FFT_SIZE: usize = 1024;

/// Usable frequency bins
pub const BIN_COUNT: usize = FFT_SIZE / 2;

/// Number of bars in the visualizer
pub const BAR_COUNT: usize = 40;

/// Per-frame magnitude smoothing (fraction of the previous frame kept)
const SMOOTHING: f32 = 0.86;

/// dB mapped to 0.0
const DB_FLOOR: f32 = -100.0;

/// dB mapped to 1.0
const DB_CEIL: f32 = -30.0;

/// First bar reads from this fraction of the spectrum
const BAND_START: f32 = 0.04;

/// Last bar reads up to this fraction of the spectrum
const BAND_END: f32 = 0.35;

/// Mono FFT analyser with frame-to-frame smoothing
pub struct SpectrumAnalyser {
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    /// Rolling buffer of the latest `FFT_SIZE` input samples
    history: Vec<f32>,
    /// Windowed input scratch
    input: Vec<f32>,
    /// FFT output scratch
    output: Vec<Complex32>,
    /// Smoothed magnitude per bin
    smoothed: Vec<f32>,
    /// Normalized [0, 1] dB level per bin
    levels: Vec<f32>,
}

impl SpectrumAnalyser {
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        let window = (0..FFT_SIZE)
            .map(|n| {
                let phase = 2.0 * std::f32::consts::PI * n as f32 / (FFT_SIZE - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect();

        Self {
            fft,
            window,
            history: vec![0.0; FFT_SIZE],
            input: vec![0.0; FFT_SIZE],
            output: vec![Complex32::default(); FFT_SIZE / 2 + 1],
            smoothed: vec![0.0; BIN_COUNT],
            levels: vec![0.0; BIN_COUNT],
        }
    }

    /// Drain the engine's mono tap and recompute the spectrum
    pub fn update_from(&mut self, tap: &mut rtrb::Consumer<f32>) {
        let mut got_any = false;
        while let Ok(sample) = tap.pop() {
            self.history.rotate_left(1);
            self.history[FFT_SIZE - 1] = sample;
            got_any = true;
        }
        if got_any {
            self.analyse();
        }
    }

    /// Feed samples directly (offline rendering, tests)
    pub fn feed(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.history.rotate_left(1);
            self.history[FFT_SIZE - 1] = sample;
        }
        self.analyse();
    }

    fn analyse(&mut self) {
        for (dst, (&s, &w)) in self
            .input
            .iter_mut()
            .zip(self.history.iter().zip(self.window.iter()))
        {
            *dst = s * w;
        }

        // realfft rejects buffers of the wrong length, not this one
        if self.fft.process(&mut self.input, &mut self.output).is_err() {
            return;
        }

        for bin in 0..BIN_COUNT {
            let magnitude = self.output[bin].norm() / FFT_SIZE as f32;
            let smoothed = SMOOTHING * self.smoothed[bin] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[bin] = smoothed;

            let db = 20.0 * smoothed.max(1e-10).log10();
            self.levels[bin] = ((db - DB_FLOOR) / (DB_CEIL - DB_FLOOR)).clamp(0.0, 1.0);
        }
    }

    /// Normalized [0, 1] level of one bin; out-of-range bins read the last
    pub fn level(&self, bin: usize) -> f32 {
        self.levels[bin.min(BIN_COUNT - 1)]
    }

    /// Bin index carrying the most energy (for tests and debug)
    pub fn peak_bin(&self) -> usize {
        self.levels
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Fill the visualizer bars
    ///
    /// `intensity` is the tape speed normalized to [0, 1]; faster tape
    /// scales the bars hotter. Bars sample the 4%-35% band of the spectrum.
    pub fn fill_bars(&self, bars: &mut [f32], intensity: f32) {
        let start = (BIN_COUNT as f32 * BAND_START) as usize;
        let end = (BIN_COUNT as f32 * BAND_END) as usize;
        let span = (end - start).max(1);
        let count = bars.len();

        let gain = 0.45 + 0.9 * intensity.clamp(0.0, 1.0);
        for (i, bar) in bars.iter_mut().enumerate() {
            let idx = start + (i as f32 / count as f32 * span as f32) as usize;
            *bar = (self.levels[idx.min(BIN_COUNT - 1)] * gain).clamp(0.0, 1.0);
        }
    }
}

impl Default for SpectrumAnalyser {
    fn default() -> Self {
        Self::new()
    }
}
