//! The tape engine: commands in, enveloped grains plus ambience out
//!
//! One `TapeEngine` lives inside the audio callback and owns everything that
//! touches samples: motion physics, the grain scheduler and voice pool, the
//! ambience generator and the tone chain. The UI side holds an
//! [`EngineHandle`] with the command producer and a snapshot of transport
//! state published through relaxed atomics.
//!
//! Motion runs on a fixed 60 Hz tick derived from the sample clock, not from
//! wall time, so the physics is deterministic for any callback size and an
//! offline render sounds identical to the live instrument. Each `process`
//! call splits the output block at tick boundaries: at every boundary the
//! playhead advances and the grain lookahead window is topped up, then the
//! segment is rendered and the whole block goes through the tone chain.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use basedrop::Shared;

use crate::clip::AudioClip;
use crate::config::{ToneMode, TransportConfig};
use crate::engine::ambient::AmbientLayer;
use crate::engine::command::{command_channel, EngineCommand};
use crate::engine::gc::gc_handle;
use crate::engine::grains::{GrainScheduler, GrainVoicePool};
use crate::engine::motion::{MotionDirection, MotionIntegrator};
use crate::engine::tone::ToneChain;
use crate::types::StereoBuffer;

/// Motion tick rate in Hz
pub const TICK_HZ: f64 = 60.0;

/// Capacity of the mono analyser tap, in samples
///
/// Roomy enough for the UI to fall a few frames behind without the tap
/// wrapping mid-window.
const SPECTRUM_TAP_CAPACITY: usize = 8192;

/// Transport state published from the audio thread
///
/// Floats travel as raw bits in `AtomicU64`s with relaxed ordering; the UI
/// only paints these, so cross-field consistency doesn't matter.
pub struct TransportAtomics {
    playhead_bits: AtomicU64,
    speed_bits: AtomicU64,
    duration_bits: AtomicU64,
    loaded: AtomicBool,
}

impl TransportAtomics {
    fn new() -> Self {
        Self {
            playhead_bits: AtomicU64::new(0),
            speed_bits: AtomicU64::new(0),
            duration_bits: AtomicU64::new(0),
            loaded: AtomicBool::new(false),
        }
    }

    fn set_playhead(&self, v: f64) {
        self.playhead_bits.store(v.to_bits(), Ordering::Relaxed);
    }

    fn set_speed(&self, v: f64) {
        self.speed_bits.store(v.to_bits(), Ordering::Relaxed);
    }

    fn set_duration(&self, v: f64) {
        self.duration_bits.store(v.to_bits(), Ordering::Relaxed);
    }

    fn set_loaded(&self, v: bool) {
        self.loaded.store(v, Ordering::Relaxed);
    }

    /// Playhead position in seconds
    pub fn playhead(&self) -> f64 {
        f64::from_bits(self.playhead_bits.load(Ordering::Relaxed))
    }

    /// Smoothed tape speed in seconds of tape per tick
    pub fn speed(&self) -> f64 {
        f64::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    /// Tape length in seconds (0 until a clip loads)
    pub fn duration(&self) -> f64 {
        f64::from_bits(self.duration_bits.load(Ordering::Relaxed))
    }

    /// Whether a clip is loaded
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }
}

/// UI-side handle: sends commands, reads published transport state
pub struct EngineHandle {
    commands: rtrb::Producer<EngineCommand>,
    atomics: Arc<TransportAtomics>,
}

impl EngineHandle {
    fn send(&mut self, cmd: EngineCommand) {
        if self.commands.push(cmd).is_err() {
            log::warn!("Engine command queue full, dropping command");
        }
    }

    /// Put a new tape on the machine
    pub fn load_clip(&mut self, clip: AudioClip) {
        let shared = Shared::new(&gc_handle(), clip);
        self.send(EngineCommand::LoadClip(shared));
    }

    /// Feed a knob rotation delta in degrees
    pub fn knob_delta(&mut self, degrees: f64) {
        self.send(EngineCommand::KnobDelta(degrees));
    }

    /// Jump the playhead to a position in seconds
    pub fn seek(&mut self, position: f64) {
        self.send(EngineCommand::Seek(position));
    }

    /// Kill all motion; in-flight grains finish their envelopes
    pub fn stop(&mut self) {
        self.send(EngineCommand::Stop);
    }

    /// Switch the tone chain preset
    pub fn set_tone_mode(&mut self, mode: ToneMode) {
        self.send(EngineCommand::SetToneMode(mode));
    }

    /// Published transport state
    pub fn transport(&self) -> &TransportAtomics {
        &self.atomics
    }
}

/// The audio-thread half of the instrument
pub struct TapeEngine {
    config: TransportConfig,
    sample_rate: u32,
    clip: Option<Shared<AudioClip>>,

    motion: MotionIntegrator,
    scheduler: GrainScheduler,
    voices: GrainVoicePool,
    ambient: AmbientLayer,
    tone: ToneChain,

    commands: rtrb::Consumer<EngineCommand>,
    atomics: Arc<TransportAtomics>,
    spectrum_tx: rtrb::Producer<f32>,

    /// Samples rendered since the engine started
    clock_samples: u64,
    samples_per_tick: f64,
    samples_to_next_tick: usize,
    tick_remainder: f64,
}

impl TapeEngine {
    /// Build an engine and its UI-side handles
    ///
    /// Returns the handle, the engine (move it into the audio callback) and
    /// the mono analyser tap consumer.
    pub fn new(
        config: TransportConfig,
        sample_rate: u32,
    ) -> (EngineHandle, TapeEngine, rtrb::Consumer<f32>) {
        let (cmd_tx, cmd_rx) = command_channel();
        let (spectrum_tx, spectrum_rx) = rtrb::RingBuffer::new(SPECTRUM_TAP_CAPACITY);
        let atomics = Arc::new(TransportAtomics::new());

        let engine = TapeEngine {
            config,
            sample_rate,
            clip: None,
            motion: MotionIntegrator::new(config, 0.0),
            scheduler: GrainScheduler::new(config),
            voices: GrainVoicePool::new(&config, sample_rate),
            ambient: AmbientLayer::new(&config, sample_rate),
            tone: ToneChain::new(sample_rate, config.tone_mode),
            commands: cmd_rx,
            atomics: atomics.clone(),
            spectrum_tx,
            clock_samples: 0,
            samples_per_tick: sample_rate as f64 / TICK_HZ,
            samples_to_next_tick: 0,
            tick_remainder: 0.0,
        };

        let handle = EngineHandle {
            commands: cmd_tx,
            atomics,
        };

        (handle, engine, spectrum_rx)
    }

    /// Render one block of output
    pub fn process(&mut self, out: &mut StereoBuffer) {
        self.drain_commands();
        out.fill_silence();

        let len = out.len();
        let mut offset = 0;
        while offset < len {
            if self.samples_to_next_tick == 0 {
                self.tick();
                let exact = self.samples_per_tick + self.tick_remainder;
                self.samples_to_next_tick = exact as usize;
                self.tick_remainder = exact - self.samples_to_next_tick as f64;
            }

            let seg = (len - offset).min(self.samples_to_next_tick);
            let block = &mut out.as_mut_slice()[offset..offset + seg];

            if let Some(clip) = self.clip.as_ref() {
                self.voices.render(clip, self.clock_samples, block);
            }
            self.ambient.render(block);

            self.clock_samples += seg as u64;
            self.samples_to_next_tick -= seg;
            offset += seg;
        }

        self.tone.process(out);

        // Mono tap for the analyser; a lagging UI just loses samples
        for s in out.iter() {
            if self.spectrum_tx.push(s.mid()).is_err() {
                break;
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                EngineCommand::LoadClip(clip) => {
                    let duration = clip.duration_seconds();
                    self.motion.set_duration(duration);
                    self.scheduler.reset();
                    self.voices.clear();
                    self.atomics.set_duration(duration);
                    self.atomics.set_loaded(true);
                    // Previous clip (if any) is freed on the GC thread
                    self.clip = Some(clip);
                }
                EngineCommand::KnobDelta(degrees) => self.motion.apply_knob_delta(degrees),
                EngineCommand::Seek(position) => {
                    self.motion.seek(position);
                    self.scheduler.reset();
                }
                EngineCommand::Stop => {
                    self.motion.stop();
                    self.scheduler.reset();
                }
                EngineCommand::SetToneMode(mode) => self.tone.set_mode(mode),
            }
        }
    }

    /// One 60 Hz motion tick
    fn tick(&mut self) {
        self.motion.tick();
        let speed = self.motion.speed();
        let playhead = self.motion.playhead();

        self.ambient.update(speed);

        if let Some(clip) = self.clip.as_ref() {
            let now = self.clock_samples as f64 / self.sample_rate as f64;
            let voices = &mut self.voices;
            self.scheduler
                .schedule(now, speed, playhead, clip, self.sample_rate, |grain| {
                    voices.spawn(grain, clip)
                });
        }

        self.atomics.set_playhead(playhead);
        self.atomics.set_speed(speed);
    }

    /// Direction of tape travel, deadzone-gated
    pub fn direction(&self) -> MotionDirection {
        self.motion.direction()
    }

    /// Engine sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Transport configuration in effect
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StereoBuffer, StereoSample};

    const SR: u32 = 44100;
    const BLOCK: usize = 512;

    fn sine_clip(seconds: f64) -> AudioClip {
        let frames = (seconds * SR as f64) as usize;
        let mut buffer = StereoBuffer::with_capacity(frames);
        for i in 0..frames {
            let t = i as f32 / SR as f32;
            buffer.push(StereoSample::mono((2.0 * std::f32::consts::PI * 440.0 * t).sin() * 0.5));
        }
        AudioClip::new(buffer, SR)
    }

    fn run_blocks(
        handle: &mut EngineHandle,
        engine: &mut TapeEngine,
        blocks: usize,
        wind: f64,
    ) -> f32 {
        let mut out = StereoBuffer::silence(BLOCK);
        let mut peak = 0.0f32;
        for _ in 0..blocks {
            if wind != 0.0 {
                handle.knob_delta(wind);
            }
            engine.process(&mut out);
            peak = peak.max(out.peak());
        }
        peak
    }

    #[test]
    fn test_winding_produces_tape_audio() {
        let (mut handle, mut engine, _tap) = TapeEngine::new(TransportConfig::default(), SR);
        handle.load_clip(sine_clip(10.0));
        handle.seek(5.0);

        // Idle: just the hiss bed, very quiet
        let idle_peak = run_blocks(&mut handle, &mut engine, 30, 0.0);
        assert!(idle_peak > 0.0);
        assert!(idle_peak < 0.02, "idle should be hiss only, got {}", idle_peak);

        // Winding forward: grains come through well above the hiss
        let wound_peak = run_blocks(&mut handle, &mut engine, 60, 20.0);
        assert!(wound_peak > 0.05, "wound peak {}", wound_peak);
        // Saturation bounds the bus; the output LP can ring a hair past it
        assert!(wound_peak <= 1.05, "output unbounded: {}", wound_peak);
    }

    #[test]
    fn test_transport_atomics_follow_motion() {
        let (mut handle, mut engine, _tap) = TapeEngine::new(TransportConfig::default(), SR);
        assert!(!handle.transport().is_loaded());

        handle.load_clip(sine_clip(10.0));
        run_blocks(&mut handle, &mut engine, 1, 0.0);
        assert!(handle.transport().is_loaded());
        assert_eq!(handle.transport().duration(), 10.0);

        run_blocks(&mut handle, &mut engine, 30, 15.0);
        assert!(handle.transport().speed() > 0.0);
        assert!(handle.transport().playhead() > 0.0);
        assert!(handle.transport().playhead() <= 10.0);
    }

    #[test]
    fn test_stop_freezes_playhead() {
        let (mut handle, mut engine, _tap) = TapeEngine::new(TransportConfig::default(), SR);
        handle.load_clip(sine_clip(10.0));
        run_blocks(&mut handle, &mut engine, 30, 15.0);
        assert!(handle.transport().speed() > 0.0);

        handle.stop();
        // Two blocks always span at least one 60Hz tick
        run_blocks(&mut handle, &mut engine, 2, 0.0);
        let frozen = handle.transport().playhead();
        assert_eq!(handle.transport().speed(), 0.0);

        run_blocks(&mut handle, &mut engine, 30, 0.0);
        assert_eq!(handle.transport().playhead(), frozen);
    }

    #[test]
    fn test_reverse_wind_moves_playhead_backwards() {
        let (mut handle, mut engine, _tap) = TapeEngine::new(TransportConfig::default(), SR);
        handle.load_clip(sine_clip(10.0));
        handle.seek(5.0);
        run_blocks(&mut handle, &mut engine, 30, -15.0);
        assert!(handle.transport().speed() < 0.0);
        assert!(handle.transport().playhead() < 5.0);
        assert!(handle.transport().playhead() >= 0.0);
    }

    #[test]
    fn test_spectrum_tap_carries_mono_audio() {
        let (mut handle, mut engine, mut tap) = TapeEngine::new(TransportConfig::default(), SR);
        handle.load_clip(sine_clip(10.0));
        run_blocks(&mut handle, &mut engine, 4, 15.0);

        let mut received = 0;
        while tap.pop().is_ok() {
            received += 1;
        }
        assert!(received > 0);
        assert!(received <= 4 * BLOCK);
    }

    #[test]
    fn test_engine_without_clip_stays_ambient() {
        let (mut handle, mut engine, _tap) = TapeEngine::new(TransportConfig::default(), SR);
        let peak = run_blocks(&mut handle, &mut engine, 30, 20.0);
        // Knob input with no tape: no grains, just the noise bed
        assert!(peak > 0.0);
        assert!(peak < 0.05, "got {}", peak);
        assert!(!handle.transport().is_loaded());
    }
}
