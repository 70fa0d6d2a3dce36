//! Offline gesture renderer
//!
//! Loads a clip, drives the tape engine with a scripted knob gesture (wind
//! forward, coast, rewind, coast) and writes the result to a WAV file. The
//! engine's motion tick is derived from the sample clock, so this renders
//! exactly what the live instrument would play for the same gesture.
//!
//! ## Usage
//!
//! ```text
//! spool-render <input audio> <output.wav> [--seconds N] [--mode tape|radio]
//! ```

use std::path::Path;

use anyhow::{bail, Context, Result};

use spool_core::config::{ToneMode, TransportConfig};
use spool_core::engine::{TapeEngine, TICK_HZ};
use spool_core::loader::load_clip;
use spool_core::types::StereoBuffer;

const BLOCK_FRAMES: usize = 512;

/// Knob delta (degrees) to feed per engine block at a given gesture time
fn gesture_delta(t: f64) -> f64 {
    match t {
        t if t < 3.0 => 14.0,  // wind forward
        t if t < 4.5 => 0.0,   // coast down
        t if t < 7.0 => -18.0, // rewind (with squeal and a click)
        _ => 0.0,              // coast to rest
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("Usage: spool-render <input audio> <output.wav> [--seconds N] [--mode tape|radio]");
    }

    let input = Path::new(&args[1]);
    let output = Path::new(&args[2]);

    let mut seconds = 10.0f64;
    let mut mode = ToneMode::Tape;
    let mut i = 3;
    while i < args.len() {
        match args[i].as_str() {
            "--seconds" => {
                i += 1;
                seconds = args
                    .get(i)
                    .context("--seconds needs a value")?
                    .parse()
                    .context("--seconds must be a number")?;
            }
            "--mode" => {
                i += 1;
                mode = match args.get(i).context("--mode needs a value")?.as_str() {
                    "tape" => ToneMode::Tape,
                    "radio" => ToneMode::Radio,
                    other => bail!("Unknown tone mode: {}", other),
                };
            }
            other => bail!("Unknown argument: {}", other),
        }
        i += 1;
    }

    let clip = load_clip(input).with_context(|| format!("Failed to load {:?}", input))?;
    let sample_rate = clip.sample_rate();
    log::info!(
        "Rendering {:.1}s of gesture at {}Hz in {} mode",
        seconds,
        sample_rate,
        mode.display_name()
    );

    let config = TransportConfig {
        tone_mode: mode,
        ..Default::default()
    };
    let (mut handle, mut engine, _tap) = TapeEngine::new(config, sample_rate);
    handle.load_clip(clip);

    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(output, spec)
        .with_context(|| format!("Failed to create {:?}", output))?;

    let total_frames = (seconds * sample_rate as f64) as usize;
    let mut block = StereoBuffer::silence(BLOCK_FRAMES);
    let mut rendered = 0usize;
    // One knob event per tick keeps the gesture cadence independent of block size
    let deltas_per_block = BLOCK_FRAMES as f64 * TICK_HZ / sample_rate as f64;

    while rendered < total_frames {
        let t = rendered as f64 / sample_rate as f64;
        let delta = gesture_delta(t);
        if delta != 0.0 {
            handle.knob_delta(delta * deltas_per_block);
        }

        engine.process(&mut block);
        for sample in block.iter() {
            writer.write_sample((sample.left.clamp(-1.0, 1.0) * 32767.0) as i16)?;
            writer.write_sample((sample.right.clamp(-1.0, 1.0) * 32767.0) as i16)?;
        }
        rendered += BLOCK_FRAMES;
    }

    writer.finalize().context("Failed to finalize WAV")?;
    log::info!(
        "Wrote {:?}: playhead ended at {:.2}s",
        output,
        handle.transport().playhead()
    );

    Ok(())
}
