//! Clip loading - decode an audio file into an [`AudioClip`]
//!
//! Decoding runs on a loader/UI thread, never on the audio thread. The
//! decoded PCM is downmixed to stereo and wrapped in an `AudioClip` (which
//! also builds the time-reversed copy). A decode failure is fatal to
//! playback: the caller surfaces it as "cannot start" and does not retry.
//!
//! The clip's native sample rate is kept as-is; the engine folds the
//! clip-rate/device-rate ratio into each grain's playback rate, so no
//! resampling pass is needed at load time.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::clip::AudioClip;
use crate::types::{StereoBuffer, StereoSample};

/// Errors that can occur while loading a clip
#[derive(Error, Debug)]
pub enum ClipLoadError {
    /// File not found or couldn't be opened
    #[error("Failed to open clip: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes are not a valid/supported audio container
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The container has no decodable audio track
    #[error("No audio track found in clip")]
    NoAudioTrack,

    /// The file decoded to zero samples
    #[error("Clip decoded to zero samples")]
    EmptyClip,
}

/// Result type for clip loading
pub type ClipLoadResult<T> = Result<T, ClipLoadError>;

/// Load and decode an audio file into an [`AudioClip`]
///
/// Accepts anything symphonia can probe (wav/mp3/flac with the enabled
/// features). Multi-channel sources are downmixed to stereo: the first two
/// channels are taken as left/right, mono is duplicated to both.
pub fn load_clip(path: &Path) -> ClipLoadResult<AudioClip> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Hint the probe with the file extension
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| ClipLoadError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or(ClipLoadError::NoAudioTrack)?;

    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| ClipLoadError::UnsupportedFormat("Unknown sample rate".to_string()))?;

    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| ClipLoadError::UnsupportedFormat(e.to_string()))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    // Decode all packets
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(e) => {
                log::warn!("Error decoding packet: {}", e);
                continue;
            }
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            let duration = decoded.capacity() as u64;
            sample_buf = Some(SampleBuffer::new(duration, spec));
        }

        if let Some(ref mut buf) = sample_buf {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    let buffer = downmix_to_stereo(&interleaved, channels);
    if buffer.is_empty() {
        return Err(ClipLoadError::EmptyClip);
    }

    log::info!(
        "Loaded clip {:?}: {} frames @ {}Hz ({:.2}s, {} source channels)",
        path,
        buffer.len(),
        sample_rate,
        buffer.len() as f64 / sample_rate as f64,
        channels
    );

    Ok(AudioClip::new(buffer, sample_rate))
}

/// Downmix interleaved multi-channel samples to a stereo buffer
///
/// Mono is duplicated to both channels; for more than two channels the first
/// two are taken as the stereo pair.
fn downmix_to_stereo(interleaved: &[f32], channels: usize) -> StereoBuffer {
    match channels {
        0 => StereoBuffer::default(),
        1 => {
            let mut buffer = StereoBuffer::with_capacity(interleaved.len());
            for &s in interleaved {
                buffer.push(StereoSample::mono(s));
            }
            buffer
        }
        2 => StereoBuffer::from_interleaved(
            &interleaved[..interleaved.len() - interleaved.len() % 2],
        ),
        n => {
            let mut buffer = StereoBuffer::with_capacity(interleaved.len() / n);
            for frame in interleaved.chunks_exact(n) {
                buffer.push(StereoSample::new(frame[0], frame[1]));
            }
            buffer
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_mono_duplicates() {
        let buffer = downmix_to_stereo(&[0.1, 0.2, 0.3], 1);
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer[1].left, 0.2);
        assert_eq!(buffer[1].right, 0.2);
    }

    #[test]
    fn test_downmix_stereo_passthrough() {
        let buffer = downmix_to_stereo(&[0.1, 0.2, 0.3, 0.4], 2);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[0].left, 0.1);
        assert_eq!(buffer[0].right, 0.2);
    }

    #[test]
    fn test_downmix_multichannel_takes_front_pair() {
        // 4-channel frames: [L, R, Ls, Rs]
        let buffer = downmix_to_stereo(&[0.1, 0.2, 0.9, 0.9, 0.3, 0.4, 0.9, 0.9], 4);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[1].left, 0.3);
        assert_eq!(buffer[1].right, 0.4);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_clip(Path::new("/nonexistent/audio.mp3")).unwrap_err();
        assert!(matches!(err, ClipLoadError::Io(_)));
    }
}
