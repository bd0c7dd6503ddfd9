use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::info;

use crate::error::SessionError;

/// Sample rate the inference engine expects.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decodes an audio file into the normalized buffer the engine consumes:
/// mono, 16 kHz, f32 amplitudes.
pub trait AudioCodec: Send + Sync {
    fn decode(&self, path: &Path) -> Result<Vec<f32>, SessionError>;
}

/// Symphonia-backed codec. Handles WAV along with the compressed formats a
/// host may hand us (M4A, MP3, FLAC, OGG).
pub struct SymphoniaCodec;

impl AudioCodec for SymphoniaCodec {
    fn decode(&self, path: &Path) -> Result<Vec<f32>, SessionError> {
        let file = File::open(path)
            .map_err(|e| SessionError::Decode(format!("{}: {}", path.display(), e)))?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SessionError::Decode(format!("unsupported format: {e}")))?;
        let mut format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| SessionError::Decode("no audio track".to_string()))?;
        let track_id = track.id;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| SessionError::Decode("missing sample rate".to_string()))?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| SessionError::Decode(format!("no decoder for track: {e}")))?;

        let mut interleaved: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(SessionError::Decode(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Skip malformed packets; the rest of the file may be fine.
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(SessionError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }

        if interleaved.is_empty() {
            return Err(SessionError::Decode("no audio frames decoded".to_string()));
        }

        let mono = downmix(&interleaved, channels);
        let samples = resample(mono, sample_rate)?;

        info!(
            "Decoded {}: {:.2}s at {} Hz, {} ch -> {} samples",
            path.display(),
            samples.len() as f64 / TARGET_SAMPLE_RATE as f64,
            sample_rate,
            channels,
            samples.len()
        );

        Ok(samples)
    }
}

/// Average all channels into one.
fn downmix(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }

    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Bring `samples` down to `TARGET_SAMPLE_RATE` by nearest-sample decimation.
/// Good enough for speech input; anything fancier belongs in the host's
/// audio chain. Rates below the target are rejected rather than upsampled.
fn resample(samples: Vec<f32>, source_rate: u32) -> Result<Vec<f32>, SessionError> {
    if source_rate == TARGET_SAMPLE_RATE {
        return Ok(samples);
    }
    if source_rate < TARGET_SAMPLE_RATE {
        return Err(SessionError::Decode(format!(
            "sample rate {source_rate} Hz is below the {TARGET_SAMPLE_RATE} Hz floor"
        )));
    }

    let ratio = source_rate as f64 / TARGET_SAMPLE_RATE as f64;
    let out_len = (samples.len() as f64 / ratio) as usize;
    let out = (0..out_len)
        .map(|i| samples[(i as f64 * ratio) as usize])
        .collect();

    Ok(out)
}
