//! Sample conversion for the provider wire format.

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::error::TranscriptionResult;

/// Convert a float sample in `[-1.0, 1.0]` to signed 16-bit PCM.
///
/// Out-of-range input is clamped. Negative values scale by 32768 and
/// positive values by 32767 so both extremes map exactly.
#[allow(clippy::cast_possible_truncation)]
pub fn f32_to_i16(sample: f32) -> i16 {
    let clamped = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };
    let scaled = if clamped < 0.0 {
        clamped * 32_768.0
    } else {
        clamped * 32_767.0
    };
    scaled as i16
}

pub fn i16_to_f32(sample: i16) -> f32 {
    if sample < 0 {
        f32::from(sample) / 32_768.0
    } else {
        f32::from(sample) / 32_767.0
    }
}

/// Little-endian 16-bit PCM bytes for a buffer of float samples.
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| f32_to_i16(sample).to_le_bytes())
        .collect()
}

/// Base64 of the little-endian PCM16 encoding, as sent in audio frames.
pub fn encode_pcm16_base64(samples: &[f32]) -> String {
    STANDARD.encode(encode_pcm16_le(samples))
}

/// Encode mono float samples as a 16-bit WAV byte buffer.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> TranscriptionResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(f32_to_i16(sample))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
