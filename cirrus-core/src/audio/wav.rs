//! WAV container encoding via `hound`.
//!
//! Pure serialization, no shared state: f32 PCM in, 16-bit PCM RIFF bytes
//! out. Used by the utterance archive and useful for feeding capture dumps
//! to offline tools.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::error::{CirrusError, Result};

/// Convert one f32 sample in [-1.0, 1.0] to 16-bit PCM.
fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn spec(sample_rate: u32, channels: u16) -> WavSpec {
    WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode interleaved f32 samples as a complete in-memory WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec(sample_rate, channels))
            .map_err(|e| CirrusError::WavEncode(e.to_string()))?;
        for &s in samples {
            writer
                .write_sample(to_i16(s))
                .map_err(|e| CirrusError::WavEncode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| CirrusError::WavEncode(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Encode and write straight to `path`.
pub fn write_wav_file(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<()> {
    let mut writer = WavWriter::create(path, spec(sample_rate, channels))
        .map_err(|e| CirrusError::WavEncode(e.to_string()))?;
    for &s in samples {
        writer
            .write_sample(to_i16(s))
            .map_err(|e| CirrusError::WavEncode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| CirrusError::WavEncode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_riff_wave_header() {
        let bytes = encode_wav(&[0.0; 160], 16_000, 1).expect("encode");
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // 44-byte canonical header + 2 bytes per 16-bit sample.
        assert_eq!(bytes.len(), 44 + 160 * 2);
    }

    #[test]
    fn round_trips_through_hound_reader() {
        let samples: Vec<f32> = (0..320).map(|i| ((i as f32) * 0.01).sin() * 0.5).collect();
        let bytes = encode_wav(&samples, 16_000, 1).expect("encode");

        let reader = hound::WavReader::new(Cursor::new(bytes)).expect("parse");
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 16_000);
        assert_eq!(spec.bits_per_sample, 16);

        let decoded: Vec<i16> = reader.into_samples().map(|s| s.expect("sample")).collect();
        assert_eq!(decoded.len(), samples.len());
        for (d, s) in decoded.iter().zip(&samples) {
            let back = *d as f32 / i16::MAX as f32;
            assert!((back - s).abs() < 1e-3, "decoded {back} vs {s}");
        }
    }

    #[test]
    fn clipping_input_is_clamped_not_wrapped() {
        let bytes = encode_wav(&[2.0, -2.0], 8_000, 1).expect("encode");
        let reader = hound::WavReader::new(Cursor::new(bytes)).expect("parse");
        let decoded: Vec<i16> = reader.into_samples().map(|s| s.expect("sample")).collect();
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX]);
    }
}
