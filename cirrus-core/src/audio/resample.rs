//! Audio sample-rate conversion using a rubato `FastFixedIn` resampler.
//!
//! Capture runs at whatever rate the device reports (commonly 44.1 or
//! 48 kHz); inference wants 16 kHz mono. Conversion happens on a worker
//! thread after extraction — one converter per utterance, never on the
//! capture callback.
//!
//! When the rates already match, `RateConverter` is a passthrough and no
//! rubato session is created at all.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use crate::error::{CirrusError, Result};

/// Input frame count per rubato call.
const CHUNK: usize = 1024;

/// Converts f32 mono audio from one fixed sample rate to another.
pub struct RateConverter {
    /// `None` when input rate == output rate (passthrough mode).
    resampler: Option<FastFixedIn<f32>>,
    /// Holds partial input between `process` calls.
    input_buf: Vec<f32>,
    /// Pre-allocated rubato output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// Returns `CirrusError::AudioDevice` if rubato fails to initialise.
    pub fn new(input_rate: u32, output_rate: u32) -> Result<Self> {
        if input_rate == output_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                output_buf: Vec::new(),
            });
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio — no dynamic adjustment
            PolynomialDegree::Cubic,
            CHUNK,
            1, // mono
        )
        .map_err(|e| CirrusError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::new(),
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Feed samples, returning whatever full chunks produce (may be empty).
    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        let Some(ref mut resampler) = self.resampler else {
            return Ok(samples.to_vec());
        };

        self.input_buf.extend_from_slice(samples);

        let mut result = Vec::new();
        while self.input_buf.len() >= CHUNK {
            let input_slice = &self.input_buf[..CHUNK];
            let (_consumed, produced) = resampler
                .process_into_buffer(&[input_slice], &mut self.output_buf, None)
                .map_err(|e| CirrusError::AudioDevice(format!("resampler process: {e}")))?;
            result.extend_from_slice(&self.output_buf[0][..produced]);
            self.input_buf.drain(..CHUNK);
        }
        Ok(result)
    }

    /// Drain the internal remainder by zero-padding it to a full chunk.
    /// Call once at end of an utterance; the pad becomes trailing silence.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        let Some(ref mut resampler) = self.resampler else {
            return Ok(Vec::new());
        };
        if self.input_buf.is_empty() {
            return Ok(Vec::new());
        }

        self.input_buf.resize(CHUNK, 0.0);
        let input_slice = &self.input_buf[..CHUNK];
        let (_consumed, produced) = resampler
            .process_into_buffer(&[input_slice], &mut self.output_buf, None)
            .map_err(|e| CirrusError::AudioDevice(format!("resampler flush: {e}")))?;
        self.input_buf.clear();
        Ok(self.output_buf[0][..produced].to_vec())
    }

    /// Returns `true` when no rate conversion occurs.
    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}

/// Convert one complete utterance from `input_rate` to `output_rate`.
pub fn resample_utterance(samples: &[f32], input_rate: u32, output_rate: u32) -> Result<Vec<f32>> {
    let mut converter = RateConverter::new(input_rate, output_rate)?;
    if converter.is_passthrough() {
        return Ok(samples.to_vec());
    }
    let mut out = converter.process(samples)?;
    out.extend(converter.flush()?);
    Ok(out)
}
