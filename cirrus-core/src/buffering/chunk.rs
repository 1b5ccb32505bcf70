//! Typed audio buffer handed from chunk extraction to the worker tasks.

/// A contiguous block of mono PCM samples at a known sample rate.
///
/// Independently owned — never an alias into the ring buffer, whose storage
/// is overwritten by future capture callbacks.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Mono f32 samples in [-1.0, 1.0].
    pub samples: Vec<f32>,
    /// Sample rate in Hz (e.g. 16000, 44100, 48000).
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Returns the duration of this chunk in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Returns true if the chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_samples_over_rate() {
        let chunk = AudioChunk::new(vec![0.0; 3200], 16_000);
        assert!((chunk.duration_secs() - 0.2).abs() < 1e-9);
        assert!(!chunk.is_empty());
    }
}
