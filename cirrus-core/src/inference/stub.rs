//! `StubTranscriber` — placeholder backend that echoes metadata without real
//! inference. Lets the full capture → queue → persistence path be exercised
//! end-to-end before a model backend is wired in.

use crate::buffering::chunk::AudioChunk;
use crate::error::{CirrusError, Result};
use crate::inference::{CancellationToken, Transcriber};
use tracing::debug;

/// Echo-style stub model. Emits `"[stub: <N> samples @ <SR> Hz]"` per
/// utterance and honours cancellation.
pub struct StubTranscriber {
    utterance_count: u32,
}

impl StubTranscriber {
    pub fn new() -> Self {
        Self { utterance_count: 0 }
    }
}

impl Default for StubTranscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcriber for StubTranscriber {
    fn warm_up(&mut self) -> Result<()> {
        debug!("StubTranscriber::warm_up — no-op");
        Ok(())
    }

    fn transcribe(&mut self, chunk: &AudioChunk, cancel: &CancellationToken) -> Result<String> {
        if cancel.is_cancelled() {
            return Err(CirrusError::Cancelled);
        }
        if chunk.samples.len() < 160 {
            return Ok(String::new());
        }

        self.utterance_count += 1;
        Ok(format!(
            "[stub: {} samples @ {} Hz]",
            chunk.samples.len(),
            chunk.sample_rate
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_sample_metadata() {
        let mut model = StubTranscriber::new();
        let chunk = AudioChunk::new(vec![0.1; 3200], 16_000);
        let text = model
            .transcribe(&chunk, &CancellationToken::new())
            .expect("transcribe");
        assert_eq!(text, "[stub: 3200 samples @ 16000 Hz]");
    }

    #[test]
    fn trivially_short_audio_yields_empty_text() {
        let mut model = StubTranscriber::new();
        let chunk = AudioChunk::new(vec![0.1; 80], 16_000);
        let text = model
            .transcribe(&chunk, &CancellationToken::new())
            .expect("transcribe");
        assert!(text.is_empty());
    }

    #[test]
    fn cancelled_token_aborts() {
        let mut model = StubTranscriber::new();
        let token = CancellationToken::new();
        token.cancel();
        let chunk = AudioChunk::new(vec![0.1; 3200], 16_000);
        assert!(matches!(
            model.transcribe(&chunk, &token),
            Err(CirrusError::Cancelled)
        ));
    }
}
