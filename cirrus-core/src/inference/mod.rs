//! Speech-to-text abstraction.
//!
//! The `Transcriber` trait decouples the worker tasks from any specific
//! backend (stub echo, whisper bindings, a remote service). To the engine it
//! is an opaque function: samples in, text out — long-running, blocking and
//! CPU-bound, called only from worker threads, never the capture or pipeline
//! thread.
//!
//! `&mut self` on `transcribe` expresses that decoders are stateful; all
//! mutation is serialised through `ModelHandle`'s `parking_lot::Mutex`.
//! Cancellation is an explicit token handed into the call, not a global
//! flag: the engine cancels in-flight inference on stop and the backend
//! polls the token at its own convenient granularity.

pub mod stub;

pub use stub::StubTranscriber;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffering::chunk::AudioChunk;
use crate::error::Result;

/// Cooperative cancellation flag for blocking inference calls.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; observed by all clones.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Contract for speech recognition backends.
pub trait Transcriber: Send + 'static {
    /// One-time warm-up: load weights, run a dummy inference. Called once at
    /// engine startup.
    ///
    /// # Errors
    /// Returns an error if model files are missing or corrupt.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe one complete utterance of mono f32 audio.
    ///
    /// Backends should poll `cancel` during long decodes and return
    /// `CirrusError::Cancelled` promptly once it fires.
    fn transcribe(&mut self, chunk: &AudioChunk, cancel: &CancellationToken) -> Result<String>;
}

/// Thread-safe reference-counted handle to any `Transcriber` implementor.
///
/// Workers clone the handle into their tasks; the `parking_lot::Mutex`
/// serialises decoder access and does not poison on panic.
#[derive(Clone)]
pub struct ModelHandle(pub Arc<Mutex<dyn Transcriber>>);

impl ModelHandle {
    /// Wrap any `Transcriber` in a `ModelHandle`.
    pub fn new<M: Transcriber>(model: M) -> Self {
        Self(Arc::new(Mutex::new(model)))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_cancels_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
