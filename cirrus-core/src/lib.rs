//! # cirrus-core
//!
//! Real-time capture and transcription engine for continuous radio
//! weather broadcasts. Audio is segmented into utterances at silence
//! boundaries inside the capture callback, buffered through a
//! single-producer single-consumer ring, and transcribed on a small
//! worker pool.
//!
//! ```text
//!  audio thread (RT)          capture thread              worker pool
//! ┌─────────────────┐      ┌──────────────────┐      ┌────────────────┐
//! │ cpal callback    │      │ pipeline loop     │      │ resample       │
//! │  downmix         │ ring │  wait_available   │ queue│ transcribe     │
//! │  segmenter      ─┼─────▶│  extract chunk   ─┼─────▶│ archive WAV    │
//! │  publish counter │      │  enqueue task     │      │ upsert store   │
//! └─────────────────┘      └──────────────────┘      │ broadcast      │
//!                                                     └────────────────┘
//! ```
//!
//! The audio callback never allocates, locks, or blocks; everything on
//! its path is wait-free. Backpressure lives one stage downstream: a
//! full work queue stalls the pipeline loop, never the callback.
//!
//! External collaborators are trait seams: [`inference::Transcriber`]
//! for the speech model and [`store::TranscriptStore`] for persistence.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod inference;
pub mod queue;
pub mod segment;
pub mod store;

pub use engine::{CirrusEngine, DiagnosticsSnapshot, EngineConfig};
pub use error::{CirrusError, Result};
pub use events::{EngineStatus, EngineStatusEvent, TranscriptEvent};
pub use inference::{CancellationToken, ModelHandle, StubTranscriber, Transcriber};
pub use segment::SegmenterConfig;
pub use store::TranscriptStore;
