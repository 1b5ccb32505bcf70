//! SPSC sample transport between the capture callback and the pipeline.
//!
//! Two cooperating pieces: the [`ring`] buffer carries the samples, the
//! [`notify`] counter carries the "how much is ready" signal. The ring takes
//! no locks at all; only the counter synchronises visibility.

pub mod chunk;
pub mod notify;
pub mod ring;

pub use notify::AvailabilityCounter;
pub use ring::{create_ring, RingConsumer, RingProducer};

/// Ring safety factor over the configured max utterance length.
///
/// Capacity = `sample_rate × max_utterance_secs × RING_SAFETY_FACTOR`, so the
/// producer cannot lap an unconsumed utterance even while a slow final
/// inference stalls extraction for a while.
pub const RING_SAFETY_FACTOR: usize = 3;
