//! Event types broadcast by the engine to subscribers.
//!
//! Subscribers (the CLI daemon, a future UI) receive these over
//! `tokio::sync::broadcast` channels. All types serialize as camelCase JSON
//! so they can be forwarded verbatim over IPC or logged structurally.

use serde::{Deserialize, Serialize};

/// Emitted once per transcribed utterance, from a worker thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    /// Monotonically increasing event sequence number.
    pub seq: u64,
    /// Unique ID of the utterance this text belongs to.
    pub utterance_id: String,
    /// Recognised text.
    pub text: String,
    /// Utterance duration in seconds at the capture rate.
    pub duration_secs: f64,
}

/// Emitted when the engine state changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

/// Current state of the Cirrus engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Engine created but `start()` not yet called.
    Idle,
    /// Warming up the speech model.
    WarmingUp,
    /// Actively capturing audio and transcribing.
    Listening,
    /// Capture stopped; engine may be restarted.
    Stopped,
    /// Unrecoverable error — restart required.
    Error,
}
