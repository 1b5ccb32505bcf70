use thiserror::Error;

/// All errors produced by cirrus-core.
#[derive(Debug, Error)]
pub enum CirrusError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("work queue is shut down")]
    QueueClosed,

    #[error("inference error: {0}")]
    Inference(String),

    #[error("inference cancelled")]
    Cancelled,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("WAV encoding error: {0}")]
    WavEncode(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CirrusError>;
