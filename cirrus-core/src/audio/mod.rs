//! Audio capture via the cpal backend.
//!
//! # Design constraints
//!
//! The cpal input callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory (beyond the one-time downmix buffer growth)
//! - Block on a mutex or condvar
//! - Perform I/O
//!
//! The callback body here downmixes the device frame to mono f32 and hands
//! it to [`UtteranceSegmenter::push_frame`], which only touches the SPSC
//! ring and the availability counter's lock-free publish side.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `AudioCapture` must therefore be created and dropped on the same
//! thread; the engine does both on its dedicated capture thread.

pub mod device;
pub mod resample;
pub mod wav;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::{
    error::{CirrusError, Result},
    segment::UtteranceSegmenter,
};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, Stream, StreamConfig,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

/// A resolved input device plus the configuration capture will use.
///
/// Resolving is split from stream creation so the engine can size the ring
/// buffer from the actual device rate before the callback exists.
#[cfg(feature = "audio-cpal")]
pub struct ResolvedInput {
    device: cpal::Device,
    sample_rate: u32,
    channels: u16,
    format: SampleFormat,
}

#[cfg(feature = "audio-cpal")]
impl ResolvedInput {
    /// Capture sample rate the device will deliver (Hz).
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Resolve an input device by preferred name, falling back to the system
/// default and then the first available device.
#[cfg(feature = "audio-cpal")]
pub fn resolve_input(preferred_device_name: Option<&str>) -> Result<ResolvedInput> {
    let host = cpal::default_host();
    let mut selected = None;

    if let Some(preferred) = preferred_device_name {
        match host.input_devices() {
            Ok(mut devices) => {
                selected = devices
                    .find(|d| d.name().map(|n| n == preferred).unwrap_or(false));
                if selected.is_none() {
                    warn!("preferred input device '{preferred}' not found, falling back");
                }
            }
            Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
        }
    }

    let device = if let Some(device) = selected {
        device
    } else if let Some(default) = host.default_input_device() {
        default
    } else {
        let mut devices = host
            .input_devices()
            .map_err(|e| CirrusError::AudioDevice(e.to_string()))?;
        let fallback = devices.next().ok_or(CirrusError::NoDefaultInputDevice)?;
        warn!("no default input device, falling back to first available input");
        fallback
    };

    info!(
        device = device.name().unwrap_or_default().as_str(),
        "resolved input device"
    );

    let supported = device
        .default_input_config()
        .map_err(|e| CirrusError::AudioDevice(e.to_string()))?;

    let resolved = ResolvedInput {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
        format: supported.sample_format(),
        device,
    };
    info!(
        sample_rate = resolved.sample_rate,
        channels = resolved.channels,
        format = ?resolved.format,
        "capture config selected"
    );
    Ok(resolved)
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
pub struct ResolvedInput {
    sample_rate: u32,
    channels: u16,
}

#[cfg(not(feature = "audio-cpal"))]
impl ResolvedInput {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn resolve_input(_preferred_device_name: Option<&str>) -> Result<ResolvedInput> {
    Err(CirrusError::AudioStream(
        "audio capture requires the audio-cpal feature".to_string(),
    ))
}

/// Handle to an active audio capture stream.
///
/// **Not `Send`** — `cpal::Stream` is bound to its creation thread on
/// Windows/macOS. Create and drop this type on the same OS thread.
pub struct AudioCapture {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    /// Shared flag — `false` makes the callback flush and then no-op.
    running: Arc<AtomicBool>,
    /// Actual capture sample rate (Hz).
    pub sample_rate: u32,
}

impl AudioCapture {
    /// Build the input stream around `segmenter` and start capturing.
    ///
    /// Ownership of the segmenter moves into the callback; from here on the
    /// audio thread is its only mutator.
    ///
    /// # Errors
    /// `CirrusError::AudioStream` if cpal rejects the stream configuration.
    #[cfg(feature = "audio-cpal")]
    pub fn start(
        input: ResolvedInput,
        segmenter: UtteranceSegmenter,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let config = StreamConfig {
            channels: input.channels,
            sample_rate: cpal::SampleRate(input.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let channels = input.channels as usize;
        let sample_rate = input.sample_rate;

        let stream = match input.format {
            SampleFormat::F32 => build_stream::<f32>(
                &input.device,
                &config,
                channels,
                segmenter,
                Arc::clone(&running),
            ),
            SampleFormat::I16 => build_stream::<i16>(
                &input.device,
                &config,
                channels,
                segmenter,
                Arc::clone(&running),
            ),
            SampleFormat::U8 => build_stream::<u8>(
                &input.device,
                &config,
                channels,
                segmenter,
                Arc::clone(&running),
            ),
            fmt => {
                return Err(CirrusError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }?;

        stream
            .play()
            .map_err(|e| CirrusError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            running,
            sample_rate,
        })
    }

    /// Stop: signal the callback to flush and no-op on its next invocation.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioCapture {
    pub fn start(
        _input: ResolvedInput,
        _segmenter: UtteranceSegmenter,
        _running: Arc<AtomicBool>,
    ) -> Result<Self> {
        Err(CirrusError::AudioStream(
            "audio capture requires the audio-cpal feature".to_string(),
        ))
    }
}

/// PCM formats the capture path accepts, normalized to f32 in [-1, 1].
#[cfg(feature = "audio-cpal")]
trait PcmSample: Copy {
    fn to_f32(self) -> f32;
}

#[cfg(feature = "audio-cpal")]
impl PcmSample for f32 {
    fn to_f32(self) -> f32 {
        self
    }
}

#[cfg(feature = "audio-cpal")]
impl PcmSample for i16 {
    fn to_f32(self) -> f32 {
        self as f32 / 32768.0
    }
}

#[cfg(feature = "audio-cpal")]
impl PcmSample for u8 {
    fn to_f32(self) -> f32 {
        (self as f32 - 128.0) / 128.0
    }
}

/// Average interleaved channels into `out` as mono f32.
///
/// `out` is reused across callbacks; it only reallocates when the device
/// delivers a larger frame than any seen before.
#[cfg(feature = "audio-cpal")]
fn downmix<T: PcmSample>(data: &[T], channels: usize, out: &mut Vec<f32>) {
    let frames = data.len() / channels;
    out.resize(frames, 0.0);
    if channels == 1 {
        for (o, s) in out.iter_mut().zip(data) {
            *o = s.to_f32();
        }
    } else {
        for (f, o) in out.iter_mut().enumerate() {
            let base = f * channels;
            let mut sum = 0f32;
            for c in 0..channels {
                sum += data[base + c].to_f32();
            }
            *o = sum / channels as f32;
        }
    }
}

#[cfg(feature = "audio-cpal")]
fn build_stream<T: cpal::SizedSample + PcmSample + Send + 'static>(
    device: &cpal::Device,
    config: &StreamConfig,
    channels: usize,
    mut segmenter: UtteranceSegmenter,
    running: Arc<AtomicBool>,
) -> Result<Stream> {
    let mut mono_buf: Vec<f32> = Vec::new();
    device
        .build_input_stream(
            config,
            move |data: &[T], _info| {
                if !running.load(Ordering::Relaxed) {
                    // Stop requested: drain any in-progress utterance so it
                    // still reaches the pipeline, then go quiet.
                    segmenter.close_open_utterance();
                    return;
                }
                downmix(data, channels, &mut mono_buf);
                segmenter.push_frame(&mono_buf);
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| CirrusError::AudioStream(e.to_string()))
}


#[cfg(all(test, not(feature = "audio-cpal")))]
mod headless_tests {
    use super::*;

    #[test]
    fn resolve_input_reports_missing_backend() {
        assert!(matches!(
            resolve_input(None),
            Err(CirrusError::AudioStream(_))
        ));
    }
}
