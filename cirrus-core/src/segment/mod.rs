//! Utterance segmentation driven by RMS energy.
//!
//! `UtteranceSegmenter::push_frame` *is* the capture-callback body. It runs
//! on the OS audio thread at real-time priority and therefore does no heap
//! allocation, no locking, and no I/O — per frame it computes one RMS value,
//! mutates two counters, optionally copies the frame into the SPSC ring, and
//! on utterance close publishes the sample count with a lock-free notify.
//!
//! ## Algorithm per frame
//!
//! 1. Ignore zero-length frames (RMS would divide by zero).
//! 2. RMS < threshold → grow the silent run; while recording, a run reaching
//!    the close duration ends the utterance. Silent frames are never
//!    appended to the ring: a published utterance is voiced content only,
//!    with at most one frame of boundary slack.
//! 3. RMS ≥ threshold → reset the run; when idle, open a new utterance.
//! 4. Voiced frames while recording (including the opening frame) are
//!    appended to the ring.
//! 5. Hitting the max-utterance ceiling force-closes regardless of energy,
//!    so a speaker who never pauses cannot starve the ring buffer.
//!
//! The two independent thresholds — silent run length to close, sample
//! ceiling to force-close — cover both "speaker stopped" and "speaker never
//! stops". Worst-case callback cost is O(frame length).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::buffering::{AvailabilityCounter, RingProducer};

/// Segmentation tuning. All values are runtime configuration; the defaults
/// come from long-running deployments against aviation weather broadcasts.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// RMS amplitude below which a frame counts as silence. Default: 0.002.
    pub silence_threshold_rms: f32,
    /// How much continuous silence closes the current utterance (ms).
    /// Default: 2200.
    pub silence_close_ms: u32,
    /// Hard ceiling on utterance duration (seconds). Default: 60.
    pub max_utterance_secs: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            silence_threshold_rms: 0.002,
            silence_close_ms: 2200,
            max_utterance_secs: 60,
        }
    }
}

/// What `push_frame` did with the frame, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentEvent {
    /// Nothing changed (idle silence, or mid-utterance accumulation).
    None,
    /// A new utterance opened with this frame.
    Opened,
    /// The current utterance closed; its samples are now published.
    Closed(ClosedUtterance),
}

/// Boundary record for a finished utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosedUtterance {
    /// Samples appended to the ring for this utterance.
    pub samples: usize,
    /// True when the max-duration ceiling forced the close.
    pub forced: bool,
}

/// Relaxed counters mutated on the capture thread, read from anywhere.
#[derive(Debug, Default)]
pub struct CaptureDiagnostics {
    pub frames_in: AtomicUsize,
    pub samples_buffered: AtomicUsize,
    pub utterances_opened: AtomicUsize,
    pub utterances_closed: AtomicUsize,
    pub utterances_force_closed: AtomicUsize,
}

impl CaptureDiagnostics {
    pub fn reset(&self) {
        self.frames_in.store(0, Ordering::Relaxed);
        self.samples_buffered.store(0, Ordering::Relaxed);
        self.utterances_opened.store(0, Ordering::Relaxed);
        self.utterances_closed.store(0, Ordering::Relaxed);
        self.utterances_force_closed.store(0, Ordering::Relaxed);
    }
}

/// The stateful silence/speech segmenter. Producer-side only: it owns the
/// ring's write half and is moved into the capture callback at stream build.
pub struct UtteranceSegmenter {
    silence_threshold_rms: f32,
    /// Silent run length that closes an utterance, in samples.
    close_after_samples: usize,
    /// Force-close ceiling, in samples.
    max_utterance_samples: usize,

    recording: bool,
    /// Run length of consecutive silent samples. Sample-denominated because
    /// cpal delivers variable-length frames.
    silent_run_samples: usize,
    /// Samples appended to the in-progress utterance; reset on every close.
    buffered_samples: usize,

    producer: RingProducer,
    available: Arc<AvailabilityCounter>,
    diagnostics: Arc<CaptureDiagnostics>,
}

impl UtteranceSegmenter {
    pub fn new(
        config: &SegmenterConfig,
        sample_rate: u32,
        producer: RingProducer,
        available: Arc<AvailabilityCounter>,
        diagnostics: Arc<CaptureDiagnostics>,
    ) -> Self {
        let close_after_samples =
            (sample_rate as usize * config.silence_close_ms as usize) / 1000;
        let max_utterance_samples = sample_rate as usize * config.max_utterance_secs as usize;
        Self {
            silence_threshold_rms: config.silence_threshold_rms,
            close_after_samples: close_after_samples.max(1),
            max_utterance_samples: max_utterance_samples.max(1),
            recording: false,
            silent_run_samples: 0,
            buffered_samples: 0,
            producer,
            available,
            diagnostics,
        }
    }

    /// Process one mono frame from the capture callback.
    pub fn push_frame(&mut self, frame: &[f32]) -> SegmentEvent {
        if frame.is_empty() {
            return SegmentEvent::None;
        }
        self.diagnostics.frames_in.fetch_add(1, Ordering::Relaxed);

        if rms(frame) < self.silence_threshold_rms {
            // Silent frames grow the close run but are not buffered; the
            // published utterance is voiced content only.
            if self.recording {
                self.silent_run_samples += frame.len();
                if self.silent_run_samples >= self.close_after_samples {
                    return self.close(false);
                }
            }
            return SegmentEvent::None;
        }

        self.silent_run_samples = 0;
        let mut opened = false;
        if !self.recording {
            self.recording = true;
            self.buffered_samples = 0;
            opened = true;
            self.diagnostics
                .utterances_opened
                .fetch_add(1, Ordering::Relaxed);
        }

        self.producer.write(frame);
        self.buffered_samples += frame.len();
        self.diagnostics
            .samples_buffered
            .fetch_add(frame.len(), Ordering::Relaxed);
        if self.buffered_samples >= self.max_utterance_samples {
            return self.close(true);
        }

        if opened {
            SegmentEvent::Opened
        } else {
            SegmentEvent::None
        }
    }

    /// Close any in-progress utterance, publishing what was buffered.
    ///
    /// Called when capture stops, so speech cut off mid-utterance still
    /// reaches the pipeline. No-op when idle.
    pub fn close_open_utterance(&mut self) -> SegmentEvent {
        if self.recording {
            self.close(true)
        } else {
            SegmentEvent::None
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn close(&mut self, forced: bool) -> SegmentEvent {
        let samples = self.buffered_samples;
        self.recording = false;
        self.buffered_samples = 0;
        self.silent_run_samples = 0;

        self.diagnostics
            .utterances_closed
            .fetch_add(1, Ordering::Relaxed);
        if forced {
            self.diagnostics
                .utterances_force_closed
                .fetch_add(1, Ordering::Relaxed);
        }

        // Release-publish makes the ring writes above visible to the
        // consumer, and wakes it.
        self.available.publish(samples);
        SegmentEvent::Closed(ClosedUtterance { samples, forced })
    }
}

/// Root-mean-square amplitude of a frame, in [0, 1] for normalized input.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
