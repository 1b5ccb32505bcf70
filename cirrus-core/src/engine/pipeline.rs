//! Consumer loop: chunk extraction and task hand-off.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Block on the availability counter (timed, shutdown-aware)
//! 2. Copy exactly the published sample count out of the ring
//!    into a freshly owned Vec (wraparound handled by the ring)
//! 3. take(n) on the counter
//! 4. Enqueue one task owning the copy — blocks when the queue
//!    is full; that stall is the backpressure mechanism
//! ```
//!
//! The task itself runs on a worker thread and may block freely: it
//! resamples to the inference rate, optionally archives a WAV copy,
//! transcribes, upserts the transcript store, and broadcasts the result.
//! Every published utterance reaches exactly one worker execution; a failed
//! task is logged and dropped, never retried, and its buffer is released
//! with the closure.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, error, info, info_span, warn};

use crate::{
    audio::{resample::resample_utterance, wav},
    buffering::{chunk::AudioChunk, AvailabilityCounter, RingConsumer},
    engine::EngineConfig,
    error::CirrusError,
    events::TranscriptEvent,
    inference::{CancellationToken, ModelHandle},
    queue::WorkQueue,
    store::TranscriptStore,
};

/// How long one timed wait on the availability counter lasts. Bounds both
/// the lost-wakeup window and the stop-flag latency.
const WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// After the stop flag drops, how long to keep checking for an in-progress
/// utterance that the capture callback force-closes and publishes.
const STOP_DRAIN_DEADLINE: Duration = Duration::from_millis(250);

/// Poll interval inside the stop-drain window.
const STOP_DRAIN_POLL: Duration = Duration::from_millis(20);

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub utterances_extracted: AtomicUsize,
    pub samples_extracted: AtomicUsize,
    pub inference_calls: AtomicUsize,
    pub inference_errors: AtomicUsize,
    pub store_errors: AtomicUsize,
    pub transcripts_emitted: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        self.utterances_extracted.store(0, Ordering::Relaxed);
        self.samples_extracted.store(0, Ordering::Relaxed);
        self.inference_calls.store(0, Ordering::Relaxed);
        self.inference_errors.store(0, Ordering::Relaxed);
        self.store_errors.store(0, Ordering::Relaxed);
        self.transcripts_emitted.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            utterances_extracted: self.utterances_extracted.load(Ordering::Relaxed),
            samples_extracted: self.samples_extracted.load(Ordering::Relaxed),
            inference_calls: self.inference_calls.load(Ordering::Relaxed),
            inference_errors: self.inference_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            transcripts_emitted: self.transcripts_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub utterances_extracted: usize,
    pub samples_extracted: usize,
    pub inference_calls: usize,
    pub inference_errors: usize,
    pub store_errors: usize,
    pub transcripts_emitted: usize,
}

/// All context the pipeline needs, passed as one struct so the capture
/// thread's closure stays tidy.
pub struct PipelineContext {
    pub config: EngineConfig,
    pub model: ModelHandle,
    pub store: Option<Arc<dyn TranscriptStore>>,
    pub consumer: RingConsumer,
    pub available: Arc<AvailabilityCounter>,
    pub queue: Arc<WorkQueue>,
    pub running: Arc<AtomicBool>,
    pub cancel: CancellationToken,
    pub transcript_tx: broadcast::Sender<TranscriptEvent>,
    pub seq: Arc<AtomicU64>,
    pub capture_sample_rate: u32,
    pub diagnostics: Arc<PipelineDiagnostics>,
}

/// Run the blocking consumer loop until `ctx.running` becomes false.
pub fn run(mut ctx: PipelineContext) {
    info!(
        capture_rate = ctx.capture_sample_rate,
        target_rate = ctx.config.target_sample_rate,
        "pipeline started"
    );

    let mut next_utterance_id = 0u64;

    while ctx.running.load(Ordering::Relaxed) {
        let n = ctx.available.wait_available(WAIT_TIMEOUT);
        if n == 0 {
            continue;
        }
        if extract_and_enqueue(&mut ctx, &mut next_utterance_id, n).is_err() {
            // Queue shut down under us — engine teardown is in progress.
            break;
        }
    }

    // The capture callback force-closes an in-progress utterance when it
    // observes the stop flag. Poll for that flush up to a short deadline so
    // an idle stop stays prompt and a mid-utterance stop loses nothing.
    let deadline = std::time::Instant::now() + STOP_DRAIN_DEADLINE;
    loop {
        let n = ctx.available.wait_available(STOP_DRAIN_POLL);
        if n > 0 {
            info!(samples = n, "draining utterance published during stop");
            let _ = extract_and_enqueue(&mut ctx, &mut next_utterance_id, n);
            break;
        }
        if std::time::Instant::now() >= deadline {
            break;
        }
    }

    let snap = ctx.diagnostics.snapshot();
    info!(
        utterances_extracted = snap.utterances_extracted,
        samples_extracted = snap.samples_extracted,
        inference_calls = snap.inference_calls,
        inference_errors = snap.inference_errors,
        store_errors = snap.store_errors,
        transcripts_emitted = snap.transcripts_emitted,
        "pipeline stopped — diagnostics"
    );
}

/// Copy `n` published samples out of the ring and enqueue one task for them.
///
/// Blocks on a full queue (backpressure). Errors only when the queue has
/// been shut down.
fn extract_and_enqueue(
    ctx: &mut PipelineContext,
    next_utterance_id: &mut u64,
    n: usize,
) -> crate::error::Result<()> {
    let samples = ctx.consumer.read_vec(n);
    let prior = ctx.available.take(n);

    let utterance_id = format!("utt-{}", *next_utterance_id);
    *next_utterance_id += 1;

    debug!(
        utterance_id = %utterance_id,
        samples = n,
        available_before = prior,
        "utterance extracted"
    );
    ctx.diagnostics
        .utterances_extracted
        .fetch_add(1, Ordering::Relaxed);
    ctx.diagnostics
        .samples_extracted
        .fetch_add(n, Ordering::Relaxed);

    let work = UtteranceWork {
        utterance_id,
        samples,
        capture_sample_rate: ctx.capture_sample_rate,
        target_sample_rate: ctx.config.target_sample_rate,
        collection: ctx.config.collection.clone(),
        archive_dir: ctx.config.archive_dir.clone(),
        model: ctx.model.clone(),
        store: ctx.store.clone(),
        cancel: ctx.cancel.clone(),
        transcript_tx: ctx.transcript_tx.clone(),
        seq: Arc::clone(&ctx.seq),
        diagnostics: Arc::clone(&ctx.diagnostics),
    };
    ctx.queue.enqueue(Box::new(move || work.process()))
}

/// Everything one worker needs to turn raw samples into a stored transcript.
/// Owns the extracted buffer; dropping the struct releases it even when a
/// stage fails.
struct UtteranceWork {
    utterance_id: String,
    samples: Vec<f32>,
    capture_sample_rate: u32,
    target_sample_rate: u32,
    collection: String,
    archive_dir: Option<PathBuf>,
    model: ModelHandle,
    store: Option<Arc<dyn TranscriptStore>>,
    cancel: CancellationToken,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
}

impl UtteranceWork {
    fn process(self) {
        let span = info_span!("utterance", utterance_id = %self.utterance_id);
        let _enter = span.enter();

        let duration_secs = self.samples.len() as f64 / self.capture_sample_rate as f64;

        if let Some(ref dir) = self.archive_dir {
            let path = dir.join(format!("{}.wav", self.utterance_id));
            if let Err(e) =
                wav::write_wav_file(&path, &self.samples, self.capture_sample_rate, 1)
            {
                warn!(path = %path.display(), error = %e, "failed to archive utterance");
            }
        }

        let resampled = match resample_utterance(
            &self.samples,
            self.capture_sample_rate,
            self.target_sample_rate,
        ) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "resampling failed — dropping utterance");
                self.diagnostics
                    .inference_errors
                    .fetch_add(1, Ordering::Relaxed);
                return;
            }
        };
        let chunk = AudioChunk::new(resampled, self.target_sample_rate);

        self.diagnostics
            .inference_calls
            .fetch_add(1, Ordering::Relaxed);
        let text = {
            let mut model = self.model.0.lock();
            match model.transcribe(&chunk, &self.cancel) {
                Ok(text) => text,
                Err(CirrusError::Cancelled) => {
                    debug!("inference cancelled during shutdown");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "inference error");
                    self.diagnostics
                        .inference_errors
                        .fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
        };

        if text.trim().is_empty() {
            info!(samples = self.samples.len(), "inference returned empty text");
            return;
        }

        if let Some(ref store) = self.store {
            if let Err(e) = store.upsert(&self.collection, &self.utterance_id, &text) {
                // Not retried here; each record is keyed by id so a later
                // pass can reconcile.
                error!(
                    collection = %self.collection,
                    error = %e,
                    "failed to persist transcript"
                );
                self.diagnostics
                    .store_errors
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let event = TranscriptEvent {
            seq,
            utterance_id: self.utterance_id.clone(),
            text: text.clone(),
            duration_secs,
        };
        let emitted = self.transcript_tx.send(event).is_ok();
        self.diagnostics
            .transcripts_emitted
            .fetch_add(1, Ordering::Relaxed);

        let preview: String = text.chars().take(50).collect();
        info!(
            samples = self.samples.len(),
            duration_secs = format_args!("{duration_secs:.2}"),
            text_preview = %preview,
            emitted,
            "transcript complete"
        );
    }
}
