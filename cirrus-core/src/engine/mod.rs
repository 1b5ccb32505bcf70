//! Engine lifecycle: owns the capture thread, the worker pool, and the
//! teardown ordering between them.
//!
//! `start()` spawns one capture thread which resolves the input device,
//! builds the ring/counter/segmenter plumbing, opens the audio stream, and
//! then runs the blocking consumer loop in [`pipeline`]. A bounded
//! crossbeam channel hands the negotiated sample rate (or the startup
//! error) back to the caller before `start()` returns.
//!
//! `stop()` flips the shared running flag, fires the cancellation token,
//! and joins the capture thread. The thread itself tears down in order:
//! audio stream first, then queue shutdown (which drains), then worker
//! join.

pub mod pipeline;

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::{
    audio::{self, AudioCapture},
    buffering::{create_ring, AvailabilityCounter, RING_SAFETY_FACTOR},
    error::{CirrusError, Result},
    events::{EngineStatus, EngineStatusEvent, TranscriptEvent},
    inference::{CancellationToken, ModelHandle},
    queue::{WorkQueue, WorkerPool},
    segment::{CaptureDiagnostics, SegmenterConfig, UtteranceSegmenter},
    store::TranscriptStore,
};

pub use pipeline::{DiagnosticsSnapshot, PipelineDiagnostics};

/// Engine tuning. Everything here is configuration, not a constant:
/// deployments monitoring different radio sources want different silence
/// thresholds and gap lengths.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Sample rate utterances are resampled to before inference.
    pub target_sample_rate: u32,
    pub segmenter: SegmenterConfig,
    /// Pending-task ceiling for the work queue; a full queue stalls the
    /// consumer loop, never the audio callback.
    pub queue_capacity: usize,
    pub worker_threads: usize,
    /// Collection name transcripts are upserted into.
    pub collection: String,
    /// When set, every extracted utterance is also written as
    /// `<archive_dir>/<utterance-id>.wav` at the capture rate.
    pub archive_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16_000,
            segmenter: SegmenterConfig::default(),
            queue_capacity: 10,
            worker_threads: 2,
            collection: "transcripts".to_string(),
            archive_dir: None,
        }
    }
}

/// Capacity of the transcript / status broadcast channels. Slow
/// subscribers lag rather than block the pipeline.
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct CirrusEngine {
    config: EngineConfig,
    model: ModelHandle,
    store: Option<Arc<dyn TranscriptStore>>,
    running: Arc<AtomicBool>,
    cancel: Mutex<CancellationToken>,
    capture_thread: Mutex<Option<thread::JoinHandle<()>>>,
    status: Mutex<EngineStatus>,
    status_tx: broadcast::Sender<EngineStatusEvent>,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
    capture_diagnostics: Arc<CaptureDiagnostics>,
}

impl CirrusEngine {
    pub fn new(config: EngineConfig, model: ModelHandle) -> Self {
        let (status_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (transcript_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            model,
            store: None,
            running: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(CancellationToken::new()),
            capture_thread: Mutex::new(None),
            status: Mutex::new(EngineStatus::Idle),
            status_tx,
            transcript_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PipelineDiagnostics::default()),
            capture_diagnostics: Arc::new(CaptureDiagnostics::default()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TranscriptStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Load the model ahead of the first utterance so the first worker
    /// task does not pay the initialization cost.
    pub fn warm_up(&self) -> Result<()> {
        self.set_status(EngineStatus::WarmingUp, None);
        let result = self.model.0.lock().warm_up();
        match &result {
            Ok(()) => self.set_status(EngineStatus::Idle, None),
            Err(e) => self.set_status(EngineStatus::Error, Some(e.to_string())),
        }
        result
    }

    /// Start capturing from the default input device. Returns the
    /// negotiated capture sample rate.
    pub fn start(&self) -> Result<u32> {
        self.start_with_device(None)
    }

    /// Start capturing from a named input device (falls back per
    /// [`audio::resolve_input`]). Returns the negotiated capture sample
    /// rate once the stream is live.
    pub fn start_with_device(&self, device_name: Option<&str>) -> Result<u32> {
        let mut thread_slot = self.capture_thread.lock();
        if thread_slot.is_some() {
            return Err(CirrusError::AlreadyRunning);
        }

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();
        self.running.store(true, Ordering::SeqCst);
        self.diagnostics.reset();
        self.capture_diagnostics.reset();

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32>>(1);

        let config = self.config.clone();
        let model = self.model.clone();
        let store = self.store.clone();
        let running = Arc::clone(&self.running);
        let transcript_tx = self.transcript_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);
        let capture_diagnostics = Arc::clone(&self.capture_diagnostics);
        let device_name = device_name.map(str::to_string);

        let handle = thread::Builder::new()
            .name("cirrus-capture".to_string())
            .spawn(move || {
                capture_thread_main(
                    config,
                    model,
                    store,
                    running,
                    cancel,
                    transcript_tx,
                    seq,
                    diagnostics,
                    capture_diagnostics,
                    device_name,
                    ready_tx,
                )
            })?;

        match ready_rx.recv() {
            Ok(Ok(rate)) => {
                *thread_slot = Some(handle);
                drop(thread_slot);
                self.set_status(EngineStatus::Listening, None);
                info!(sample_rate = rate, "engine started");
                Ok(rate)
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                if handle.join().is_err() {
                    error!("capture thread panicked during failed startup");
                }
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                if handle.join().is_err() {
                    error!("capture thread panicked before handshake");
                }
                let e = CirrusError::AudioStream(
                    "capture thread exited before reporting readiness".to_string(),
                );
                self.set_status(EngineStatus::Error, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Stop capture, drain pending work, and join every engine thread.
    pub fn stop(&self) -> Result<()> {
        let handle = self
            .capture_thread
            .lock()
            .take()
            .ok_or(CirrusError::NotRunning)?;

        self.running.store(false, Ordering::SeqCst);
        self.cancel.lock().cancel();
        if handle.join().is_err() {
            error!("capture thread panicked");
        }
        self.set_status(EngineStatus::Stopped, None);
        info!("engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> EngineStatus {
        *self.status.lock()
    }

    pub fn subscribe_transcripts(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.transcript_tx.subscribe()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<EngineStatusEvent> {
        self.status_tx.subscribe()
    }

    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    pub fn capture_diagnostics(&self) -> &CaptureDiagnostics {
        &self.capture_diagnostics
    }

    fn set_status(&self, status: EngineStatus, detail: Option<String>) {
        *self.status.lock() = status;
        let _ = self.status_tx.send(EngineStatusEvent { status, detail });
    }
}

impl Drop for CirrusEngine {
    fn drop(&mut self) {
        if self.capture_thread.lock().is_some() {
            if let Err(e) = self.stop() {
                warn!(error = %e, "failed to stop engine during drop");
            }
        }
    }
}

/// Body of the capture thread: device setup, stream plumbing, pipeline
/// loop, then ordered teardown.
#[allow(clippy::too_many_arguments)]
fn capture_thread_main(
    config: EngineConfig,
    model: ModelHandle,
    store: Option<Arc<dyn TranscriptStore>>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    transcript_tx: broadcast::Sender<TranscriptEvent>,
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PipelineDiagnostics>,
    capture_diagnostics: Arc<CaptureDiagnostics>,
    device_name: Option<String>,
    ready_tx: crossbeam_channel::Sender<Result<u32>>,
) {
    let input = match audio::resolve_input(device_name.as_deref()) {
        Ok(input) => input,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let sample_rate = input.sample_rate();

    // Sized so the callback can never lap the consumer: even with a full
    // max-length utterance awaiting extraction there is headroom for more.
    let ring_capacity = sample_rate as usize
        * config.segmenter.max_utterance_secs as usize
        * RING_SAFETY_FACTOR;
    let (producer, consumer) = create_ring(ring_capacity);
    let available = Arc::new(AvailabilityCounter::new());

    let segmenter = UtteranceSegmenter::new(
        &config.segmenter,
        sample_rate,
        producer,
        Arc::clone(&available),
        Arc::clone(&capture_diagnostics),
    );

    let capture = match AudioCapture::start(input, segmenter, Arc::clone(&running)) {
        Ok(capture) => capture,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };
    let _ = ready_tx.send(Ok(sample_rate));

    let queue = Arc::new(WorkQueue::with_capacity(config.queue_capacity));
    let pool = WorkerPool::spawn(Arc::clone(&queue), config.worker_threads);

    pipeline::run(pipeline::PipelineContext {
        config,
        model,
        store,
        consumer,
        available,
        queue: Arc::clone(&queue),
        running,
        cancel,
        transcript_tx,
        seq,
        capture_sample_rate: sample_rate,
        diagnostics,
    });

    // Teardown order matters: stream first so no new samples arrive, then
    // queue shutdown (drains what is already enqueued), then worker join.
    capture.stop();
    drop(capture);
    queue.shutdown();
    pool.join();
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::inference::StubTranscriber;

    #[test]
    fn default_config_matches_field_deployment() {
        let config = EngineConfig::default();
        assert_eq!(config.target_sample_rate, 16_000);
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.worker_threads, 2);
        assert!(config.archive_dir.is_none());
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let engine = CirrusEngine::new(
            EngineConfig::default(),
            ModelHandle::new(StubTranscriber::default()),
        );
        assert!(matches!(engine.stop(), Err(CirrusError::NotRunning)));
        assert!(!engine.is_running());
    }

    #[test]
    fn warm_up_transitions_back_to_idle() {
        let engine = CirrusEngine::new(
            EngineConfig::default(),
            ModelHandle::new(StubTranscriber::default()),
        );
        let mut status_rx = engine.subscribe_status();
        engine.warm_up().expect("stub warm-up cannot fail");
        assert_eq!(engine.status(), EngineStatus::Idle);

        let first = status_rx.try_recv().expect("warming-up event");
        assert_eq!(first.status, EngineStatus::WarmingUp);
        let second = status_rx.try_recv().expect("idle event");
        assert_eq!(second.status, EngineStatus::Idle);
    }
}
