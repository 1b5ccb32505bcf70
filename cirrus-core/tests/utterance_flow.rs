//! Full-path integration: segmenter → ring → availability counter →
//! pipeline → work queue → worker → store + broadcast, with the capture
//! callback replaced by direct frame pushes.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::TryRecvError};

use cirrus_core::buffering::{create_ring, AvailabilityCounter};
use cirrus_core::engine::{pipeline, EngineConfig, PipelineDiagnostics};
use cirrus_core::queue::{WorkQueue, WorkerPool};
use cirrus_core::segment::{CaptureDiagnostics, SegmentEvent, UtteranceSegmenter};
use cirrus_core::{
    CancellationToken, ModelHandle, Result, StubTranscriber, TranscriptEvent, TranscriptStore,
};

const RATE: u32 = 16_000;
/// One 200 ms capture frame at 16 kHz.
const FRAME: usize = 3_200;

#[derive(Default)]
struct MemoryStore {
    rows: Mutex<Vec<(String, String, String)>>,
}

impl TranscriptStore for MemoryStore {
    fn upsert(&self, collection: &str, id: &str, text: &str) -> Result<()> {
        let mut rows = self.rows.lock();
        if let Some(row) = rows
            .iter_mut()
            .find(|(c, i, _)| c == collection && i == id)
        {
            row.2 = text.to_string();
        } else {
            rows.push((collection.into(), id.into(), text.into()));
        }
        Ok(())
    }
}

fn recv_transcript(
    rx: &mut broadcast::Receiver<TranscriptEvent>,
    timeout: Duration,
) -> TranscriptEvent {
    let start = Instant::now();
    loop {
        match rx.try_recv() {
            Ok(ev) => return ev,
            Err(TryRecvError::Empty) => {
                assert!(
                    start.elapsed() < timeout,
                    "timed out waiting for transcript event"
                );
                thread::sleep(Duration::from_millis(5));
            }
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Closed) => panic!("transcript channel closed"),
        }
    }
}

#[test]
fn spoken_broadcast_reaches_store_and_subscribers() {
    let mut config = EngineConfig::default();
    config.collection = "wx-broadcasts".into();

    let (producer, consumer) = create_ring(1 << 20);
    let available = Arc::new(AvailabilityCounter::new());
    let capture_diag = Arc::new(CaptureDiagnostics::default());
    let mut segmenter = UtteranceSegmenter::new(
        &config.segmenter,
        RATE,
        producer,
        Arc::clone(&available),
        Arc::clone(&capture_diag),
    );

    let store = Arc::new(MemoryStore::default());
    let queue = Arc::new(WorkQueue::with_capacity(config.queue_capacity));
    let pool = WorkerPool::spawn(Arc::clone(&queue), config.worker_threads);
    let running = Arc::new(AtomicBool::new(true));
    let (transcript_tx, mut transcript_rx) = broadcast::channel(16);
    let diagnostics = Arc::new(PipelineDiagnostics::default());

    let ctx = pipeline::PipelineContext {
        config,
        model: ModelHandle::new(StubTranscriber::new()),
        store: Some(Arc::clone(&store) as Arc<dyn TranscriptStore>),
        consumer,
        available,
        queue: Arc::clone(&queue),
        running: Arc::clone(&running),
        cancel: CancellationToken::new(),
        transcript_tx,
        seq: Arc::new(AtomicU64::new(0)),
        capture_sample_rate: RATE,
        diagnostics: Arc::clone(&diagnostics),
    };
    let pipeline_thread = thread::spawn(move || pipeline::run(ctx));

    // 1.2 s of speech.
    let voiced = vec![0.1_f32; FRAME];
    for _ in 0..6 {
        segmenter.push_frame(&voiced);
    }

    // Default close threshold is 2200 ms = 11 frames of silence. They end
    // the utterance but are not part of it: only the six voiced frames are
    // published, so the transcript covers 1.2 s ± one frame.
    let silent = vec![0.0_f32; FRAME];
    let mut closed = None;
    for _ in 0..11 {
        if let SegmentEvent::Closed(c) = segmenter.push_frame(&silent) {
            closed = Some(c);
            break;
        }
    }
    let closed = closed.expect("utterance should close after 2200 ms of silence");
    assert!(!closed.forced);
    assert_eq!(closed.samples, 6 * FRAME);
    assert!(closed.samples.abs_diff(19_200) <= FRAME);

    let event = recv_transcript(&mut transcript_rx, Duration::from_secs(5));
    running.store(false, Ordering::SeqCst);
    pipeline_thread.join().expect("pipeline thread panicked");
    queue.shutdown();
    pool.join();

    assert_eq!(event.utterance_id, "utt-0");
    assert_eq!(event.text, format!("[stub: {} samples @ {RATE} Hz]", 6 * FRAME));
    assert!((event.duration_secs - 1.2).abs() < 1e-9);

    let rows = store.rows.lock();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].0, "wx-broadcasts");
    assert_eq!(rows[0].1, "utt-0");

    let snap = diagnostics.snapshot();
    assert_eq!(snap.utterances_extracted, 1);
    assert_eq!(snap.samples_extracted, 6 * FRAME);
    assert_eq!(snap.inference_calls, 1);
    assert_eq!(snap.inference_errors, 0);
    assert_eq!(snap.transcripts_emitted, 1);
    assert_eq!(capture_diag.utterances_opened.load(Ordering::Relaxed), 1);
    assert_eq!(capture_diag.utterances_closed.load(Ordering::Relaxed), 1);
}

#[test]
fn open_utterance_is_flushed_on_stop() {
    let mut config = EngineConfig::default();
    config.collection = "wx-broadcasts".into();

    let (producer, consumer) = create_ring(1 << 20);
    let available = Arc::new(AvailabilityCounter::new());
    let mut segmenter = UtteranceSegmenter::new(
        &config.segmenter,
        RATE,
        producer,
        Arc::clone(&available),
        Arc::new(CaptureDiagnostics::default()),
    );

    let store = Arc::new(MemoryStore::default());
    let queue = Arc::new(WorkQueue::with_capacity(config.queue_capacity));
    let pool = WorkerPool::spawn(Arc::clone(&queue), config.worker_threads);
    let running = Arc::new(AtomicBool::new(true));
    let (transcript_tx, mut transcript_rx) = broadcast::channel(16);

    let ctx = pipeline::PipelineContext {
        config,
        model: ModelHandle::new(StubTranscriber::new()),
        store: Some(Arc::clone(&store) as Arc<dyn TranscriptStore>),
        consumer,
        available,
        queue: Arc::clone(&queue),
        running: Arc::clone(&running),
        cancel: CancellationToken::new(),
        transcript_tx,
        seq: Arc::new(AtomicU64::new(0)),
        capture_sample_rate: RATE,
        diagnostics: Arc::new(PipelineDiagnostics::default()),
    };
    let pipeline_thread = thread::spawn(move || pipeline::run(ctx));

    // Speech with no closing silence, then a stop, the way the capture
    // callback drains when the engine shuts down mid-utterance.
    let voiced = vec![0.1_f32; FRAME];
    for _ in 0..4 {
        segmenter.push_frame(&voiced);
    }
    running.store(false, Ordering::SeqCst);
    let closed = match segmenter.close_open_utterance() {
        SegmentEvent::Closed(c) => c,
        other => panic!("expected a closed utterance, got {other:?}"),
    };
    assert_eq!(closed.samples, 4 * FRAME);

    // The pipeline's post-stop drain pass picks the flush up.
    pipeline_thread.join().expect("pipeline thread panicked");
    queue.shutdown();
    pool.join();

    let event = recv_transcript(&mut transcript_rx, Duration::from_secs(1));
    assert_eq!(event.text, format!("[stub: {} samples @ {RATE} Hz]", 4 * FRAME));
    assert_eq!(store.rows.lock().len(), 1);
}
