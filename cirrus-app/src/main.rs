//! Cirrus daemon entry point.
//!
//! Wires the core engine to a SQLite transcript store and runs until
//! Ctrl-C. The speech backend is the echo stub until a real model crate
//! is linked in; everything else (capture, segmentation, queueing,
//! persistence) is the production path.

mod settings;
mod storage;

use std::sync::Arc;

use anyhow::Context;
use cirrus_core::{
    audio::device::list_input_devices, CirrusEngine, ModelHandle, StubTranscriber,
};
use settings::{default_settings_path, load_settings, save_settings};
use storage::SqliteStore;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cirrus=info".parse().expect("static filter parses")),
        )
        .init();

    if std::env::args().any(|a| a == "--list-devices") {
        for device in list_input_devices() {
            let marker = if device.is_default { " (default)" } else { "" };
            println!("{}{marker}", device.name);
        }
        return Ok(());
    }

    info!("Cirrus starting");

    let settings_path = std::env::var_os("CIRRUS_SETTINGS")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(default_settings_path);
    let settings = load_settings(&settings_path);
    // Persist the normalized form so a fresh install gets a template to edit.
    if let Err(e) = save_settings(&settings_path, &settings) {
        warn!(path = %settings_path.display(), error = %e, "could not write settings file");
    }

    let store = SqliteStore::new(settings.database_path())
        .context("opening transcript database")?;
    info!(db = %store.db_path().display(), "transcript store ready");

    let engine = CirrusEngine::new(
        settings.engine_config(),
        ModelHandle::new(StubTranscriber::new()),
    )
    .with_store(Arc::new(store));

    engine.warm_up().context("model warm-up")?;

    let mut transcripts = engine.subscribe_transcripts();
    let mut status_events = engine.subscribe_status();

    let sample_rate = engine
        .start_with_device(settings.preferred_input_device.as_deref())
        .context("starting audio capture")?;
    info!(sample_rate, "listening for broadcasts");

    let printer = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match transcripts.recv().await {
                Ok(ev) => {
                    info!(
                        utterance_id = %ev.utterance_id,
                        duration_secs = format_args!("{:.2}", ev.duration_secs),
                        "transcript"
                    );
                    println!("[{}] {}", ev.utterance_id, ev.text);
                }
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "transcript subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
    let status_logger = tokio::spawn(async move {
        use tokio::sync::broadcast::error::RecvError;
        loop {
            match status_events.recv().await {
                Ok(ev) => info!(status = ?ev.status, detail = ?ev.detail, "engine status"),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown signal received");

    engine.stop().context("stopping engine")?;
    let snap = engine.diagnostics();
    info!(
        utterances = snap.utterances_extracted,
        transcripts = snap.transcripts_emitted,
        inference_errors = snap.inference_errors,
        "session summary"
    );

    printer.abort();
    status_logger.abort();
    Ok(())
}
