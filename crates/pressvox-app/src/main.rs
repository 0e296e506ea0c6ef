//! Pressvox application binary - composition root.
//!
//! Ties together the Pressvox crates into a single executable:
//! 1. Load configuration from TOML
//! 2. Build the capture service, recognition backend, and text injector
//! 3. Wire the dictation orchestrator around the event bus
//! 4. Install the global pointer hook and pump its events into the tracker
//! 5. Run until Ctrl+C
//!
//! On Windows this gives hold-to-dictate for the whole desktop: hold the
//! left mouse button past the configured threshold, speak, release, and the
//! recognized text lands in the focused application.

use std::sync::Arc;

use clap::Parser;

use pressvox_audio::WindowsAudioService;
use pressvox_core::config::ConfigStore;
use pressvox_dictation::{DictationOrchestrator, PointerListener, SystemTextInjector};
use pressvox_speech::WhisperRecognizer;

mod cli;
use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Tracing. RUST_LOG wins; the --log-level flag sets the fallback.
    let fallback_filter = args
        .resolve_log_level()
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback_filter)),
        )
        .init();

    tracing::info!("Starting Pressvox v{}", env!("CARGO_PKG_VERSION"));

    // Config.
    let config_file = args.resolve_config_path();
    let store = Arc::new(ConfigStore::open(config_file.clone()));
    if let Some(model) = args.model {
        store.update(|c| c.recognition.model_path = model.to_string_lossy().into_owned())?;
    }
    let config = store.snapshot();
    tracing::info!(
        "Configuration from {}: long press {} ms, {} injection, model {}",
        config_file.display(),
        config.press.long_press_ms,
        config.injection.mode,
        config.recognition.model_path
    );

    // Pipeline components.
    let capture = WindowsAudioService::new(&config.audio);
    let recognizer = WhisperRecognizer::new(config.recognition.clone());
    let injector = SystemTextInjector::new();

    let engine = DictationOrchestrator::new(capture, recognizer, injector, Arc::clone(&store));
    let tracker = engine.tracker();
    let shutdown = engine.shutdown_handle();
    tokio::spawn(engine.run());

    // Global pointer hook. Its callback only enqueues; the pump task below
    // feeds the tracker from inside the runtime.
    let (pointer_tx, mut pointer_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut listener = PointerListener::new();
    if let Err(e) = listener.start(pointer_tx) {
        // Expected off Windows; the orchestrator still runs so the pipeline
        // can be exercised through other frontends.
        tracing::warn!("Pointer hook unavailable: {}", e);
    }

    let pump_tracker = tracker.clone();
    tokio::spawn(async move {
        while let Some(event) = pointer_rx.recv().await {
            pump_tracker.on_pointer_event(event);
        }
        tracing::debug!("Pointer event channel closed");
    });

    tracing::info!(
        "Hold the left mouse button for {} ms to dictate; release to insert the text",
        config.press.long_press_ms
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Ctrl+C received, shutting down");

    listener.stop();
    shutdown.notify_one();
    // Let the orchestrator release the audio backend before the process exits.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    Ok(())
}
