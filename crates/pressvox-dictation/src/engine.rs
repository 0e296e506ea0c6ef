//! Dictation orchestrator.
//!
//! The orchestrator is the single consumer of the dictation event bus. The
//! press tracker publishes press lifecycle events into the bus; the
//! orchestrator reacts to qualifications by starting capture, to releases by
//! stopping capture and submitting the drained audio for recognition, and
//! hands recognized text to the injector. Errors from any stage are recovered
//! here and surfaced as status events rather than propagated.
//!
//! Capture state is owned exclusively by the event loop. Recognition and
//! injection run on spawned tasks so a slow model never stalls press
//! handling; their results re-enter the bus as events.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pressvox_core::config::{ConfigStore, InjectionConfig, PressvoxConfig};
use pressvox_core::error::{PressvoxError, Result};
use pressvox_core::events::DictationEvent;
use pressvox_core::types::{AudioFormat, InjectionMode, SessionId, Timestamp};

use pressvox_audio::AudioCaptureService;
use pressvox_speech::{RecognitionCoordinator, RecognitionOutcome, SpeechRecognizer};
use tokio::sync::{mpsc, Notify};

use crate::text_inject::TextInjector;
use crate::tracker::PressSessionTracker;

/// Configuration and identity captured when a session's capture starts.
///
/// Recognition and injection for the session use this snapshot even if the
/// live configuration changes mid-utterance.
#[derive(Debug, Clone)]
struct SessionContext {
    id: SessionId,
    config: PressvoxConfig,
}

/// Coordinates the press-to-talk pipeline end to end.
///
/// Constructed with the capture service, recognition backend, and text
/// injector; owns the event bus and the press tracker. `run` drives the
/// pipeline until shutdown.
pub struct DictationOrchestrator<A, R, I> {
    tracker: PressSessionTracker,
    capture: A,
    coordinator: Arc<RecognitionCoordinator<R>>,
    injector: Arc<I>,
    config: Arc<ConfigStore>,
    events_tx: mpsc::UnboundedSender<DictationEvent>,
    events_rx: mpsc::UnboundedReceiver<DictationEvent>,
    /// Optional tap that receives every event after the loop processes it.
    observer: Option<mpsc::UnboundedSender<DictationEvent>>,
    shutdown: Arc<Notify>,
    /// True between capture start and the matching release. Only the event
    /// loop writes this.
    recording: bool,
    /// True while a submission is in flight on a spawned task.
    recognizing: Arc<AtomicBool>,
    current: Option<SessionContext>,
}

impl<A, R, I> DictationOrchestrator<A, R, I>
where
    A: AudioCaptureService,
    R: SpeechRecognizer + 'static,
    I: TextInjector + 'static,
{
    /// Wire up the pipeline around a fresh event bus.
    ///
    /// The long-press threshold is read from the store once, at construction.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime (the press tracker spawns its
    /// timers onto the current runtime).
    pub fn new(capture: A, recognizer: R, injector: I, config: Arc<ConfigStore>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let long_press = Duration::from_millis(config.snapshot().press.long_press_ms);
        let tracker = PressSessionTracker::new(long_press, events_tx.clone());

        Self {
            tracker,
            capture,
            coordinator: Arc::new(RecognitionCoordinator::new(recognizer)),
            injector: Arc::new(injector),
            config,
            events_tx,
            events_rx,
            observer: None,
            shutdown: Arc::new(Notify::new()),
            recording: false,
            recognizing: Arc::new(AtomicBool::new(false)),
            current: None,
        }
    }

    /// Tap every processed event into `observer` as well.
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<DictationEvent>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The tracker pointer events should be fed into. Clones share state.
    pub fn tracker(&self) -> PressSessionTracker {
        self.tracker.clone()
    }

    /// Handle that stops `run` when notified.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Whether a submission is currently in flight.
    pub fn is_recognizing(&self) -> bool {
        self.recognizing.load(Ordering::SeqCst)
    }

    /// Drive the pipeline until the shutdown handle is notified.
    ///
    /// Consumes the orchestrator; obtain `tracker()` and `shutdown_handle()`
    /// before calling.
    pub async fn run(mut self) {
        tracing::info!("Dictation orchestrator running");
        let shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                maybe_event = self.events_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            tracing::info!("Event bus closed, orchestrator stopping");
                            break;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    tracing::info!("Orchestrator shutdown requested");
                    break;
                }
            }
        }

        // Release the audio backend if a press was still held at shutdown.
        if self.recording {
            if let Err(e) = self.capture.stop().await {
                tracing::warn!("Audio capture stop failed during shutdown: {}", e);
            }
        }
    }

    async fn handle_event(&mut self, event: DictationEvent) {
        match &event {
            DictationEvent::LongPressQualified { session_id, .. } => {
                self.begin_capture(*session_id).await;
            }
            DictationEvent::PressEnded { session_id, .. } => {
                self.finish_capture(*session_id).await;
            }
            _ => {}
        }
        self.forward(event);
    }

    /// Start capturing for a qualified session.
    ///
    /// The qualification may have sat in the queue while the button was
    /// released, so the session is re-checked against the tracker before any
    /// hardware is touched.
    async fn begin_capture(&mut self, session_id: SessionId) {
        if self.tracker.current_session_id() != Some(session_id) {
            tracing::debug!("Session {} no longer active, skipping capture", session_id);
            return;
        }
        if self.recording || self.capture.is_active() {
            tracing::warn!(
                "Capture already active, ignoring qualification for session {}",
                session_id
            );
            return;
        }
        if self.recognizing.load(Ordering::SeqCst) {
            // Capture may begin while the previous utterance is still being
            // transcribed; the submission gate arbitrates at submit time.
            tracing::warn!(
                "Recognition for a previous session still in flight at capture start"
            );
            self.emit(DictationEvent::StatusChanged {
                message: "Still transcribing the previous utterance".to_string(),
                timestamp: Timestamp::now(),
            });
        }

        let config = self.config.snapshot();
        let format = config.audio.format();

        match self.capture.start(format).await {
            Ok(()) => {
                self.recording = true;
                self.current = Some(SessionContext {
                    id: session_id,
                    config,
                });
                tracing::info!("Capture started for session {}", session_id);
                self.emit(DictationEvent::CaptureStarted {
                    session_id,
                    format,
                    timestamp: Timestamp::now(),
                });
            }
            Err(e) => {
                tracing::error!("Failed to start capture for session {}: {}", session_id, e);
                self.emit_status(format!("Could not start audio capture: {}", e));
            }
        }
    }

    /// Stop capturing for an ended press and submit whatever was recorded.
    async fn finish_capture(&mut self, session_id: SessionId) {
        if !self.recording {
            // Press never qualified, or capture failed to start.
            return;
        }
        self.recording = false;

        if let Err(e) = self.capture.stop().await {
            tracing::warn!("Audio capture stop failed: {}", e);
        }

        let frames = self.capture.buffer().frame_count();
        let audio = self.capture.buffer().drain_all();

        // Prefer the context stored at capture start; its id and config are
        // the ones this audio belongs to.
        let (session_id, config) = match self.current.take() {
            Some(ctx) => (ctx.id, ctx.config),
            None => (session_id, self.config.snapshot()),
        };
        let format = config.audio.format();

        tracing::info!(
            "Capture stopped for session {}: {} frames, {} bytes",
            session_id,
            frames,
            audio.len()
        );
        self.emit(DictationEvent::CaptureStopped {
            session_id,
            frames,
            bytes: audio.len(),
            timestamp: Timestamp::now(),
        });

        if audio.is_empty() {
            self.emit_status("No audio captured");
            return;
        }

        if config.app.save_audio {
            match write_wav_dump(&config.app.audio_dir, session_id, &audio, format) {
                Ok(path) => tracing::debug!("Saved capture audio to {}", path.display()),
                Err(e) => tracing::warn!("Failed to save capture audio: {}", e),
            }
        }

        self.spawn_recognition(session_id, audio, format, config);
    }

    /// Submit audio off the event loop. The outcome re-enters the bus.
    fn spawn_recognition(
        &self,
        session_id: SessionId,
        audio: Vec<u8>,
        format: AudioFormat,
        config: PressvoxConfig,
    ) {
        let coordinator = self.coordinator.clone();
        let injector = self.injector.clone();
        let events = self.events_tx.clone();
        let recognizing = self.recognizing.clone();

        recognizing.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            let outcome = coordinator.submit(&audio, format).await;
            recognizing.store(false, Ordering::SeqCst);

            match outcome {
                Ok(RecognitionOutcome::Text(text)) => {
                    let _ = events.send(DictationEvent::TextRecognized {
                        session_id,
                        text: text.clone(),
                        timestamp: Timestamp::now(),
                    });
                    deliver_text(injector, events, session_id, text, &config.injection).await;
                }
                Ok(RecognitionOutcome::NoSpeech) => {
                    tracing::info!("Session {}: no speech detected", session_id);
                    let _ = events.send(DictationEvent::StatusChanged {
                        message: "No speech detected".to_string(),
                        timestamp: Timestamp::now(),
                    });
                }
                Err(e) => {
                    tracing::warn!("Recognition failed for session {}: {}", session_id, e);
                    let _ = events.send(DictationEvent::RecognitionFailed {
                        session_id,
                        reason: e.to_string(),
                        timestamp: Timestamp::now(),
                    });
                }
            }
        });
    }

    fn forward(&self, event: DictationEvent) {
        tracing::debug!("Event: {}", event.event_name());
        if let Some(observer) = &self.observer {
            let _ = observer.send(event);
        }
    }

    fn emit(&self, event: DictationEvent) {
        if self.events_tx.send(event).is_err() {
            tracing::warn!("Event bus closed, dropping event");
        }
    }

    fn emit_status(&self, message: impl Into<String>) {
        let message = message.into();
        if self.config.snapshot().app.show_notifications {
            tracing::info!("Status: {}", message);
        } else {
            tracing::debug!("Status: {}", message);
        }
        self.emit(DictationEvent::StatusChanged {
            message,
            timestamp: Timestamp::now(),
        });
    }
}

/// Deliver recognized text on the blocking pool and report the outcome.
///
/// Injection paces keystrokes and waits on clipboard settling, so it must not
/// run on the async workers.
async fn deliver_text<I>(
    injector: Arc<I>,
    events: mpsc::UnboundedSender<DictationEvent>,
    session_id: SessionId,
    text: String,
    injection: &InjectionConfig,
) where
    I: TextInjector + 'static,
{
    let mode = injection.mode;
    let typing_delay_ms = injection.typing_delay_ms;
    let restore_delay_ms = injection.clipboard_restore_delay_ms;
    let chars = text.chars().count();

    let result = tokio::task::spawn_blocking(move || match mode {
        InjectionMode::Type => injector.type_text(&text, typing_delay_ms),
        InjectionMode::Clipboard => injector.insert_via_clipboard(&text, restore_delay_ms),
    })
    .await;

    match result {
        Ok(Ok(())) => {
            tracing::info!(
                "Injected {} characters into the focused application ({})",
                chars,
                mode
            );
            let _ = events.send(DictationEvent::TextInjected {
                session_id,
                mode,
                chars,
                timestamp: Timestamp::now(),
            });
        }
        Ok(Err(e)) => {
            tracing::warn!("Injection failed for session {}: {}", session_id, e);
            let _ = events.send(DictationEvent::InjectionFailed {
                session_id,
                reason: e.to_string(),
                timestamp: Timestamp::now(),
            });
        }
        Err(e) => {
            let _ = events.send(DictationEvent::InjectionFailed {
                session_id,
                reason: format!("Injection task failed: {}", e),
                timestamp: Timestamp::now(),
            });
        }
    }
}

/// Write one captured utterance to `<dir>/<utc>-<session>.wav`.
fn write_wav_dump(
    dir: &str,
    session_id: SessionId,
    audio: &[u8],
    format: AudioFormat,
) -> Result<PathBuf> {
    let dir = expand_home(dir);
    std::fs::create_dir_all(&dir)?;

    let filename = format!(
        "{}-{}.wav",
        chrono::Utc::now().format("%Y%m%d-%H%M%S"),
        session_id
    );
    let path = dir.join(filename);

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: format.bits_per_sample,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)
        .map_err(|e| PressvoxError::Audio(format!("Failed to create WAV file: {}", e)))?;
    for sample in audio.chunks_exact(2) {
        let value = i16::from_le_bytes([sample[0], sample[1]]);
        writer
            .write_sample(value)
            .map_err(|e| PressvoxError::Audio(format!("Failed to write WAV sample: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| PressvoxError::Audio(format!("Failed to finalize WAV file: {}", e)))?;
    Ok(path)
}

/// Expand a leading `~/` using USERPROFILE or HOME.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("USERPROFILE").or_else(|_| std::env::var("HOME"));
        if let Ok(home) = home {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
