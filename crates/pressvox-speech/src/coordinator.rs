//! Recognition submission coordinator.
//!
//! Sits between the dictation engine and the recognition backend: converts
//! drained capture bytes into samples, enforces single-flight submission,
//! initializes the backend lazily, and folds the backend's segments into a
//! single outcome.

use std::sync::atomic::{AtomicBool, Ordering};

use pressvox_core::error::{PressvoxError, Result};
use pressvox_core::types::AudioFormat;

use crate::{pcm16le_to_f32, Segment, SpeechRecognizer};

/// What a completed submission produced.
///
/// "No speech" is an ordinary outcome of a successful submission, not an
/// error: the pipeline ran but the audio contained nothing worth injecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    /// Recognized text, non-empty and already trimmed.
    Text(String),
    /// The backend ran but produced no usable text.
    NoSpeech,
}

/// Clears the in-flight flag when dropped, including when the submission
/// future is cancelled.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Coordinates submissions from capture to a recognition backend.
///
/// At most one submission is in flight at a time; a second concurrent
/// `submit` fails with `PressvoxError::Busy` rather than queueing. The
/// backend is initialized on the first submission that reaches it, and a
/// failed initialization is retried on the next submission.
pub struct RecognitionCoordinator<R> {
    recognizer: R,
    in_flight: AtomicBool,
    initialized: tokio::sync::Mutex<bool>,
}

impl<R: SpeechRecognizer> RecognitionCoordinator<R> {
    pub fn new(recognizer: R) -> Self {
        Self {
            recognizer,
            in_flight: AtomicBool::new(false),
            initialized: tokio::sync::Mutex::new(false),
        }
    }

    /// Whether a submission is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Submit captured PCM bytes for recognition.
    ///
    /// Empty audio resolves to `NoSpeech` without contacting the backend.
    /// Fails with `Busy` if another submission is already in flight, and
    /// with `Initialization` if the backend cannot be brought up; the next
    /// submission retries initialization.
    pub async fn submit(&self, audio: &[u8], format: AudioFormat) -> Result<RecognitionOutcome> {
        if audio.is_empty() {
            tracing::debug!("Skipping recognition for empty audio");
            return Ok(RecognitionOutcome::NoSpeech);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PressvoxError::Busy);
        }
        let _guard = InFlightGuard(&self.in_flight);

        self.ensure_initialized().await?;

        let samples = pcm16le_to_f32(audio);
        tracing::debug!(
            bytes = audio.len(),
            duration_secs = format.duration_secs(audio.len()),
            "Submitting audio for recognition"
        );

        let segments = self
            .recognizer
            .recognize(&samples, format.sample_rate)
            .await?;

        let text = join_segments(&segments);
        if text.is_empty() {
            tracing::debug!(segments = segments.len(), "Recognition produced no speech");
            return Ok(RecognitionOutcome::NoSpeech);
        }

        tracing::info!(chars = text.len(), "Recognition complete");
        Ok(RecognitionOutcome::Text(text))
    }

    /// Initialize the backend once; a failure leaves it uninitialized so the
    /// next submission can retry.
    async fn ensure_initialized(&self) -> Result<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }

        self.recognizer.initialize().await?;
        *initialized = true;
        tracing::info!("Recognition backend initialized");
        Ok(())
    }
}

/// Concatenate segment texts in arrival order, separated by single spaces.
/// Blank segments are skipped.
fn join_segments(segments: &[Segment]) -> String {
    let mut text = String::new();
    for segment in segments {
        let trimmed = segment.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(trimmed);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockRecognizer;
    use std::sync::Arc;
    use std::time::Duration;

    fn segment(text: &str) -> Segment {
        Segment {
            start: 0.0,
            end: 0.0,
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    fn audio_bytes(len: usize) -> Vec<u8> {
        vec![0u8; len]
    }

    #[tokio::test]
    async fn test_empty_audio_resolves_without_backend() {
        let recognizer = MockRecognizer::new();
        let coordinator = RecognitionCoordinator::new(recognizer.clone());

        let outcome = coordinator
            .submit(&[], AudioFormat::default())
            .await
            .unwrap();

        assert_eq!(outcome, RecognitionOutcome::NoSpeech);
        assert_eq!(recognizer.init_calls(), 0);
        assert_eq!(recognizer.recognize_calls(), 0);
    }

    #[tokio::test]
    async fn test_submission_yields_text() {
        let recognizer = MockRecognizer::new();
        recognizer.push_text("hello");
        let coordinator = RecognitionCoordinator::new(recognizer);

        let outcome = coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await
            .unwrap();

        assert_eq!(outcome, RecognitionOutcome::Text("hello".to_string()));
    }

    #[tokio::test]
    async fn test_segments_joined_in_arrival_order() {
        let recognizer = MockRecognizer::new();
        recognizer.push_segments(vec![segment("press"), segment("to"), segment("talk")]);
        let coordinator = RecognitionCoordinator::new(recognizer);

        let outcome = coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await
            .unwrap();

        assert_eq!(
            outcome,
            RecognitionOutcome::Text("press to talk".to_string())
        );
    }

    #[tokio::test]
    async fn test_blank_segments_are_skipped() {
        let recognizer = MockRecognizer::new();
        recognizer.push_segments(vec![segment("  hello  "), segment("   "), segment("world")]);
        let coordinator = RecognitionCoordinator::new(recognizer);

        let outcome = coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await
            .unwrap();

        assert_eq!(outcome, RecognitionOutcome::Text("hello world".to_string()));
    }

    #[tokio::test]
    async fn test_all_blank_segments_resolve_to_no_speech() {
        let recognizer = MockRecognizer::new();
        recognizer.push_segments(vec![segment("   "), segment("")]);
        let coordinator = RecognitionCoordinator::new(recognizer);

        let outcome = coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await
            .unwrap();

        assert_eq!(outcome, RecognitionOutcome::NoSpeech);
    }

    #[tokio::test]
    async fn test_backend_initialized_once() {
        let recognizer = MockRecognizer::new();
        let coordinator = RecognitionCoordinator::new(recognizer.clone());

        coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await
            .unwrap();
        coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await
            .unwrap();

        assert_eq!(recognizer.init_calls(), 1);
        assert_eq!(recognizer.recognize_calls(), 2);
    }

    #[tokio::test]
    async fn test_initialization_failure_retried_next_submission() {
        let recognizer = MockRecognizer::new();
        recognizer.fail_next_init();
        let coordinator = RecognitionCoordinator::new(recognizer.clone());

        let result = coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await;
        assert!(matches!(result, Err(PressvoxError::Initialization(_))));
        assert!(!coordinator.is_busy());

        let outcome = coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await
            .unwrap();
        assert!(matches!(outcome, RecognitionOutcome::Text(_)));
        assert_eq!(recognizer.init_calls(), 2);
    }

    #[tokio::test]
    async fn test_recognition_failure_releases_flight() {
        let recognizer = MockRecognizer::new();
        recognizer.fail_next_recognize();
        let coordinator = RecognitionCoordinator::new(recognizer);

        let result = coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await;
        assert!(matches!(result, Err(PressvoxError::Recognition(_))));
        assert!(!coordinator.is_busy());

        coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_submission_is_busy() {
        let recognizer = MockRecognizer::new();
        recognizer.set_latency(Duration::from_millis(100));
        let coordinator = Arc::new(RecognitionCoordinator::new(recognizer));

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .submit(&audio_bytes(3200), AudioFormat::default())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(coordinator.is_busy());

        let second = coordinator
            .submit(&audio_bytes(3200), AudioFormat::default())
            .await;
        assert!(matches!(second, Err(PressvoxError::Busy)));

        let outcome = first.await.unwrap().unwrap();
        assert!(matches!(outcome, RecognitionOutcome::Text(_)));
        assert!(!coordinator.is_busy());
    }

    #[test]
    fn test_join_segments_empty_input() {
        assert_eq!(join_segments(&[]), "");
    }
}
