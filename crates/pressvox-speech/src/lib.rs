//! Pressvox Speech crate - recognition backends and the submission coordinator.
//!
//! Provides a trait-based abstraction for speech-to-text backends, a
//! single-flight coordinator that turns drained capture bytes into recognized
//! text, and a mock backend for testing without loading a real model.

pub mod coordinator;
pub mod whisper_service;

pub use coordinator::{RecognitionCoordinator, RecognitionOutcome};
pub use whisper_service::WhisperRecognizer;

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pressvox_core::error::{PressvoxError, Result};

// =============================================================================
// Result types
// =============================================================================

/// A single time-aligned segment within a recognition result.
#[derive(Debug, Clone)]
pub struct Segment {
    /// Start time in seconds from the beginning of the audio.
    pub start: f32,
    /// End time in seconds from the beginning of the audio.
    pub end: f32,
    /// Recognized text for this segment.
    pub text: String,
    /// Backend confidence for this segment (0.0 to 1.0).
    pub confidence: f32,
}

// =============================================================================
// Trait
// =============================================================================

/// Backend that turns PCM samples into time-aligned text segments.
///
/// Backends defer model loading to `initialize` so that constructing a
/// recognizer never touches the filesystem.
pub trait SpeechRecognizer: Send + Sync {
    /// Prepare the backend for recognition (e.g. load a model from disk).
    ///
    /// Must be idempotent: a failed attempt may be retried on a later call.
    fn initialize(&self) -> impl Future<Output = Result<()>> + Send;

    /// Recognize speech in PCM audio.
    ///
    /// # Arguments
    /// * `samples` - PCM audio samples as f32 values in [-1.0, 1.0].
    /// * `sample_rate` - Sample rate of the audio data in Hz (e.g., 16000).
    ///
    /// # Returns
    /// Time-aligned segments in utterance order. May be empty when the
    /// backend found no speech in the audio.
    fn recognize(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> impl Future<Output = Result<Vec<Segment>>> + Send;
}

// =============================================================================
// Sample conversion
// =============================================================================

/// Decode little-endian 16-bit PCM bytes into f32 samples in [-1.0, 1.0].
///
/// A trailing odd byte is ignored.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock recognizer that returns scripted or dummy results.
///
/// Used for testing and development without loading a real model. With no
/// script queued it returns a fixed transcription covering the full audio
/// duration; tests can queue segment lists, inject one-shot failures, and
/// add artificial latency to hold a submission in flight.
#[derive(Debug, Clone, Default)]
pub struct MockRecognizer {
    script: Arc<Mutex<VecDeque<Vec<Segment>>>>,
    latency: Arc<Mutex<Option<Duration>>>,
    fail_next_init: Arc<AtomicBool>,
    fail_next_recognize: Arc<AtomicBool>,
    init_calls: Arc<AtomicUsize>,
    recognize_calls: Arc<AtomicUsize>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a segment list to be returned by the next unscripted call.
    pub fn push_segments(&self, segments: Vec<Segment>) {
        self.script
            .lock()
            .expect("script mutex poisoned")
            .push_back(segments);
    }

    /// Queue a single full-audio segment with the given text.
    pub fn push_text(&self, text: &str) {
        self.push_segments(vec![Segment {
            start: 0.0,
            end: 0.0,
            text: text.to_string(),
            confidence: 0.95,
        }]);
    }

    /// Make the next `initialize` call fail.
    pub fn fail_next_init(&self) {
        self.fail_next_init.store(true, Ordering::Relaxed);
    }

    /// Make the next `recognize` call fail.
    pub fn fail_next_recognize(&self) {
        self.fail_next_recognize.store(true, Ordering::Relaxed);
    }

    /// Sleep for `delay` inside every `recognize` call.
    pub fn set_latency(&self, delay: Duration) {
        *self.latency.lock().expect("latency mutex poisoned") = Some(delay);
    }

    /// Number of `initialize` calls observed.
    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::Relaxed)
    }

    /// Number of `recognize` calls observed.
    pub fn recognize_calls(&self) -> usize {
        self.recognize_calls.load(Ordering::Relaxed)
    }
}

impl SpeechRecognizer for MockRecognizer {
    async fn initialize(&self) -> Result<()> {
        self.init_calls.fetch_add(1, Ordering::Relaxed);

        if self.fail_next_init.swap(false, Ordering::Relaxed) {
            return Err(PressvoxError::Initialization(
                "Scripted initialization failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn recognize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<Segment>> {
        self.recognize_calls.fetch_add(1, Ordering::Relaxed);

        let latency = *self.latency.lock().expect("latency mutex poisoned");
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        if self.fail_next_recognize.swap(false, Ordering::Relaxed) {
            return Err(PressvoxError::Recognition(
                "Scripted recognition failure".to_string(),
            ));
        }

        if samples.is_empty() {
            return Err(PressvoxError::Recognition(
                "Cannot recognize empty audio".to_string(),
            ));
        }

        if sample_rate == 0 {
            return Err(PressvoxError::Recognition(
                "Sample rate must be greater than 0".to_string(),
            ));
        }

        if let Some(scripted) = self
            .script
            .lock()
            .expect("script mutex poisoned")
            .pop_front()
        {
            return Ok(scripted);
        }

        let duration_secs = samples.len() as f32 / sample_rate as f32;

        tracing::debug!(
            duration_secs = duration_secs,
            sample_rate = sample_rate,
            "Mock recognition generated"
        );

        Ok(vec![Segment {
            start: 0.0,
            end: duration_secs,
            text: "[mock recognition]".to_string(),
            confidence: 0.95,
        }])
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_recognition_basic() {
        let recognizer = MockRecognizer::new();
        let samples = vec![0.0f32; 16000]; // 1 second at 16kHz
        let segments = recognizer.recognize(&samples, 16000).await.unwrap();

        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "[mock recognition]");
        assert!((segments[0].start - 0.0).abs() < f32::EPSILON);
        assert!((segments[0].end - 1.0).abs() < 0.01);
        assert!((segments[0].confidence - 0.95).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_mock_recognition_empty_audio() {
        let recognizer = MockRecognizer::new();
        let result = recognizer.recognize(&[], 16000).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_recognition_zero_sample_rate() {
        let recognizer = MockRecognizer::new();
        let samples = vec![0.0f32; 100];
        let result = recognizer.recognize(&samples, 0).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_recognition_duration_calculation() {
        let recognizer = MockRecognizer::new();
        let samples = vec![0.0f32; 48000]; // 3 seconds at 16kHz
        let segments = recognizer.recognize(&samples, 16000).await.unwrap();
        assert!((segments[0].end - 3.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_mock_scripted_segments_pop_in_order() {
        let recognizer = MockRecognizer::new();
        recognizer.push_text("first");
        recognizer.push_text("second");

        let samples = vec![0.0f32; 1600];
        let segments = recognizer.recognize(&samples, 16000).await.unwrap();
        assert_eq!(segments[0].text, "first");

        let segments = recognizer.recognize(&samples, 16000).await.unwrap();
        assert_eq!(segments[0].text, "second");

        // Script exhausted, falls back to the fixed transcription.
        let segments = recognizer.recognize(&samples, 16000).await.unwrap();
        assert_eq!(segments[0].text, "[mock recognition]");
    }

    #[tokio::test]
    async fn test_mock_init_failure_is_one_shot() {
        let recognizer = MockRecognizer::new();
        recognizer.fail_next_init();

        let result = recognizer.initialize().await;
        assert!(matches!(result, Err(PressvoxError::Initialization(_))));

        recognizer.initialize().await.unwrap();
        assert_eq!(recognizer.init_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_recognize_failure_is_one_shot() {
        let recognizer = MockRecognizer::new();
        recognizer.fail_next_recognize();

        let samples = vec![0.0f32; 1600];
        let result = recognizer.recognize(&samples, 16000).await;
        assert!(matches!(result, Err(PressvoxError::Recognition(_))));

        recognizer.recognize(&samples, 16000).await.unwrap();
        assert_eq!(recognizer.recognize_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_call_counters() {
        let recognizer = MockRecognizer::new();
        assert_eq!(recognizer.init_calls(), 0);
        assert_eq!(recognizer.recognize_calls(), 0);

        recognizer.initialize().await.unwrap();
        let samples = vec![0.0f32; 1600];
        recognizer.recognize(&samples, 16000).await.unwrap();
        recognizer.recognize(&samples, 16000).await.unwrap();

        assert_eq!(recognizer.init_calls(), 1);
        assert_eq!(recognizer.recognize_calls(), 2);
    }

    #[test]
    fn test_pcm16le_to_f32_known_values() {
        let bytes = [0x00, 0x00, 0x00, 0x80, 0xFF, 0x7F];
        let samples = pcm16le_to_f32(&bytes);

        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 0.0).abs() < f32::EPSILON);
        assert!((samples[1] - (-1.0)).abs() < f32::EPSILON);
        assert!((samples[2] - 32767.0 / 32768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_pcm16le_to_f32_ignores_trailing_byte() {
        let bytes = [0x00, 0x00, 0x42];
        let samples = pcm16le_to_f32(&bytes);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn test_segment_creation() {
        let seg = Segment {
            start: 0.5,
            end: 2.3,
            text: "hello world".to_string(),
            confidence: 0.88,
        };
        assert!((seg.start - 0.5).abs() < f32::EPSILON);
        assert!((seg.end - 2.3).abs() < f32::EPSILON);
        assert_eq!(seg.text, "hello world");
    }
}
