//! Whisper-backed recognizer via whisper-rs (whisper.cpp bindings).
//!
//! When compiled with the `whisper` feature, lazily loads a GGML model file
//! and runs speech-to-text inference on raw PCM audio. Without the feature,
//! initialization fails so the rest of the pipeline stays exercisable.

#[cfg(feature = "whisper")]
use std::path::Path;
#[cfg(feature = "whisper")]
use std::sync::Mutex;

use pressvox_core::config::RecognitionConfig;
use pressvox_core::error::{PressvoxError, Result};

use crate::{Segment, SpeechRecognizer};

/// Recognizer backed by whisper.cpp.
///
/// The model context is loaded by `initialize` and reused across recognition
/// calls. Construction never touches the filesystem.
pub struct WhisperRecognizer {
    config: RecognitionConfig,
    #[cfg(feature = "whisper")]
    ctx: Mutex<Option<whisper_rs::WhisperContext>>,
}

impl WhisperRecognizer {
    pub fn new(config: RecognitionConfig) -> Self {
        #[cfg(not(feature = "whisper"))]
        tracing::warn!("WhisperRecognizer built without the `whisper` feature, recognition will fail");

        Self {
            config,
            #[cfg(feature = "whisper")]
            ctx: Mutex::new(None),
        }
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &RecognitionConfig {
        &self.config
    }
}

// ---------------------------------------------------------------------------
// Real implementation (whisper feature enabled)
// ---------------------------------------------------------------------------

#[cfg(feature = "whisper")]
impl SpeechRecognizer for WhisperRecognizer {
    async fn initialize(&self) -> Result<()> {
        use whisper_rs::{WhisperContext, WhisperContextParameters};

        let mut ctx = self.ctx.lock().map_err(|e| {
            PressvoxError::Initialization(format!("Whisper context mutex poisoned: {}", e))
        })?;
        if ctx.is_some() {
            return Ok(());
        }

        let model_path = &self.config.model_path;
        if !Path::new(model_path).exists() {
            return Err(PressvoxError::Initialization(format!(
                "Whisper model file not found: {}",
                model_path
            )));
        }

        tracing::info!(model = %model_path, lang = %self.config.language, "Loading Whisper model");

        let params = WhisperContextParameters::default();
        let loaded = WhisperContext::new_with_params(model_path, params).map_err(|e| {
            PressvoxError::Initialization(format!("Failed to load Whisper model: {}", e))
        })?;

        tracing::info!("Whisper model loaded successfully");
        *ctx = Some(loaded);
        Ok(())
    }

    async fn recognize(&self, samples: &[f32], sample_rate: u32) -> Result<Vec<Segment>> {
        use whisper_rs::{FullParams, SamplingStrategy};

        if samples.is_empty() {
            return Err(PressvoxError::Recognition(
                "Cannot recognize empty audio".into(),
            ));
        }

        if sample_rate == 0 {
            return Err(PressvoxError::Recognition(
                "Sample rate must be greater than 0".into(),
            ));
        }

        // Whisper expects 16 kHz mono PCM. Resample if needed.
        let samples_16k = if sample_rate != 16000 {
            resample(samples, sample_rate, 16000)
        } else {
            samples.to_vec()
        };

        let duration_secs = samples_16k.len() as f32 / 16000.0;
        tracing::debug!(
            samples = samples_16k.len(),
            duration_secs,
            "Starting Whisper inference"
        );

        let ctx = self.ctx.lock().map_err(|e| {
            PressvoxError::Recognition(format!("Whisper context mutex poisoned: {}", e))
        })?;
        let ctx = ctx.as_ref().ok_or_else(|| {
            PressvoxError::Initialization("Whisper model not initialized".to_string())
        })?;

        // Run inference (synchronous, whisper.cpp is CPU-bound).
        let mut state = ctx.create_state().map_err(|e| {
            PressvoxError::Recognition(format!("Failed to create Whisper state: {}", e))
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });

        // Set language (None = auto-detect).
        let lang = if self.config.language == "auto" {
            None
        } else {
            Some(self.config.language.as_str())
        };
        params.set_language(lang);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_single_segment(false);

        state
            .full(params, &samples_16k)
            .map_err(|e| PressvoxError::Recognition(format!("Whisper inference failed: {}", e)))?;

        let n_segments = state.full_n_segments().map_err(|e| {
            PressvoxError::Recognition(format!("Failed to get segment count: {}", e))
        })?;

        let mut segments = Vec::with_capacity(n_segments as usize);

        for i in 0..n_segments {
            let text = state.full_get_segment_text(i).map_err(|e| {
                PressvoxError::Recognition(format!("Failed to get segment {} text: {}", i, e))
            })?;

            // Timestamps are in centiseconds (1/100 s).
            let t0 = state.full_get_segment_t0(i).map_err(|e| {
                PressvoxError::Recognition(format!("Failed to get segment {} t0: {}", i, e))
            })?;
            let t1 = state.full_get_segment_t1(i).map_err(|e| {
                PressvoxError::Recognition(format!("Failed to get segment {} t1: {}", i, e))
            })?;

            let confidence = segment_confidence(&state, i);
            if confidence < self.config.confidence_threshold {
                tracing::debug!(
                    segment = i,
                    confidence,
                    threshold = self.config.confidence_threshold,
                    "Dropping low-confidence segment"
                );
                continue;
            }

            segments.push(Segment {
                start: t0 as f32 / 100.0,
                end: t1 as f32 / 100.0,
                text: text.trim().to_string(),
                confidence,
            });
        }

        tracing::info!(segments = segments.len(), "Whisper inference complete");
        Ok(segments)
    }
}

// ---------------------------------------------------------------------------
// Stub implementation (whisper feature disabled)
// ---------------------------------------------------------------------------

#[cfg(not(feature = "whisper"))]
impl SpeechRecognizer for WhisperRecognizer {
    async fn initialize(&self) -> Result<()> {
        Err(PressvoxError::Initialization(
            "Speech recognition requires the `whisper` feature to be enabled".into(),
        ))
    }

    async fn recognize(&self, _samples: &[f32], _sample_rate: u32) -> Result<Vec<Segment>> {
        Err(PressvoxError::Initialization(
            "Speech recognition requires the `whisper` feature to be enabled".into(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Mean token probability for a segment, used as its confidence.
///
/// Falls back to 1.0 when token probabilities are unavailable so the
/// confidence filter never drops a segment on a probe failure.
#[cfg(feature = "whisper")]
fn segment_confidence(state: &whisper_rs::WhisperState, segment: i32) -> f32 {
    let n_tokens = match state.full_n_tokens(segment) {
        Ok(n) if n > 0 => n,
        _ => return 1.0,
    };

    let mut total = 0.0f32;
    for token in 0..n_tokens {
        match state.full_get_token_prob(segment, token) {
            Ok(p) => total += p,
            Err(_) => return 1.0,
        }
    }
    total / n_tokens as f32
}

/// Simple linear resampling from one sample rate to another.
///
/// For production use, a polyphase or sinc resampler would be better, but
/// linear interpolation is sufficient for Whisper input which is already
/// low-frequency speech.
#[cfg(feature = "whisper")]
fn resample(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || input.is_empty() {
        return input.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (input.len() as f64 / ratio).ceil() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let idx1 = (idx0 + 1).min(input.len() - 1);
        let frac = (src_idx - idx0 as f64) as f32;

        let sample = input[idx0] * (1.0 - frac) + input[idx1] * frac;
        output.push(sample);
    }

    output
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
