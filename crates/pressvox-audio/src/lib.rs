//! Pressvox Audio crate - bounded press-interval capture and the cpal backend.
//!
//! The capture path is split in two: `CaptureBuffer` owns the bounded frame
//! queue the orchestrator drains, and an `AudioCaptureService` implementation
//! owns the OS stream feeding it. A mock service stands in for hardware in
//! tests.

pub mod buffer;
pub mod windows_audio;

pub use buffer::{AudioFrame, CaptureBuffer};
pub use windows_audio::{downmix_to_mono, pcm16le_from_f32, resample_linear, WindowsAudioService};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pressvox_core::error::{PressvoxError, Result};
use pressvox_core::types::AudioFormat;

// =============================================================================
// Traits
// =============================================================================

/// Service gating audio capture to one press session.
///
/// Implementations open the capture backend on `start`, deliver frames into
/// their `CaptureBuffer` from the backend's callback thread, and tear the
/// backend down on `stop`.
pub trait AudioCaptureService: Send + Sync {
    /// Begin capturing in the given format.
    ///
    /// Fails with `AlreadyRecording` if a capture is already in progress.
    fn start(&self, format: AudioFormat) -> impl Future<Output = Result<()>> + Send;

    /// Stop the current capture session. Idempotent.
    fn stop(&self) -> impl Future<Output = Result<()>> + Send;

    /// Whether capture is currently active.
    fn is_active(&self) -> bool;

    /// The frame queue this service delivers into.
    fn buffer(&self) -> &CaptureBuffer;
}

// =============================================================================
// Mock implementation
// =============================================================================

/// Mock audio capture service for testing.
///
/// Frames are supplied by the test through `buffer().push_frame(..)`; the
/// mock only manages the active flag and can be scripted to fail its next
/// start.
#[derive(Debug, Clone)]
pub struct MockAudioService {
    buffer: CaptureBuffer,
    fail_next_start: Arc<AtomicBool>,
}

impl Default for MockAudioService {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MockAudioService {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: CaptureBuffer::new(capacity),
            fail_next_start: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next `start` call fail with an audio error.
    pub fn fail_next_start(&self) {
        self.fail_next_start.store(true, Ordering::Relaxed);
    }
}

impl AudioCaptureService for MockAudioService {
    async fn start(&self, format: AudioFormat) -> Result<()> {
        if self.fail_next_start.swap(false, Ordering::Relaxed) {
            return Err(PressvoxError::Audio("mock device unavailable".to_string()));
        }
        self.buffer.start(format)?;
        tracing::info!("Mock audio capture started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.buffer.stop();
        tracing::info!("Mock audio capture stopped");
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.buffer.is_active()
    }

    fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }
}

// =============================================================================
// Tests
// =============================================================================
