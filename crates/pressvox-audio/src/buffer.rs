//! Bounded frame queue shared between the capture callback thread and the
//! orchestrator.
//!
//! The capture backend pushes raw PCM frames from its own callback thread;
//! the orchestrator drains the accumulated audio once the session ends. A
//! single mutex guards the queue. The push path holds the lock only for the
//! append and eviction, never for I/O.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use pressvox_core::error::{PressvoxError, Result};
use pressvox_core::types::AudioFormat;

/// One chunk of raw little-endian PCM handed over by the capture backend.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<u8>,
    pub captured_at: Instant,
}

impl AudioFrame {
    pub fn new(samples: Vec<u8>) -> Self {
        Self {
            samples,
            captured_at: Instant::now(),
        }
    }
}

/// Thread-safe bounded frame queue with drop-oldest eviction.
///
/// Holds at most `capacity` frames. When a push would exceed capacity the
/// oldest frame is evicted, so a press held past the buffer window keeps the
/// most recent audio. Frames pushed while no capture is active are discarded.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    frames: Arc<Mutex<VecDeque<AudioFrame>>>,
    format: Arc<Mutex<Option<AudioFormat>>>,
    active: Arc<AtomicBool>,
    capacity: usize,
}

impl CaptureBuffer {
    /// Create a buffer holding at most `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            format: Arc::new(Mutex::new(None)),
            active: Arc::new(AtomicBool::new(false)),
            capacity,
        }
    }

    /// Mark the buffer active for a new session and clear stale frames.
    ///
    /// Fails with `AlreadyRecording` if a capture is already in progress so
    /// a second start cannot corrupt the frames of the first.
    pub fn start(&self, format: AudioFormat) -> Result<()> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PressvoxError::AlreadyRecording);
        }

        if let Ok(mut frames) = self.frames.lock() {
            frames.clear();
        }
        if let Ok(mut fmt) = self.format.lock() {
            *fmt = Some(format);
        }

        tracing::debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            bits = format.bits_per_sample,
            "Capture buffer started"
        );
        Ok(())
    }

    /// Append a frame from the capture backend's callback thread.
    ///
    /// Never blocks beyond the lock hold and never panics; the callback
    /// frameworks that call this may unregister a faulting callback.
    pub fn push_frame(&self, frame: AudioFrame) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }

        let mut evicted = 0usize;
        if let Ok(mut frames) = self.frames.lock() {
            frames.push_back(frame);
            while frames.len() > self.capacity {
                frames.pop_front();
                evicted += 1;
            }
        }

        // Logged after the lock is released.
        if evicted > 0 {
            tracing::trace!(evicted, capacity = self.capacity, "Capture queue full, dropped oldest");
        }
    }

    /// Stop the current capture. Idempotent; safe with no active capture.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::debug!(frames = self.frame_count(), "Capture buffer stopped");
        }
    }

    /// Concatenate and remove all buffered frames in FIFO order.
    ///
    /// Returns an empty buffer if nothing was captured, and empty again on a
    /// second call. Callers must `stop()` first; draining while frames are
    /// still arriving yields a partial snapshot.
    pub fn drain_all(&self) -> Vec<u8> {
        let drained = match self.frames.lock() {
            Ok(mut frames) => std::mem::take(&mut *frames),
            Err(_) => VecDeque::new(),
        };

        // Concatenation happens after the lock is released.
        let total: usize = drained.iter().map(|f| f.samples.len()).sum();
        let mut out = Vec::with_capacity(total);
        for frame in drained {
            out.extend_from_slice(&frame.samples);
        }
        out
    }

    /// Whether a capture session is in progress.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    /// Number of frames currently queued.
    pub fn frame_count(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// The format of the current (or most recent) session.
    pub fn format(&self) -> Option<AudioFormat> {
        self.format.lock().ok().and_then(|f| *f)
    }
}
