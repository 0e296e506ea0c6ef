//! Microphone capture via cpal + WASAPI.
//!
//! On Windows, opens the configured input device and delivers raw PCM16LE
//! frames of roughly `frame_ms` duration into the shared `CaptureBuffer`.
//! The cpal callback downmixes to mono and resamples to the requested rate
//! before converting to 16-bit samples.
//!
//! On non-Windows platforms, `start` returns `PressvoxError::Audio`.

#[cfg(not(target_os = "windows"))]
use tracing::warn;

#[cfg(target_os = "windows")]
use std::sync::Mutex;

use pressvox_core::config::AudioConfig;
use pressvox_core::error::{PressvoxError, Result};
use pressvox_core::types::AudioFormat;

use crate::buffer::CaptureBuffer;
#[cfg(target_os = "windows")]
use crate::buffer::AudioFrame;
use crate::AudioCaptureService;

/// Wrapper to make `cpal::Stream` usable inside `Mutex` on Windows.
///
/// `cpal::Stream` on Windows contains a `*mut ()` marker that prevents auto
/// `Send`/`Sync`. The stream itself is safe to share via a `Mutex` because
/// we only ever drop it (to stop capture) or store it (to keep it alive).
#[cfg(target_os = "windows")]
struct SendStream(#[allow(dead_code)] cpal::Stream);

// SAFETY: SendStream wraps a cpal::Stream which manages its own audio thread.
// 1. The Stream handle is only used to start/stop capture, not to share data
// 2. Audio callbacks run on a separate OS thread managed by cpal
// 3. No mutable shared state between the Stream handle and callbacks
// 4. This is Windows-only; cpal's WASAPI backend is documented as thread-safe
#[cfg(target_os = "windows")]
unsafe impl Send for SendStream {}
#[cfg(target_os = "windows")]
unsafe impl Sync for SendStream {}

/// Windows microphone capture service using cpal (WASAPI backend).
///
/// Gated to one press session at a time through the shared `CaptureBuffer`;
/// the orchestrator drains the buffer after `stop`.
pub struct WindowsAudioService {
    device_name: String,
    #[allow(dead_code)] // Used in Windows impl; non-Windows stub ignores it.
    frame_ms: u64,
    buffer: CaptureBuffer,
    /// The cpal stream is stored here while active. Dropping it stops capture.
    #[cfg(target_os = "windows")]
    stream: Mutex<Option<SendStream>>,
}

impl WindowsAudioService {
    /// Create a capture service from the audio configuration section.
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            device_name: config.device_name.clone(),
            frame_ms: config.frame_ms,
            buffer: CaptureBuffer::new(config.queue_capacity),
            #[cfg(target_os = "windows")]
            stream: Mutex::new(None),
        }
    }

    /// The configured input device name.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The backend supports mono 16-bit PCM only; reject anything else
    /// before touching the device.
    fn check_format(format: AudioFormat) -> Result<()> {
        if format.bits_per_sample != 16 {
            return Err(PressvoxError::Audio(format!(
                "Unsupported bit depth {} (only 16-bit PCM)",
                format.bits_per_sample
            )));
        }
        if format.channels != 1 {
            return Err(PressvoxError::Audio(format!(
                "Unsupported channel count {} (capture is mono)",
                format.channels
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Sample conversion helpers (pure math, shared with tests on all platforms)
// =============================================================================

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resample from `from_rate` to `to_rate`.
pub fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (samples.len() as f64 / ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = i as f64 * ratio;
        let idx0 = src.floor() as usize;
        let idx1 = (idx0 + 1).min(samples.len().saturating_sub(1));
        let frac = (src - idx0 as f64) as f32;
        out.push(samples[idx0] * (1.0 - frac) + samples[idx1] * frac);
    }
    out
}

/// Convert f32 samples in [-1.0, 1.0] to raw little-endian 16-bit PCM.
pub fn pcm16le_from_f32(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

// =============================================================================
// Windows implementation
// =============================================================================

#[cfg(target_os = "windows")]
impl AudioCaptureService for WindowsAudioService {
    async fn start(&self, format: AudioFormat) -> Result<()> {
        use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
        use tracing::{debug, info};

        Self::check_format(format)?;
        // AlreadyRecording gate; rolled back with stop() on any later error.
        self.buffer.start(format)?;

        let host = cpal::default_host();

        let device = if self.device_name == "default" {
            match host.default_input_device() {
                Some(d) => d,
                None => {
                    self.buffer.stop();
                    return Err(PressvoxError::Audio("No default input device found".into()));
                }
            }
        } else {
            let name_lower = self.device_name.to_lowercase();
            let found = host
                .input_devices()
                .map_err(|e| PressvoxError::Audio(format!("Failed to enumerate devices: {}", e)))
                .map(|mut devices| {
                    devices.find(|d| {
                        d.name()
                            .map(|n| n.to_lowercase().contains(&name_lower))
                            .unwrap_or(false)
                    })
                });
            match found {
                Ok(Some(d)) => d,
                Ok(None) => {
                    self.buffer.stop();
                    return Err(PressvoxError::Audio(format!(
                        "Audio device '{}' not found",
                        self.device_name
                    )));
                }
                Err(e) => {
                    self.buffer.stop();
                    return Err(e);
                }
            }
        };

        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        debug!(device = %device_name, "Selected audio device");

        // Capture with the device's preferred config; many devices reject
        // arbitrary rates. The callback converts to the requested format.
        let stream_config = match device.default_input_config() {
            Ok(supported) => cpal::StreamConfig {
                channels: supported.channels(),
                sample_rate: supported.sample_rate(),
                buffer_size: cpal::BufferSize::Default,
            },
            Err(e) => {
                debug!(error = %e, "Could not query default config, using requested format");
                cpal::StreamConfig {
                    channels: format.channels,
                    sample_rate: cpal::SampleRate(format.sample_rate),
                    buffer_size: cpal::BufferSize::Default,
                }
            }
        };

        let device_rate = stream_config.sample_rate.0;
        let device_channels = stream_config.channels as usize;
        let target_rate = format.sample_rate;

        if device_rate != target_rate || device_channels != 1 {
            info!(
                device_rate,
                device_channels, target_rate, "Audio callback will downmix/resample"
            );
        }

        let buffer = self.buffer.clone();
        let error_buffer = self.buffer.clone();
        let bytes_per_frame =
            ((format.bytes_per_second() as u64 * self.frame_ms) / 1000).max(2) as usize;

        // Accumulates converted bytes until a full frame is ready to enqueue.
        let mut pending: Vec<u8> = Vec::with_capacity(bytes_per_frame * 2);

        let stream = device
            .build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix_to_mono(data, device_channels);
                    let resampled = resample_linear(&mono, device_rate, target_rate);
                    pending.extend_from_slice(&pcm16le_from_f32(&resampled));

                    while pending.len() >= bytes_per_frame {
                        let rest = pending.split_off(bytes_per_frame);
                        let chunk = std::mem::replace(&mut pending, rest);
                        buffer.push_frame(AudioFrame::new(chunk));
                    }
                },
                move |err| {
                    tracing::error!("Audio stream error: {}", err);
                    error_buffer.stop();
                },
                None, // No timeout.
            )
            .map_err(|e| {
                self.buffer.stop();
                PressvoxError::Audio(format!("Failed to build audio stream: {}", e))
            })?;

        stream.play().map_err(|e| {
            self.buffer.stop();
            PressvoxError::Audio(format!("Failed to start audio stream: {}", e))
        })?;

        // Store the stream to keep it alive.
        if let Ok(mut guard) = self.stream.lock() {
            *guard = Some(SendStream(stream));
        }

        info!(
            device = %device_name,
            device_rate,
            target_rate,
            frame_bytes = bytes_per_frame,
            "Audio capture started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        // Drop the stream to stop capture. Safe when no capture is active.
        if let Ok(mut guard) = self.stream.lock() {
            *guard = None;
        }
        self.buffer.stop();
        tracing::info!("Audio capture stopped");
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
// Non-Windows stub
// =============================================================================

#[cfg(not(target_os = "windows"))]
impl AudioCaptureService for WindowsAudioService {
    async fn start(&self, format: AudioFormat) -> Result<()> {
        Self::check_format(format)?;
        warn!("WindowsAudioService called on non-Windows platform");
        Err(PressvoxError::Audio(
            "Microphone capture is only available on Windows".into(),
        ))
    }

    async fn stop(&self) -> Result<()> {
        self.buffer.stop();
        Ok(())
    }

    fn is_active(&self) -> bool {
        false
    }

    fn buffer(&self) -> &CaptureBuffer {
        &self.buffer
    }
}
