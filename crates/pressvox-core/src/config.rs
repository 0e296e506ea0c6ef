use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{PressvoxError, Result};
use crate::types::{AudioFormat, InjectionMode};

/// Top-level configuration for the Pressvox application.
///
/// Loaded from `~/.pressvox/config.toml` by default. Each section corresponds
/// to one stage of the press-to-talk pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PressvoxConfig {
    #[serde(default)]
    pub press: PressConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub recognition: RecognitionConfig,
    #[serde(default)]
    pub injection: InjectionConfig,
    #[serde(default)]
    pub app: AppConfig,
}

impl Default for PressvoxConfig {
    fn default() -> Self {
        Self {
            press: PressConfig::default(),
            audio: AudioConfig::default(),
            recognition: RecognitionConfig::default(),
            injection: InjectionConfig::default(),
            app: AppConfig::default(),
        }
    }
}

impl PressvoxConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PressvoxConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PressvoxError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Long-press detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PressConfig {
    /// Hold duration in milliseconds before a press qualifies for capture.
    pub long_press_ms: u64,
}

impl Default for PressConfig {
    fn default() -> Self {
        Self { long_press_ms: 1500 }
    }
}

/// Audio capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// PCM sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count (1 = mono).
    pub channels: u16,
    /// Bits per sample (16 = PCM16LE).
    pub bits_per_sample: u16,
    /// Target duration of one queued frame in milliseconds.
    pub frame_ms: u64,
    /// Maximum frames held in the capture queue before drop-oldest kicks in.
    pub queue_capacity: usize,
    /// Input device name, or "default" for the system default.
    pub device_name: String,
}

impl AudioConfig {
    /// The PCM format triple handed to the capture backend.
    pub fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            bits_per_sample: 16,
            frame_ms: 100,
            queue_capacity: 100,
            device_name: "default".to_string(),
        }
    }
}

/// Speech recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Path to the GGML Whisper model file.
    pub model_path: String,
    /// Recognition language code, or "auto" for autodetect.
    pub language: String,
    /// Segments below this confidence are dropped from the result.
    pub confidence_threshold: f32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            model_path: "models/ggml-base.en.bin".to_string(),
            language: "en".to_string(),
            confidence_threshold: 0.6,
        }
    }
}

/// Text injection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    /// Keystrokes or clipboard paste.
    pub mode: InjectionMode,
    /// Delay between simulated keystrokes in milliseconds.
    pub typing_delay_ms: u64,
    /// Delay before restoring the prior clipboard contents after paste.
    pub clipboard_restore_delay_ms: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            mode: InjectionMode::Type,
            typing_delay_ms: 50,
            clipboard_restore_delay_ms: 100,
        }
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log session status events at info level (debug level when false).
    pub show_notifications: bool,
    /// Extra diagnostic logging.
    pub debug_mode: bool,
    /// Write each captured utterance to a WAV file.
    pub save_audio: bool,
    /// Directory for saved WAV files.
    pub audio_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            show_notifications: true,
            debug_mode: false,
            save_audio: false,
            audio_dir: "~/.pressvox/audio".to_string(),
        }
    }
}

/// Shared configuration store with persist-on-mutation semantics.
///
/// Sessions snapshot the configuration at start time; a mutation applied
/// through `update` is written to disk before the call returns and takes
/// effect from the next session onward.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    inner: Mutex<PressvoxConfig>,
}

impl ConfigStore {
    pub fn new(path: PathBuf, config: PressvoxConfig) -> Self {
        Self {
            path,
            inner: Mutex::new(config),
        }
    }

    /// Load the store from disk, falling back to defaults.
    pub fn open(path: PathBuf) -> Self {
        let config = PressvoxConfig::load_or_default(&path);
        Self::new(path, config)
    }

    /// The file this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of the current configuration.
    pub fn snapshot(&self) -> PressvoxConfig {
        self.inner.lock().expect("config mutex poisoned").clone()
    }

    /// Apply a mutation and persist the result before returning.
    pub fn update<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut PressvoxConfig),
    {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| PressvoxError::Config(format!("Config mutex poisoned: {}", e)))?;
        mutate(&mut guard);
        guard.save(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = PressvoxConfig::default();
        assert_eq!(config.press.long_press_ms, 1500);
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.audio.channels, 1);
        assert_eq!(config.audio.bits_per_sample, 16);
        assert_eq!(config.audio.frame_ms, 100);
        assert_eq!(config.audio.queue_capacity, 100);
        assert_eq!(config.recognition.language, "en");
        assert!((config.recognition.confidence_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.injection.mode, InjectionMode::Type);
        assert_eq!(config.injection.typing_delay_ms, 50);
        assert!(config.app.show_notifications);
        assert!(!config.app.save_audio);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
[press]
long_press_ms = 800

[audio]
sample_rate = 48000
channels = 2
bits_per_sample = 16
frame_ms = 50
queue_capacity = 200
device_name = "USB Microphone"

[recognition]
model_path = "/models/ggml-small.bin"
language = "auto"
confidence_threshold = 0.4

[injection]
mode = "clipboard"
typing_delay_ms = 10
clipboard_restore_delay_ms = 250

[app]
show_notifications = false
debug_mode = true
save_audio = true
audio_dir = "/tmp/pressvox-audio"
"#;
        let file = create_temp_config(content);
        let config = PressvoxConfig::load(file.path()).unwrap();

        assert_eq!(config.press.long_press_ms, 800);
        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.channels, 2);
        assert_eq!(config.audio.queue_capacity, 200);
        assert_eq!(config.audio.device_name, "USB Microphone");
        assert_eq!(config.recognition.model_path, "/models/ggml-small.bin");
        assert_eq!(config.recognition.language, "auto");
        assert!((config.recognition.confidence_threshold - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.injection.mode, InjectionMode::Clipboard);
        assert_eq!(config.injection.typing_delay_ms, 10);
        assert_eq!(config.injection.clipboard_restore_delay_ms, 250);
        assert!(!config.app.show_notifications);
        assert!(config.app.debug_mode);
        assert!(config.app.save_audio);
        assert_eq!(config.app.audio_dir, "/tmp/pressvox-audio");
    }

    #[test]
    fn test_load_partial_config_uses_defaults() {
        let content = r#"
[press]
long_press_ms = 2000
"#;
        let file = create_temp_config(content);
        let config = PressvoxConfig::load(file.path()).unwrap();
        assert_eq!(config.press.long_press_ms, 2000);
        // Remaining fields use defaults
        assert_eq!(config.audio.sample_rate, 16_000);
        assert_eq!(config.injection.mode, InjectionMode::Type);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = PressvoxConfig::load_or_default(Path::new("/nonexistent/config.toml"));
        assert_eq!(config.press.long_press_ms, 1500);
    }

    #[test]
    fn test_load_invalid_toml_errors() {
        let file = create_temp_config("press = [[[");
        assert!(PressvoxConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = PressvoxConfig::default();
        config.save(&path).unwrap();

        let reloaded = PressvoxConfig::load(&path).unwrap();
        assert_eq!(reloaded.press.long_press_ms, config.press.long_press_ms);
        assert_eq!(reloaded.audio.sample_rate, config.audio.sample_rate);
        assert_eq!(reloaded.injection.mode, config.injection.mode);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("config.toml");

        PressvoxConfig::default().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = PressvoxConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let deserialized: PressvoxConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(deserialized.press.long_press_ms, config.press.long_press_ms);
        assert_eq!(deserialized.app.audio_dir, config.app.audio_dir);
    }

    #[test]
    fn test_audio_config_format() {
        let audio = AudioConfig::default();
        let format = audio.format();
        assert_eq!(format.sample_rate, 16_000);
        assert_eq!(format.channels, 1);
        assert_eq!(format.bits_per_sample, 16);
    }

    #[test]
    fn test_config_store_snapshot_is_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().join("config.toml"), PressvoxConfig::default());

        let snap = store.snapshot();
        store
            .update(|c| c.press.long_press_ms = 3000)
            .unwrap();

        // Snapshot taken before the mutation is unaffected
        assert_eq!(snap.press.long_press_ms, 1500);
        assert_eq!(store.snapshot().press.long_press_ms, 3000);
    }

    #[test]
    fn test_config_store_update_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let store = ConfigStore::new(path.clone(), PressvoxConfig::default());

        store
            .update(|c| {
                c.injection.mode = InjectionMode::Clipboard;
                c.app.show_notifications = false;
            })
            .unwrap();

        // Mutation hit the disk, not just memory
        let reloaded = PressvoxConfig::load(&path).unwrap();
        assert_eq!(reloaded.injection.mode, InjectionMode::Clipboard);
        assert!(!reloaded.app.show_notifications);
    }

    #[test]
    fn test_config_store_open_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("missing.toml"));
        assert_eq!(store.snapshot().press.long_press_ms, 1500);
    }
}
