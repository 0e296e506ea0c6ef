use thiserror::Error;

/// Top-level error type for the Pressvox system.
///
/// Each variant covers one subsystem or one guarded invariant. Subsystem
/// crates return `PressvoxError` directly so the `?` operator works across
/// crate boundaries without wrapper types.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PressvoxError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Pointer input error: {0}")]
    Input(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Capture already recording")]
    AlreadyRecording,

    #[error("Recognition already in flight")]
    Busy,

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Text injection failed: {0}")]
    Injection(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for PressvoxError {
    fn from(err: toml::de::Error) -> Self {
        PressvoxError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PressvoxError {
    fn from(err: toml::ser::Error) -> Self {
        PressvoxError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for PressvoxError {
    fn from(err: serde_json::Error) -> Self {
        PressvoxError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Pressvox operations.
pub type Result<T> = std::result::Result<T, PressvoxError>;
