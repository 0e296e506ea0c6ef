pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{ConfigStore, PressvoxConfig};
pub use error::{PressvoxError, Result};
pub use events::DictationEvent;
pub use types::*;
