//! Configuration for the streamscribe recognition service
//!
//! Settings are layered: `config/default.yaml`, an optional environment
//! file, then `STREAMSCRIBE__`-prefixed environment variables.

mod settings;

pub use settings::{
    load_settings, AudioLogSettings, ObservabilitySettings, RecognitionSettings, ServerSettings,
    Settings, VadSettings,
};

use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
        }
    }
}
