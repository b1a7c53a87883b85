//! Configuration management for the call bridge
//!
//! Supports loading configuration from:
//! - TOML/YAML files (`config/default`, `config/{env}`)
//! - Environment variables (`CALL_BRIDGE__SECTION__KEY`)
//! - Conventional credential variables (`DEEPGRAM_API_KEY`, `TWILIO_*`,
//!   `CALLWISE_API`) as field defaults

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, load_settings_from, CallConfig, KnowledgeConfig, ObservabilityConfig,
    OverflowPolicy, PacerConfig, QueueConfig, RuntimeEnvironment, ServerConfig, Settings,
    TelephonyConfig, TranscriptionConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
