//! Configuration management for the TTS gateway.
//!
//! Settings load from, in increasing precedence: code defaults,
//! `config/{default,<env>}.{yaml,toml}`, `GATEWAY__`-prefixed environment
//! variables, then the flat wire-contract-named overrides from spec §6
//! (`PORT`, `ADMIN_API_KEY`, `DATABASE_URL`, ...). See `settings`.

pub mod settings;

pub use settings::{
    load_settings, AuthConfig, EmbeddedConfig, FeatureFlags, LogFormat, PersistenceConfig,
    RateLimitConfig, RuntimeEnvironment, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
