//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("No AI provider configured")]
    NoAiProviderConfigured,

    #[error("Invalid dialogue settings: {0}")]
    InvalidDialogue(String),

    #[error("Invalid soul settings: {0}")]
    InvalidSoul(String),

    #[error("Invalid agent profile: {0}")]
    InvalidAgent(String),

    #[error("Invalid log filter: {0}")]
    InvalidLogFilter(String),
}
