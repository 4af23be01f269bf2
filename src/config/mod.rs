//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `KOTHAR` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use kothar::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Dialogue runs for {} turns", config.dialogue.max_topic_depth);
//! ```

mod agents;
mod ai;
mod error;
mod logging;

pub use agents::AgentsConfig;
pub use ai::AiConfig;
pub use error::{ConfigError, ValidationError};
pub use logging::LoggingConfig;

use serde::Deserialize;

use crate::domain::dialogue::DialogueSettings;
use crate::domain::soul::SoulSettings;

/// Root application configuration
///
/// Every section has defaults; only an API key for the default model's
/// provider is required, and [`AppConfig::validate()`] checks that.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// AI provider configuration (OpenAI/Anthropic/Groq)
    #[serde(default)]
    pub ai: AiConfig,

    /// Dialogue loop tunables
    #[serde(default)]
    pub dialogue: DialogueSettings,

    /// The two dialogue voices
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Visitor chat persona
    #[serde(default)]
    pub soul: SoulSettings,

    /// tracing-subscriber setup
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `KOTHAR` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `KOTHAR__AI__OPENAI_API_KEY=sk-...` -> `ai.openai_api_key`
    /// - `KOTHAR__DIALOGUE__MAX_TOPIC_DEPTH=20` -> `dialogue.max_topic_depth = 20`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("KOTHAR")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// - An API key exists for the default model's provider
    /// - Thresholds and probabilities lie in [0, 1]
    /// - Strides, intervals and the depth budget are non-zero
    /// - Agent names are present and distinct
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.ai.validate()?;
        self.dialogue
            .validate()
            .map_err(|e| ValidationError::InvalidDialogue(e.to_string()))?;
        self.agents.validate()?;
        if self.soul.keep_recent > self.soul.history_limit {
            return Err(ValidationError::InvalidSoul(
                "keep_recent exceeds history_limit".to_string(),
            ));
        }
        self.logging.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ProviderId;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "KOTHAR__AI__OPENAI_API_KEY",
        "KOTHAR__AI__DEFAULT_MODEL",
        "KOTHAR__DIALOGUE__MAX_TOPIC_DEPTH",
        "KOTHAR__DIALOGUE__INTERRUPTION_THRESHOLD",
        "KOTHAR__AGENTS__B_NAME",
        "KOTHAR__LOGGING__JSON",
    ];

    fn set_minimal_env() {
        env::set_var("KOTHAR__AI__OPENAI_API_KEY", "sk-xxx");
    }

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.ai.configured_providers(), vec![ProviderId::OpenAI]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_section_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.dialogue, DialogueSettings::default());
        assert_eq!(config.agents.a_name, "Kothar");
        assert_eq!(config.soul, SoulSettings::default());
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_nested_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("KOTHAR__DIALOGUE__MAX_TOPIC_DEPTH", "20");
        env::set_var("KOTHAR__AGENTS__B_NAME", "Ilu");
        env::set_var("KOTHAR__LOGGING__JSON", "true");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.dialogue.max_topic_depth, 20);
        assert_eq!(config.agents.b_name, "Ilu");
        assert!(config.logging.json);
    }

    #[test]
    fn test_out_of_range_threshold_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("KOTHAR__DIALOGUE__INTERRUPTION_THRESHOLD", "1.5");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidDialogue(_))));
    }

    #[test]
    fn test_missing_key_for_default_model() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("KOTHAR__AI__DEFAULT_MODEL", "anthropic/claude-3-5-haiku-latest");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::MissingRequired(_))));
    }
}
