//! AI provider configuration

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use crate::ports::{ModelSelection, ProviderId};

use super::error::ValidationError;

/// AI provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    /// OpenAI API key
    pub openai_api_key: Option<Secret<String>>,

    /// Anthropic API key
    pub anthropic_api_key: Option<Secret<String>>,

    /// Groq API key
    pub groq_api_key: Option<Secret<String>>,

    /// Model used by every step, as `"provider/model"`
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on failure
    #[serde(default = "default_retries")]
    pub max_retries: u32,
}

impl AiConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Parses `default_model` into a provider and model.
    pub fn model_selection(&self) -> ModelSelection {
        ModelSelection::parse(&self.default_model)
    }

    /// Provider the default model runs on. A bare model name means OpenAI.
    pub fn default_provider(&self) -> ProviderId {
        self.model_selection().provider.unwrap_or(ProviderId::OpenAI)
    }

    /// Non-empty API key for `provider`, if configured.
    pub fn api_key(&self, provider: ProviderId) -> Option<&str> {
        let key = match provider {
            ProviderId::OpenAI => self.openai_api_key.as_ref(),
            ProviderId::Anthropic => self.anthropic_api_key.as_ref(),
            ProviderId::Groq => self.groq_api_key.as_ref(),
            ProviderId::Mock => return None,
        };
        key.map(|k| k.expose_secret().as_str()).filter(|k| !k.is_empty())
    }

    /// Providers with a key, in registration order.
    pub fn configured_providers(&self) -> Vec<ProviderId> {
        [ProviderId::OpenAI, ProviderId::Anthropic, ProviderId::Groq]
            .into_iter()
            .filter(|p| self.api_key(*p).is_some())
            .collect()
    }

    /// Validate AI configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        let provider = self.default_provider();
        if provider == ProviderId::Mock {
            return Ok(());
        }

        if self.configured_providers().is_empty() {
            return Err(ValidationError::NoAiProviderConfigured);
        }

        // Default provider must have an API key
        if self.api_key(provider).is_none() {
            return Err(ValidationError::MissingRequired(match provider {
                ProviderId::OpenAI => "OPENAI_API_KEY",
                ProviderId::Anthropic => "ANTHROPIC_API_KEY",
                _ => "GROQ_API_KEY",
            }));
        }

        Ok(())
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            default_model: default_model(),
            timeout_secs: default_timeout(),
            max_retries: default_retries(),
        }
    }
}

fn default_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_retries() -> u32 {
    2
}
