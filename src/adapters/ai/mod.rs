//! AI Provider Adapters.
//!
//! Implementations of the AIProvider and UsageTracker ports.
//!
//! ## Available Adapters
//!
//! - `MockAIProvider` - Configurable mock with per-step scripted responses
//! - `OpenAICompatibleProvider` - OpenAI and Groq chat completions
//! - `AnthropicProvider` - Anthropic Claude models (Opus, Sonnet, Haiku)
//! - `InMemoryUsageTracker` - Usage records kept for the life of the process

mod anthropic_provider;
mod in_memory_usage_tracker;
mod mock_provider;
mod openai_compatible_provider;

pub use anthropic_provider::{AnthropicConfig, AnthropicProvider};
pub use in_memory_usage_tracker::InMemoryUsageTracker;
pub use mock_provider::{MockAIProvider, MockError, MockResponse};
pub use openai_compatible_provider::{OpenAICompatibleConfig, OpenAICompatibleProvider};
