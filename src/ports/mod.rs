//! Ports - Interfaces for external collaborators.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Model Ports
//!
//! - `AIProvider` - Text generation, streaming or not
//! - `UsageTracker` - One usage record per cognitive step invocation
//!
//! ## Dialogue Ports
//!
//! - `TtsClient` - Speech synthesis per agent voice
//! - `QuestionManager` - Listener question queue
//!
//! ## Visitor Chat Ports
//!
//! - `Retriever` - Ranked knowledge chunks
//! - `ImageGenerator` - Illustrations and tarot cards

mod ai_provider;
mod image_generator;
mod question_manager;
mod retriever;
mod tts_client;
mod usage_tracker;

pub use ai_provider::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, CompletionStream, FinishReason,
    Message, MessageRole, ModelSelection, ProviderId, ProviderInfo, RequestMetadata, StreamChunk,
    TokenUsage,
};
pub use image_generator::{GeneratedImage, ImageError, ImageGenerator, ImageStyle};
pub use question_manager::{QuestionError, QuestionManager};
pub use retriever::{RetrievalError, RetrievedChunk, Retriever};
pub use tts_client::{SynthesizedAudio, TtsClient, TtsError};
pub use usage_tracker::{
    ProviderUsage, UsageLimitStatus, UsageRecord, UsageSummary, UsageTracker, UsageTrackerError,
};
