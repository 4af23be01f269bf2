//! TTS client port - Interface for speech synthesis.
//!
//! The orchestrator asks for one buffer per spoken chunk. Failures here are
//! recoverable: the caller degrades to a text-only chunk.

use async_trait::async_trait;

use crate::domain::dialogue::{AgentId, AudioBuffer};

/// Audio synthesized for one piece of text.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub buffer: AudioBuffer,
    pub duration_ms: u64,
}

impl SynthesizedAudio {
    /// Wraps a buffer, taking the duration from its sample count.
    pub fn from_buffer(buffer: AudioBuffer) -> Self {
        let duration_ms = buffer.duration_ms();
        Self { buffer, duration_ms }
    }
}

/// Port for speech synthesis in each agent's voice.
#[async_trait]
pub trait TtsClient: Send + Sync {
    /// Synthesizes `text` in the voice assigned to `agent`.
    async fn generate_for_soul(&self, agent: AgentId, text: &str) -> Result<SynthesizedAudio, TtsError>;
}

/// Errors from speech synthesis.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TtsError {
    /// Synthesis service could not be reached.
    #[error("tts unavailable: {0}")]
    Unavailable(String),

    /// Service rejected the request.
    #[error("tts rejected request: {0}")]
    Rejected(String),

    /// Returned audio could not be decoded.
    #[error("invalid audio: {0}")]
    InvalidAudio(String),
}
