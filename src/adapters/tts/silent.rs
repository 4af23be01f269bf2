//! TTS client that produces silence as long as the text would take to say.

use async_trait::async_trait;

use crate::domain::dialogue::{estimate_duration_ms, AgentId, AudioBuffer, DEFAULT_SAMPLE_RATE};
use crate::ports::{SynthesizedAudio, TtsClient, TtsError};

/// Stand-in voice for running dialogues without a speech service.
#[derive(Debug, Clone)]
pub struct SilentTtsClient {
    ms_per_word: u64,
    sample_rate: u32,
}

impl SilentTtsClient {
    pub fn new(ms_per_word: u64) -> Self {
        Self {
            ms_per_word,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }
}

#[async_trait]
impl TtsClient for SilentTtsClient {
    async fn generate_for_soul(&self, _agent: AgentId, text: &str) -> Result<SynthesizedAudio, TtsError> {
        let duration = estimate_duration_ms(text, self.ms_per_word);
        let buffer = AudioBuffer::silence(duration, self.sample_rate)
            .map_err(|e| TtsError::InvalidAudio(e.to_string()))?;
        Ok(SynthesizedAudio::from_buffer(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duration_follows_word_count() {
        let tts = SilentTtsClient::new(150).with_sample_rate(16_000);

        let audio = tts.generate_for_soul(AgentId::A, "the bronze is cooling").await.unwrap();

        assert_eq!(audio.duration_ms, 600);
        assert_eq!(audio.buffer.len(), 9_600);
        assert!(audio.buffer.samples().iter().all(|s| *s == 0.0));
    }

    #[tokio::test]
    async fn zero_sample_rate_is_invalid_audio() {
        let tts = SilentTtsClient::new(150).with_sample_rate(0);

        let result = tts.generate_for_soul(AgentId::B, "hm").await;

        assert!(matches!(result, Err(TtsError::InvalidAudio(_))));
    }
}
