//! Audio value objects produced while vocalizing a turn.

use serde::Serialize;
use std::sync::Arc;

use crate::domain::foundation::{ChunkId, Timestamp, ValidationError};

use super::agent::AgentId;

/// Sample rate used when a client does not say otherwise.
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// Mono PCM samples at a fixed rate. Cloning shares the sample storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Result<Self, ValidationError> {
        if sample_rate == 0 {
            return Err(ValidationError::out_of_range("sample_rate", 1.0, f64::from(u32::MAX), 0.0));
        }
        Ok(Self {
            samples: samples.into(),
            sample_rate,
        })
    }

    /// Zeroed buffer lasting `duration_ms`.
    pub fn silence(duration_ms: u64, sample_rate: u32) -> Result<Self, ValidationError> {
        let len = (duration_ms * u64::from(sample_rate) / 1000) as usize;
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / u64::from(self.sample_rate)
    }

    /// Appends `other`; both buffers must share a sample rate.
    pub fn concat(&self, other: &AudioBuffer) -> Result<Self, ValidationError> {
        if self.sample_rate != other.sample_rate {
            return Err(ValidationError::invalid_format(
                "sample_rate",
                format!("cannot join {}Hz with {}Hz", self.sample_rate, other.sample_rate),
            ));
        }
        let mut joined = Vec::with_capacity(self.len() + other.len());
        joined.extend_from_slice(&self.samples);
        joined.extend_from_slice(&other.samples);
        Self::new(joined, self.sample_rate)
    }
}

/// Rough speaking time for text, used when synthesis fails.
pub fn estimate_duration_ms(text: &str, ms_per_word: u64) -> u64 {
    text.split_whitespace().count() as u64 * ms_per_word
}

/// One synthesized (or degraded) chunk ready for playback.
#[derive(Debug, Clone, Serialize)]
pub struct AudioChunk {
    pub id: ChunkId,
    pub agent: AgentId,
    pub text: String,
    #[serde(skip)]
    pub audio: Option<AudioBuffer>,
    pub duration_ms: u64,
    pub generation_started: Timestamp,
    pub generation_completed: Timestamp,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub can_be_interrupted: bool,
}

impl AudioChunk {
    /// A chunk of a turn. The last chunk of a turn is never interruptible.
    pub fn for_turn(
        agent: AgentId,
        text: impl Into<String>,
        audio: Option<AudioBuffer>,
        duration_ms: u64,
        generation_started: Timestamp,
        chunk_index: usize,
        total_chunks: usize,
    ) -> Self {
        Self {
            id: ChunkId::new(),
            agent,
            text: text.into(),
            audio,
            duration_ms,
            generation_started,
            generation_completed: Timestamp::now(),
            chunk_index,
            total_chunks,
            can_be_interrupted: chunk_index + 1 < total_chunks,
        }
    }

    /// A backchannel; always interruptible.
    pub fn backchannel(
        agent: AgentId,
        text: impl Into<String>,
        audio: Option<AudioBuffer>,
        duration_ms: u64,
        generation_started: Timestamp,
    ) -> Self {
        Self {
            can_be_interrupted: true,
            ..Self::for_turn(agent, text, audio, duration_ms, generation_started, 0, 1)
        }
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}
