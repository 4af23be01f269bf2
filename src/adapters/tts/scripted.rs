//! Scripted TTS client for tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::domain::dialogue::{AgentId, AudioBuffer, DEFAULT_SAMPLE_RATE};
use crate::ports::{SynthesizedAudio, TtsClient, TtsError};

/// Length of the buffer `fixed()` hands back.
const FIXED_DURATION_MS: u64 = 100;

#[derive(Debug)]
enum Script {
    Buffer(AudioBuffer),
    Fail(TtsError),
}

/// TTS client that answers every request the same way and records what it
/// was asked to say.
#[derive(Debug)]
pub struct ScriptedTtsClient {
    script: Script,
    calls: AtomicUsize,
    spoken: Mutex<Vec<(AgentId, String)>>,
}

impl ScriptedTtsClient {
    /// Always returns 100ms of silence.
    pub fn fixed() -> Self {
        let buffer = vec![0.0; (FIXED_DURATION_MS * u64::from(DEFAULT_SAMPLE_RATE) / 1000) as usize];
        match AudioBuffer::new(buffer, DEFAULT_SAMPLE_RATE) {
            Ok(buffer) => Self::with_buffer(buffer),
            Err(e) => Self::script(Script::Fail(TtsError::InvalidAudio(e.to_string()))),
        }
    }

    /// Always returns `buffer`.
    pub fn with_buffer(buffer: AudioBuffer) -> Self {
        Self::script(Script::Buffer(buffer))
    }

    /// Always fails as if the service were down.
    pub fn failing() -> Self {
        Self::script(Script::Fail(TtsError::Unavailable("scripted failure".to_string())))
    }

    fn script(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            spoken: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every (agent, text) pair requested so far, in order.
    pub fn spoken(&self) -> Vec<(AgentId, String)> {
        self.spoken.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl TtsClient for ScriptedTtsClient {
    async fn generate_for_soul(&self, agent: AgentId, text: &str) -> Result<SynthesizedAudio, TtsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.spoken
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((agent, text.to_string()));

        match &self.script {
            Script::Buffer(buffer) => Ok(SynthesizedAudio::from_buffer(buffer.clone())),
            Script::Fail(err) => Err(err.clone()),
        }
    }
}
