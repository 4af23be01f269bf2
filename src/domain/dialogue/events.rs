//! Callbacks fired by the orchestrator while the dialogue runs.

use std::sync::{Mutex, PoisonError};

use crate::ports::TtsError;

use super::agent::AgentId;
use super::audio::AudioChunk;
use super::question::ListenerQuestion;

/// Observer of dialogue progress. Every method defaults to a no-op.
///
/// Callbacks run inline on the dialogue loop and should return quickly.
pub trait DialogueEvents: Send + Sync {
    /// A chunk was spoken, with or without audio.
    fn on_speech(&self, _agent: AgentId, _text: &str, _chunk_index: usize, _total_chunks: usize) {}

    /// Audio for a chunk or backchannel is ready to play.
    fn on_audio_ready(&self, _chunk: &AudioChunk) {}

    /// Synthesis failed; the chunk continues as text only.
    fn on_tts_error(&self, _agent: AgentId, _error: &TtsError, _text: &str) {}

    fn on_interruption(&self, _interrupter: AgentId, _interrupted: AgentId, _at_chunk: usize, _interjection: &str) {}

    fn on_backchannel(&self, _agent: AgentId, _text: &str) {}

    /// A listener question was picked up.
    fn on_question(&self, _question: &ListenerQuestion, _first_responder: AgentId) {}

    fn on_turn_complete(&self, _agent: AgentId, _total_turns: u32) {}
}

/// Ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDialogueEvents;

impl DialogueEvents for NoOpDialogueEvents {}

/// One recorded callback.
#[derive(Debug, Clone, PartialEq)]
pub enum DialogueEvent {
    Speech {
        agent: AgentId,
        text: String,
        chunk_index: usize,
        total_chunks: usize,
    },
    AudioReady {
        agent: AgentId,
        text: String,
        chunk_index: usize,
        can_be_interrupted: bool,
    },
    TtsError {
        agent: AgentId,
        text: String,
    },
    Interruption {
        interrupter: AgentId,
        interrupted: AgentId,
        at_chunk: usize,
    },
    Backchannel {
        agent: AgentId,
        text: String,
    },
    Question {
        question: String,
        first_responder: AgentId,
    },
    TurnComplete {
        agent: AgentId,
        total_turns: u32,
    },
}

/// Records every callback in order.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<DialogueEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DialogueEvent> {
        self.lock().clone()
    }

    /// Spoken chunks as `(agent, text)`, in order.
    pub fn speeches(&self) -> Vec<(AgentId, String)> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                DialogueEvent::Speech { agent, text, .. } => Some((*agent, text.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&DialogueEvent) -> bool) -> usize {
        self.lock().iter().filter(|event| matches(event)).count()
    }

    fn push(&self, event: DialogueEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DialogueEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DialogueEvents for EventLog {
    fn on_speech(&self, agent: AgentId, text: &str, chunk_index: usize, total_chunks: usize) {
        self.push(DialogueEvent::Speech {
            agent,
            text: text.to_string(),
            chunk_index,
            total_chunks,
        });
    }

    fn on_audio_ready(&self, chunk: &AudioChunk) {
        self.push(DialogueEvent::AudioReady {
            agent: chunk.agent,
            text: chunk.text.clone(),
            chunk_index: chunk.chunk_index,
            can_be_interrupted: chunk.can_be_interrupted,
        });
    }

    fn on_tts_error(&self, agent: AgentId, _error: &TtsError, text: &str) {
        self.push(DialogueEvent::TtsError {
            agent,
            text: text.to_string(),
        });
    }

    fn on_interruption(&self, interrupter: AgentId, interrupted: AgentId, at_chunk: usize, _interjection: &str) {
        self.push(DialogueEvent::Interruption {
            interrupter,
            interrupted,
            at_chunk,
        });
    }

    fn on_backchannel(&self, agent: AgentId, text: &str) {
        self.push(DialogueEvent::Backchannel {
            agent,
            text: text.to_string(),
        });
    }

    fn on_question(&self, question: &ListenerQuestion, first_responder: AgentId) {
        self.push(DialogueEvent::Question {
            question: question.question.clone(),
            first_responder,
        });
    }

    fn on_turn_complete(&self, agent: AgentId, total_turns: u32) {
        self.push(DialogueEvent::TurnComplete { agent, total_turns });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Timestamp;

    #[test]
    fn noop_accepts_everything() {
        let events = NoOpDialogueEvents;
        events.on_speech(AgentId::A, "hi", 0, 1);
        events.on_backchannel(AgentId::B, "mm");
    }

    #[test]
    fn log_keeps_order_and_filters_speech() {
        let log = EventLog::new();
        log.on_speech(AgentId::A, "first", 0, 2);
        log.on_audio_ready(&AudioChunk::for_turn(AgentId::A, "first", None, 0, Timestamp::now(), 0, 2));
        log.on_speech(AgentId::A, "second", 1, 2);

        assert_eq!(log.events().len(), 3);
        assert_eq!(
            log.speeches(),
            vec![(AgentId::A, "first".to_string()), (AgentId::A, "second".to_string())]
        );
        assert_eq!(log.count(|e| matches!(e, DialogueEvent::AudioReady { .. })), 1);
    }
}
