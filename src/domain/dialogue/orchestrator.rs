//! Dialogue Orchestrator - Two agents taking turns on a radio show.
//!
//! The orchestrator owns both agents' state and the shared transcript. It
//! generates chunked turns, vocalizes them chunk by chunk, lets the listener
//! interrupt at chunk boundaries, mixes in backchannels and periodically
//! diverts into listener questions.
//!
//! Everything runs sequentially inside `run_dialogue`: model calls, speech
//! synthesis and interruption checks are awaited one after another, so the
//! state seen between them is always consistent. `stop()` is cooperative;
//! the call in flight completes and the loop exits right after it.
//!
//! # Example
//!
//! ```ignore
//! let mut orchestrator = DialogueOrchestrator::new(runtime, (kothar, tamar), tts, events, settings)?
//!     .with_question_manager(questions);
//! let stop = orchestrator.stop_handle();
//!
//! orchestrator.start_dialogue("origins of the labyrinth").await?;
//! orchestrator.run_dialogue().await?;
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::cognitive::steps::{
    backchannel, chunked_dialogue, interruption_decision, question_selector, BackchannelContext,
    InterruptionContext, InterruptionDecision, QuestionRouting, SelectorContext, TurnContext,
    TurnPurpose,
};
use crate::domain::cognitive::{CognitiveStep, StepOptions, StepRuntime};
use crate::domain::foundation::{SessionId, StateMachine, Timestamp, ValidationError};
use crate::domain::memory::{MemoryEntry, WorkingMemory};
use crate::ports::{QuestionManager, TtsClient};

use super::agent::{AgentId, AgentProfile, SoulDialogueState};
use super::audio::{estimate_duration_ms, AudioChunk};
use super::chunking::ChunkedUtterance;
use super::errors::DialogueError;
use super::events::DialogueEvents;
use super::intention::Intention;
use super::phase::DialoguePhase;
use super::question::ListenerQuestion;
use super::settings::DialogueSettings;

/// Soul name of the shared transcript memory.
const TRANSCRIPT: &str = "transcript";

/// Orchestrator-owned state of one dialogue session.
#[derive(Debug, Clone)]
pub struct DialogueState {
    pub session_id: SessionId,
    /// What was actually spoken, in order.
    pub shared_memory: WorkingMemory,
    agents: [SoulDialogueState; 2],
    pub current_speaker: Option<AgentId>,
    pub turn_started_at: Option<Timestamp>,
    pub current_topic: String,
    pub topic_depth: u32,
    pub total_turns: u32,
    pub phase: DialoguePhase,
}

impl DialogueState {
    fn new(session_id: SessionId, a: AgentProfile, b: AgentProfile) -> Self {
        Self {
            session_id,
            shared_memory: WorkingMemory::new(TRANSCRIPT),
            agents: [SoulDialogueState::new(a), SoulDialogueState::new(b)],
            current_speaker: None,
            turn_started_at: None,
            current_topic: String::new(),
            topic_depth: 0,
            total_turns: 0,
            phase: DialoguePhase::Idle,
        }
    }

    pub fn agent(&self, id: AgentId) -> &SoulDialogueState {
        &self.agents[id.index()]
    }

    fn agent_mut(&mut self, id: AgentId) -> &mut SoulDialogueState {
        &mut self.agents[id.index()]
    }

    /// The agent currently speaking, if any.
    pub fn vocalizing(&self) -> Option<AgentId> {
        self.agents
            .iter()
            .find(|agent| agent.currently_vocalizing)
            .map(SoulDialogueState::id)
    }

    fn snapshot(&self) -> DialogueSnapshot {
        DialogueSnapshot {
            session_id: self.session_id,
            phase: self.phase,
            current_speaker: self.current_speaker,
            vocalizing: self.vocalizing(),
            current_topic: self.current_topic.clone(),
            topic_depth: self.topic_depth,
            total_turns: self.total_turns,
            transcript_len: self.shared_memory.len(),
        }
    }
}

/// Point-in-time view published at every suspension point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogueSnapshot {
    pub session_id: SessionId,
    pub phase: DialoguePhase,
    pub current_speaker: Option<AgentId>,
    pub vocalizing: Option<AgentId>,
    pub current_topic: String,
    pub topic_depth: u32,
    pub total_turns: u32,
    pub transcript_len: usize,
}

/// Stops a running dialogue from another task.
#[derive(Debug, Clone)]
pub struct StopHandle {
    running: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Dialogue stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// How a vocalization pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Vocalized {
    Completed,
    Interrupted,
    Stopped,
}

struct DialogueSteps {
    chunked: CognitiveStep<TurnContext, ChunkedUtterance>,
    interruption: CognitiveStep<InterruptionContext, InterruptionDecision>,
    backchannel: CognitiveStep<BackchannelContext, Option<String>>,
    selector: CognitiveStep<SelectorContext, QuestionRouting>,
}

/// Runs the two-agent dialogue loop.
pub struct DialogueOrchestrator {
    runtime: StepRuntime,
    tts: Arc<dyn TtsClient>,
    questions: Option<Arc<dyn QuestionManager>>,
    events: Arc<dyn DialogueEvents>,
    settings: DialogueSettings,
    options: StepOptions,
    steps: DialogueSteps,
    rng: StdRng,
    state: DialogueState,
    stop: StopHandle,
    snapshots: watch::Sender<DialogueSnapshot>,
}

impl DialogueOrchestrator {
    /// Creates an idle orchestrator for agents `(A, B)`.
    pub fn new(
        runtime: StepRuntime,
        agents: (AgentProfile, AgentProfile),
        tts: Arc<dyn TtsClient>,
        events: Arc<dyn DialogueEvents>,
        settings: DialogueSettings,
    ) -> Result<Self, DialogueError> {
        settings.validate()?;
        let (a, b) = agents;
        if a.id != AgentId::A || b.id != AgentId::B {
            return Err(
                ValidationError::invalid_format("agents", "expected profiles for agent a then agent b").into(),
            );
        }

        let rng = settings
            .rng_seed
            .map(StdRng::seed_from_u64)
            .unwrap_or_else(StdRng::from_entropy);
        let state = DialogueState::new(runtime.session_id(), a, b);
        let (snapshots, _) = watch::channel(state.snapshot());

        Ok(Self {
            runtime,
            tts,
            questions: None,
            events,
            settings,
            options: StepOptions::default(),
            steps: DialogueSteps {
                chunked: chunked_dialogue(),
                interruption: interruption_decision(),
                backchannel: backchannel(),
                selector: question_selector(),
            },
            rng,
            state,
            stop: StopHandle {
                running: Arc::new(AtomicBool::new(false)),
            },
            snapshots,
        })
    }

    pub fn with_question_manager(mut self, questions: Arc<dyn QuestionManager>) -> Self {
        self.questions = Some(questions);
        self
    }

    /// Options (model selection, temperature) applied to every step call.
    pub fn with_step_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> &DialogueState {
        &self.state
    }

    pub fn settings(&self) -> &DialogueSettings {
        &self.settings
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_running()
    }

    /// Receives a snapshot at every suspension point.
    pub fn subscribe(&self) -> watch::Receiver<DialogueSnapshot> {
        self.snapshots.subscribe()
    }

    /// Pending turn text of `agent`, or empty.
    pub fn get_current_utterance(&self, agent: AgentId) -> &str {
        self.state.agent(agent).current_utterance()
    }

    /// What `agent` last said, or the opening sentinel.
    pub fn get_last_utterance(&self, agent: AgentId) -> &str {
        self.state.agent(agent).last_utterance()
    }

    /// Resets the topic budget and prepares agent A's opening turn.
    ///
    /// Nothing is spoken until `run_dialogue`. If the opening turn cannot be
    /// generated the dialogue is left stopped and may be started again.
    pub async fn start_dialogue(&mut self, topic: &str) -> Result<(), DialogueError> {
        if self.state.phase == DialoguePhase::Stopped {
            self.enter(DialoguePhase::Idle)?;
        }
        self.enter(DialoguePhase::Generating)?;

        info!(session_id = %self.state.session_id, topic, "Starting dialogue");
        self.stop.running.store(true, Ordering::SeqCst);
        self.state.current_topic = topic.to_string();
        self.state.topic_depth = 0;
        for agent in &mut self.state.agents {
            agent.intention = None;
            agent.wants_to_speak = false;
            agent.urgency_level = 0.0;
        }
        self.state.current_speaker = Some(AgentId::A);
        self.state.turn_started_at = Some(Timestamp::now());

        if let Err(err) = self.generate_turn(AgentId::A, TurnPurpose::Topic).await {
            warn!(error = %err, "Opening turn failed, dialogue stopped");
            self.stop.running.store(false, Ordering::SeqCst);
            self.enter(DialoguePhase::Stopped)?;
            return Err(err);
        }
        self.enter(DialoguePhase::Running)
    }

    /// Runs until the topic budget is spent or `stop()` is called.
    ///
    /// A failed model call ends this run with an error; the dialogue is left
    /// stopped either way.
    pub async fn run_dialogue(&mut self) -> Result<(), DialogueError> {
        if self.state.current_speaker.is_none() || self.state.phase != DialoguePhase::Running {
            return Err(DialogueError::NotStarted);
        }

        let result = self.dialogue_loop().await;

        self.stop.running.store(false, Ordering::SeqCst);
        for agent in &mut self.state.agents {
            agent.currently_vocalizing = false;
        }
        if self.state.phase != DialoguePhase::Stopped {
            self.enter(DialoguePhase::Stopped)?;
        }
        info!(
            total_turns = self.state.total_turns,
            topic_depth = self.state.topic_depth,
            transcript_len = self.state.shared_memory.len(),
            "Dialogue finished"
        );
        result
    }

    async fn dialogue_loop(&mut self) -> Result<(), DialogueError> {
        while self.is_running() && self.state.topic_depth < self.settings.max_topic_depth {
            let speaker = self.state.current_speaker.ok_or(DialogueError::NotStarted)?;

            let outcome = self.vocalize_turn().await?;
            if outcome == Vocalized::Stopped || !self.is_running() {
                break;
            }

            if self.maybe_address_question().await? {
                continue;
            }
            if !self.is_running() {
                break;
            }

            if outcome == Vocalized::Completed {
                self.enter(DialoguePhase::Switching)?;
                let next = speaker.other();
                self.state.current_speaker = Some(next);
                self.state.turn_started_at = Some(Timestamp::now());
                self.enter(DialoguePhase::Generating)?;
                self.generate_turn(next, TurnPurpose::Topic).await?;
                self.enter(DialoguePhase::Running)?;
            }

            self.state.topic_depth += 1;
            self.state.total_turns += 1;
            self.events.on_turn_complete(speaker, self.state.total_turns);
            self.publish();
        }
        Ok(())
    }

    /// Speaks the current speaker's pending turn chunk by chunk, checking for
    /// interruption before chunk 0 and every `interruption_check_interval`-th
    /// chunk after it.
    async fn vocalize_turn(&mut self) -> Result<Vocalized, DialogueError> {
        let speaker = self.state.current_speaker.ok_or(DialogueError::NotStarted)?;
        let total = self
            .state
            .agent(speaker)
            .intention
            .as_ref()
            .map_or(0, Intention::total_chunks);

        self.enter(DialoguePhase::Vocalizing)?;
        self.state.agent_mut(speaker).currently_vocalizing = true;

        let mut outcome = Vocalized::Completed;
        for index in 0..total {
            if !self.is_running() {
                outcome = Vocalized::Stopped;
                break;
            }

            if index % self.settings.interruption_check_interval == 0 {
                let decision = self.check_interruption(speaker).await?;
                if !self.is_running() {
                    outcome = Vocalized::Stopped;
                    break;
                }
                if let Some(decision) = decision {
                    self.handle_interruption(speaker, index, decision).await?;
                    outcome = Vocalized::Interrupted;
                    break;
                }
            }

            self.speak_chunk(speaker, index, total).await;

            let listener = speaker.other();
            if (index + 1) % self.settings.backchannel_interval == 0
                && self.rng.gen_bool(self.settings.backchannel_probability)
                && self.is_running()
            {
                self.maybe_backchannel(listener, speaker, index).await;
            }
        }

        let state = self.state.agent_mut(speaker);
        state.currently_vocalizing = false;
        if outcome == Vocalized::Completed {
            state.wants_to_speak = false;
            if let Some(intention) = &state.intention {
                let spoken = intention.vocalized_text();
                state.set_last_utterance(spoken);
            }
        }

        if outcome != Vocalized::Stopped && self.is_running() {
            self.enter(DialoguePhase::Running)?;
        }
        Ok(outcome)
    }

    /// Speaks every chunk of `agent`'s turn with no interruption checks.
    async fn vocalize_fully(&mut self, agent: AgentId) {
        let total = self
            .state
            .agent(agent)
            .intention
            .as_ref()
            .map_or(0, Intention::total_chunks);

        self.state.agent_mut(agent).currently_vocalizing = true;
        for index in 0..total {
            if !self.is_running() {
                break;
            }
            self.speak_chunk(agent, index, total).await;
        }

        let state = self.state.agent_mut(agent);
        state.currently_vocalizing = false;
        state.wants_to_speak = false;
        if let Some(intention) = &state.intention {
            let spoken = intention.vocalized_text();
            state.set_last_utterance(spoken);
        }
    }

    /// Synthesizes, announces and records one chunk.
    async fn speak_chunk(&mut self, agent: AgentId, index: usize, total: usize) {
        let Some(text) = self
            .state
            .agent(agent)
            .intention
            .as_ref()
            .and_then(|intention| intention.chunk(index))
            .map(str::to_string)
        else {
            return;
        };

        let chunk = self.generate_audio_chunk(agent, &text, index, total).await;
        if chunk.has_audio() {
            self.events.on_audio_ready(&chunk);
        }
        self.events.on_speech(agent, &text, index, total);
        debug!(agent = %agent, chunk_index = index, total_chunks = total, "Vocalized chunk");

        let state = self.state.agent_mut(agent);
        if let Some(intention) = state.intention.as_mut() {
            intention.mark_vocalized();
        }
        let entry = MemoryEntry::assistant(text)
            .with_speaker(state.name())
            .with_metadata("agent", agent.as_str())
            .with_metadata("chunk_index", index);
        self.state.shared_memory = self.state.shared_memory.with_memory(entry);
        self.publish();
    }

    /// Synthesizes speech for a chunk, degrading to a text-only chunk with an
    /// estimated duration when synthesis fails.
    pub async fn generate_audio_chunk(&self, agent: AgentId, text: &str, index: usize, total: usize) -> AudioChunk {
        let started = Timestamp::now();
        match self.tts.generate_for_soul(agent, text).await {
            Ok(audio) => AudioChunk::for_turn(agent, text, Some(audio.buffer), audio.duration_ms, started, index, total),
            Err(err) => {
                warn!(agent = %agent, chunk_index = index, error = %err, "Speech synthesis failed, continuing as text");
                self.events.on_tts_error(agent, &err, text);
                let duration = estimate_duration_ms(text, self.settings.ms_per_word);
                AudioChunk::for_turn(agent, text, None, duration, started, index, total)
            }
        }
    }

    /// Whether the listener wants to cut `speaker` off at the current chunk.
    pub async fn should_be_interrupted(&mut self, speaker: AgentId) -> Result<bool, DialogueError> {
        Ok(self.check_interruption(speaker).await?.is_some())
    }

    async fn check_interruption(&mut self, speaker: AgentId) -> Result<Option<InterruptionDecision>, DialogueError> {
        let listener_id = speaker.other();
        let listener = self.state.agent(listener_id);
        if listener.intention.is_none() && !listener.wants_to_speak {
            return Ok(None);
        }
        let Some(intention) = self.state.agent(speaker).intention.as_ref() else {
            return Ok(None);
        };

        let context = InterruptionContext {
            listener: listener.name().to_string(),
            speaker: self.state.agent(speaker).name().to_string(),
            topic: self.state.current_topic.clone(),
            current_chunk: intention.current_chunk().unwrap_or_default().to_string(),
            spoken_so_far: intention.vocalized_text(),
            own_pending: listener.intention.as_ref().map(|i| i.full_response.clone()),
        };

        let (memory, decision) = self
            .steps
            .interruption
            .run(&self.runtime, &listener.memory, &context, &self.options)
            .await?;

        let listener = self.state.agent_mut(listener_id);
        listener.memory = memory;
        listener.urgency_level = decision.urgency;
        self.publish();

        let interrupt = decision.urgency >= self.settings.interruption_threshold;
        debug!(
            listener = %listener_id,
            urgency = decision.urgency,
            threshold = self.settings.interruption_threshold,
            interrupt,
            "Interruption check"
        );
        Ok(interrupt.then_some(decision))
    }

    /// Hands the floor to the interrupter and generates its turn. The rest of
    /// the interrupted turn is abandoned.
    async fn handle_interruption(
        &mut self,
        speaker: AgentId,
        at_chunk: usize,
        decision: InterruptionDecision,
    ) -> Result<(), DialogueError> {
        let interrupter = speaker.other();
        info!(
            interrupter = %interrupter,
            interrupted = %speaker,
            chunk_index = at_chunk,
            urgency = decision.urgency,
            "Interruption accepted"
        );

        let state = self.state.agent_mut(speaker);
        state.currently_vocalizing = false;
        if let Some(intention) = state.intention.as_mut() {
            intention.mark_interrupted(at_chunk, decision.interjection.clone());
            let spoken = intention.vocalized_text();
            state.set_last_utterance(spoken);
        }
        self.enter(DialoguePhase::Interrupted)?;
        self.events
            .on_interruption(interrupter, speaker, at_chunk, &decision.interjection);

        self.state.current_speaker = Some(interrupter);
        self.state.turn_started_at = Some(Timestamp::now());
        self.enter(DialoguePhase::Generating)?;
        self.generate_turn(interrupter, TurnPurpose::Topic).await
    }

    /// Generates `agent`'s next turn and stores it as a fresh intention.
    async fn generate_turn(&mut self, agent: AgentId, purpose: TurnPurpose) -> Result<(), DialogueError> {
        let partner = self.state.agent(agent.other());
        let me = self.state.agent(agent);
        let interrupted_thought = me
            .intention
            .as_ref()
            .filter(|intention| intention.was_interrupted())
            .map(Intention::unspoken_text)
            .filter(|text| !text.is_empty());

        let context = TurnContext {
            speaker: me.name().to_string(),
            partner: partner.name().to_string(),
            topic: self.state.current_topic.clone(),
            partner_last_utterance: partner.last_utterance().to_string(),
            interrupted_thought,
            purpose,
        };

        let (memory, utterance) = self
            .steps
            .chunked
            .run(&self.runtime, &me.memory, &context, &self.options)
            .await?;

        debug!(agent = %agent, chunks = utterance.chunks.len(), "Generated turn");
        let state = self.state.agent_mut(agent);
        state.memory = memory;
        state.intention = Some(Intention::from_utterance(utterance));
        state.wants_to_speak = true;
        self.publish();
        Ok(())
    }

    /// Asks the listener for a backchannel. Failures are logged and skipped.
    async fn maybe_backchannel(&mut self, listener: AgentId, speaker: AgentId, index: usize) {
        let Some(chunk) = self
            .state
            .agent(speaker)
            .intention
            .as_ref()
            .and_then(|intention| intention.chunk(index))
        else {
            return;
        };
        let listener_state = self.state.agent(listener);
        let context = BackchannelContext {
            listener: listener_state.name().to_string(),
            speaker: self.state.agent(speaker).name().to_string(),
            chunk: chunk.to_string(),
            max_chars: self.settings.backchannel_max_chars,
        };

        let said = match self
            .steps
            .backchannel
            .run(&self.runtime, &listener_state.memory, &context, &self.options)
            .await
        {
            Ok((memory, said)) => {
                self.state.agent_mut(listener).memory = memory;
                said
            }
            Err(err) => {
                warn!(agent = %listener, error = %err, "Backchannel generation failed");
                return;
            }
        };
        let Some(text) = said else {
            return;
        };

        let started = Timestamp::now();
        match self.tts.generate_for_soul(listener, &text).await {
            Ok(audio) => {
                let chunk = AudioChunk::backchannel(listener, &text, Some(audio.buffer), audio.duration_ms, started);
                self.events.on_audio_ready(&chunk);
            }
            Err(err) => {
                warn!(agent = %listener, error = %err, "Backchannel synthesis failed");
                self.events.on_tts_error(listener, &err, &text);
            }
        }
        self.events.on_backchannel(listener, &text);
    }

    /// Diverts into a listener question when one is due.
    ///
    /// Returns true when a question was discussed.
    async fn maybe_address_question(&mut self) -> Result<bool, DialogueError> {
        let Some(questions) = self.questions.clone() else {
            return Ok(false);
        };
        let turns = self.state.total_turns;
        if turns == 0 || turns % self.settings.question_check_interval != 0 {
            return Ok(false);
        }
        if !questions.can_ask_question().await {
            return Ok(false);
        }
        let Some(question) = questions.get_next_question().await else {
            return Ok(false);
        };
        if !self.is_running() {
            return Ok(false);
        }

        self.discuss_question(questions.as_ref(), question).await?;
        Ok(true)
    }

    /// Both agents answer a listener question, then the topic resumes with
    /// the first responder. Counts as two turns.
    async fn discuss_question(
        &mut self,
        questions: &dyn QuestionManager,
        question: ListenerQuestion,
    ) -> Result<(), DialogueError> {
        self.enter(DialoguePhase::AnsweringQuestion)?;
        info!(question_id = %question.id, question = %question.question, "Diverting to listener question");
        if let Err(err) = questions.mark_addressing(question.id).await {
            warn!(question_id = %question.id, error = %err, "Could not mark question as addressing");
        }

        let router = self.state.current_speaker.unwrap_or(AgentId::A);
        let context = SelectorContext {
            question: question.question.clone(),
            topic: self.state.current_topic.clone(),
            agent_a: self.state.agent(AgentId::A).name().to_string(),
            agent_b: self.state.agent(AgentId::B).name().to_string(),
            fallback: self.settings.selector_fallback,
        };
        let (memory, routing) = self
            .steps
            .selector
            .run(&self.runtime, &self.state.agent(router).memory, &context, &self.options)
            .await?;
        self.state.agent_mut(router).memory = memory;

        let first = routing.first_responder;
        let second = first.other();
        self.events.on_question(&question, first);

        let asked = MemoryEntry::user(question.question.clone())
            .with_speaker(question.submitted_by.as_deref().unwrap_or("listener"))
            .with_metadata("kind", "listener_question");
        self.state.shared_memory = self.state.shared_memory.with_memory(asked);

        self.state.current_speaker = Some(first);
        self.generate_turn(
            first,
            TurnPurpose::AnswerQuestion {
                question: question.question.clone(),
                approach: routing.approach.clone(),
            },
        )
        .await?;
        self.vocalize_fully(first).await;
        if !self.is_running() {
            return Ok(());
        }

        let first_answer = self
            .state
            .agent(first)
            .intention
            .as_ref()
            .map(|intention| intention.cleaned.clone())
            .unwrap_or_default();
        self.state.current_speaker = Some(second);
        self.generate_turn(
            second,
            TurnPurpose::FollowUp {
                question: question.question.clone(),
                partner_answer: first_answer,
            },
        )
        .await?;
        self.vocalize_fully(second).await;
        if !self.is_running() {
            return Ok(());
        }

        if let Err(err) = questions.mark_answered(question.id, first).await {
            warn!(question_id = %question.id, error = %err, "Could not mark question as answered");
        }

        self.state.current_speaker = Some(first);
        self.state.turn_started_at = Some(Timestamp::now());
        self.enter(DialoguePhase::Generating)?;
        self.generate_turn(first, TurnPurpose::Topic).await?;
        self.enter(DialoguePhase::Running)?;

        self.state.topic_depth += 2;
        self.state.total_turns += 2;
        self.events.on_turn_complete(second, self.state.total_turns);
        self.publish();
        Ok(())
    }

    fn enter(&mut self, phase: DialoguePhase) -> Result<(), DialogueError> {
        self.state.phase.advance(phase)?;
        self.publish();
        Ok(())
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.state.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{InMemoryUsageTracker, MockAIProvider, MockError};
    use crate::adapters::questions::InMemoryQuestionManager;
    use crate::adapters::tts::ScriptedTtsClient;
    use crate::domain::cognitive::steps::{
        BACKCHANNEL, CHUNKED_DIALOGUE, INTERRUPTION_DECISION, QUESTION_SELECTOR,
    };
    use crate::domain::cognitive::ProviderRegistry;
    use crate::domain::dialogue::events::{DialogueEvent, EventLog};
    use crate::ports::ProviderId;
    use std::time::Duration;

    fn profiles() -> (AgentProfile, AgentProfile) {
        (
            AgentProfile::new(AgentId::A, "Kothar", "A wry craftsman.").unwrap(),
            AgentProfile::new(AgentId::B, "Tamar", "A curious scholar.").unwrap(),
        )
    }

    fn quiet_settings(max_topic_depth: u32) -> DialogueSettings {
        DialogueSettings {
            max_topic_depth,
            backchannel_probability: 0.0,
            rng_seed: Some(7),
            ..DialogueSettings::default()
        }
    }

    fn orchestrator(
        provider: MockAIProvider,
        tts: ScriptedTtsClient,
        settings: DialogueSettings,
    ) -> (DialogueOrchestrator, Arc<EventLog>) {
        let registry = ProviderRegistry::new().register(ProviderId::Mock, Arc::new(provider));
        let runtime = StepRuntime::new(
            Arc::new(registry),
            Arc::new(InMemoryUsageTracker::new()),
            SessionId::new(),
        );
        let events = Arc::new(EventLog::new());
        let orchestrator =
            DialogueOrchestrator::new(runtime, profiles(), Arc::new(tts), events.clone(), settings).unwrap();
        (orchestrator, events)
    }

    fn two_chunk_provider() -> MockAIProvider {
        MockAIProvider::new()
            .with_step_default(CHUNKED_DIALOGUE, "The maze began as a palace | and became a legend.")
            .with_step_default(INTERRUPTION_DECISION, "urgency: 0\ninterjection: fine")
    }

    #[tokio::test]
    async fn start_prepares_opening_turn_without_speaking() {
        let (mut orchestrator, events) =
            orchestrator(two_chunk_provider(), ScriptedTtsClient::fixed(), quiet_settings(2));

        orchestrator.start_dialogue("origins of the labyrinth").await.unwrap();

        let state = orchestrator.state();
        assert_eq!(state.current_speaker, Some(AgentId::A));
        assert_eq!(state.phase, DialoguePhase::Running);
        assert_eq!(state.topic_depth, 0);
        assert_eq!(state.agent(AgentId::A).intention.as_ref().unwrap().total_chunks(), 2);
        assert_eq!(orchestrator.get_current_utterance(AgentId::B), "");
        assert!(events.events().is_empty());
    }

    #[tokio::test]
    async fn failed_opening_turn_leaves_dialogue_restartable() {
        let provider = two_chunk_provider().with_step_error(
            CHUNKED_DIALOGUE,
            MockError::Unavailable {
                message: "overloaded".to_string(),
            },
        );
        let (mut orchestrator, events) =
            orchestrator(provider, ScriptedTtsClient::fixed(), quiet_settings(1));

        assert!(orchestrator.start_dialogue("bulls").await.is_err());
        assert_eq!(orchestrator.state().phase, DialoguePhase::Stopped);
        assert!(!orchestrator.is_running());
        assert!(matches!(
            orchestrator.run_dialogue().await,
            Err(DialogueError::NotStarted)
        ));

        orchestrator.start_dialogue("bulls").await.unwrap();
        assert_eq!(orchestrator.state().phase, DialoguePhase::Running);
        orchestrator.run_dialogue().await.unwrap();
        assert_eq!(events.speeches().len(), 2);
    }

    #[tokio::test]
    async fn run_before_start_is_rejected() {
        let (mut orchestrator, _) =
            orchestrator(two_chunk_provider(), ScriptedTtsClient::fixed(), quiet_settings(2));

        assert!(matches!(
            orchestrator.run_dialogue().await,
            Err(DialogueError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn alternates_speakers_until_depth_budget() {
        let (mut orchestrator, events) =
            orchestrator(two_chunk_provider(), ScriptedTtsClient::fixed(), quiet_settings(2));

        orchestrator.start_dialogue("origins of the labyrinth").await.unwrap();
        orchestrator.run_dialogue().await.unwrap();

        let state = orchestrator.state();
        assert_eq!(state.total_turns, 2);
        assert_eq!(state.topic_depth, 2);
        assert_eq!(state.shared_memory.len(), 4);
        assert_eq!(state.current_speaker, Some(AgentId::A));
        assert_eq!(state.phase, DialoguePhase::Stopped);
        let speakers: Vec<AgentId> = events.speeches().into_iter().map(|(a, _)| a).collect();
        assert_eq!(speakers, vec![AgentId::A, AgentId::A, AgentId::B, AgentId::B]);
        assert_eq!(
            orchestrator.get_last_utterance(AgentId::B),
            "The maze began as a palace and became a legend."
        );
    }

    #[tokio::test]
    async fn listener_without_intention_is_never_asked() {
        let provider = two_chunk_provider();
        let (mut orchestrator, _) =
            orchestrator(provider.clone(), ScriptedTtsClient::fixed(), quiet_settings(1));

        orchestrator.start_dialogue("bulls").await.unwrap();
        assert!(!orchestrator.should_be_interrupted(AgentId::A).await.unwrap());
        assert_eq!(provider.calls_for_step(INTERRUPTION_DECISION), 0);
    }

    #[tokio::test]
    async fn urgency_at_threshold_interrupts_and_just_below_does_not() {
        let provider = two_chunk_provider()
            .with_step_response(INTERRUPTION_DECISION, "urgency: 0.7\ninterjection: Now!")
            .with_step_response(INTERRUPTION_DECISION, "urgency: 0.69999\ninterjection: Soon.");
        let (mut orchestrator, _) =
            orchestrator(provider.clone(), ScriptedTtsClient::fixed(), quiet_settings(4));

        orchestrator.start_dialogue("bulls").await.unwrap();
        orchestrator.generate_turn(AgentId::B, TurnPurpose::Topic).await.unwrap();

        assert!(orchestrator.should_be_interrupted(AgentId::A).await.unwrap());
        assert!(!orchestrator.should_be_interrupted(AgentId::A).await.unwrap());
        assert_eq!(provider.calls_for_step(INTERRUPTION_DECISION), 2);
    }

    #[tokio::test]
    async fn high_urgency_interrupts_and_abandons_rest_of_turn() {
        let provider = MockAIProvider::new()
            .with_step_response(CHUNKED_DIALOGUE, "A one | A two | A three | A four")
            .with_step_response(CHUNKED_DIALOGUE, "B one | B two")
            .with_step_response(CHUNKED_DIALOGUE, "B cuts in | B insists")
            .with_step_default(CHUNKED_DIALOGUE, "A again | A done")
            .with_step_response(INTERRUPTION_DECISION, "urgency: 0.1")
            .with_step_response(INTERRUPTION_DECISION, "urgency: 0.2")
            .with_step_response(INTERRUPTION_DECISION, "urgency: 0.9\ninterjection: Wait!")
            .with_step_default(INTERRUPTION_DECISION, "urgency: 0");
        let (mut orchestrator, events) =
            orchestrator(provider, ScriptedTtsClient::fixed(), quiet_settings(12));

        orchestrator.start_dialogue("bulls").await.unwrap();
        // B speaks first so it holds an intention when A talks.
        orchestrator.state.current_speaker = Some(AgentId::B);
        orchestrator.generate_turn(AgentId::B, TurnPurpose::Topic).await.unwrap();
        orchestrator.vocalize_turn().await.unwrap();
        orchestrator.state.current_speaker = Some(AgentId::A);

        let outcome = orchestrator.vocalize_turn().await.unwrap();

        assert_eq!(outcome, Vocalized::Interrupted);
        let a_speech: Vec<String> = events
            .speeches()
            .into_iter()
            .filter(|(agent, _)| *agent == AgentId::A)
            .map(|(_, text)| text)
            .collect();
        assert_eq!(a_speech, vec!["A one", "A two"]);
        let intention = orchestrator.state().agent(AgentId::A).intention.clone().unwrap();
        assert_eq!(intention.interrupted_at, Some(2));
        assert_eq!(intention.interruption_context.as_deref(), Some("Wait!"));
        assert_eq!(orchestrator.state().current_speaker, Some(AgentId::B));
        assert_eq!(orchestrator.get_current_utterance(AgentId::B), "B cuts in | B insists");
        assert_eq!(orchestrator.get_last_utterance(AgentId::A), "A one A two");
        assert_eq!(
            events.count(|e| matches!(e, DialogueEvent::Interruption { at_chunk: 2, .. })),
            1
        );
    }

    #[tokio::test]
    async fn failed_synthesis_still_speaks_every_chunk() {
        let (mut orchestrator, events) =
            orchestrator(two_chunk_provider(), ScriptedTtsClient::failing(), quiet_settings(1));

        orchestrator.start_dialogue("bulls").await.unwrap();
        orchestrator.run_dialogue().await.unwrap();

        assert_eq!(events.speeches().len(), 2);
        assert_eq!(events.count(|e| matches!(e, DialogueEvent::AudioReady { .. })), 0);
        assert_eq!(events.count(|e| matches!(e, DialogueEvent::TtsError { .. })), 2);
    }

    #[tokio::test]
    async fn degraded_chunk_estimates_duration_from_words() {
        let (orchestrator, _) =
            orchestrator(two_chunk_provider(), ScriptedTtsClient::failing(), quiet_settings(1));

        let chunk = orchestrator
            .generate_audio_chunk(AgentId::A, "four words right here", 0, 2)
            .await;

        assert!(chunk.audio.is_none());
        assert_eq!(chunk.duration_ms, 600);
        assert!(chunk.can_be_interrupted);
    }

    #[tokio::test]
    async fn backchannels_are_emitted_but_not_transcribed() {
        let provider = two_chunk_provider().with_step_default(BACKCHANNEL, "mm");
        let settings = DialogueSettings {
            backchannel_probability: 1.0,
            ..quiet_settings(1)
        };
        let (mut orchestrator, events) = orchestrator(provider, ScriptedTtsClient::fixed(), settings);

        orchestrator.start_dialogue("bulls").await.unwrap();
        orchestrator.run_dialogue().await.unwrap();

        assert_eq!(
            events.events().iter().filter(|e| matches!(e, DialogueEvent::Backchannel { agent: AgentId::B, .. })).count(),
            1
        );
        assert_eq!(orchestrator.state().shared_memory.len(), 2);
    }

    #[tokio::test]
    async fn sentinel_backchannel_emits_nothing() {
        let provider = two_chunk_provider().with_step_default(BACKCHANNEL, "...");
        let settings = DialogueSettings {
            backchannel_probability: 1.0,
            ..quiet_settings(1)
        };
        let (mut orchestrator, events) = orchestrator(provider, ScriptedTtsClient::fixed(), settings);

        orchestrator.start_dialogue("bulls").await.unwrap();
        orchestrator.run_dialogue().await.unwrap();

        assert_eq!(events.count(|e| matches!(e, DialogueEvent::Backchannel { .. })), 0);
        assert_eq!(events.count(|e| matches!(e, DialogueEvent::AudioReady { .. })), 2);
    }

    #[tokio::test]
    async fn question_diversion_counts_two_turns() {
        let provider = two_chunk_provider()
            .with_step_default(QUESTION_SELECTOR, "first: Tamar\napproach: Start with Knossos.");
        let questions = Arc::new(InMemoryQuestionManager::new(Duration::ZERO));
        let question = questions.submit("Was the labyrinth real?", Some("ariadne".into())).await.unwrap();
        let settings = DialogueSettings {
            question_check_interval: 1,
            ..quiet_settings(3)
        };
        let (orchestrator, events) = orchestrator(provider, ScriptedTtsClient::fixed(), settings);
        let mut orchestrator = orchestrator.with_question_manager(questions.clone());

        orchestrator.start_dialogue("bulls").await.unwrap();
        orchestrator.run_dialogue().await.unwrap();

        let state = orchestrator.state();
        assert_eq!(state.total_turns, 3);
        assert_eq!(state.topic_depth, 3);
        assert_eq!(
            events.events().iter().filter(|e| matches!(e, DialogueEvent::Question { first_responder: AgentId::B, .. })).count(),
            1
        );
        let answered = questions.get(question.id).await.unwrap();
        assert_eq!(answered.answered_by, Some(AgentId::B));
        // A, B, listener question, B answer, A follow-up: 2 + 2 + 1 + 2 + 2 entries.
        assert_eq!(state.shared_memory.len(), 9);
    }

    #[tokio::test]
    async fn stop_handle_ends_loop_after_current_call() {
        let provider = two_chunk_provider().with_delay(Duration::from_millis(5));
        let (mut orchestrator, events) =
            orchestrator(provider, ScriptedTtsClient::fixed(), quiet_settings(50));
        let stop = orchestrator.stop_handle();
        let mut snapshots = orchestrator.subscribe();

        orchestrator.start_dialogue("bulls").await.unwrap();
        let watcher = tokio::spawn(async move {
            while snapshots.changed().await.is_ok() {
                if snapshots.borrow().transcript_len >= 3 {
                    stop.stop();
                    break;
                }
            }
        });
        orchestrator.run_dialogue().await.unwrap();
        watcher.await.unwrap();

        assert!(!orchestrator.is_running());
        assert_eq!(orchestrator.state().phase, DialoguePhase::Stopped);
        assert!(orchestrator.state().total_turns < 50);
        assert!(events.speeches().len() < 100);
    }
}
