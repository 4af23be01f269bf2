//! End-to-end radio dialogue scenarios.
//!
//! These tests drive the orchestrator through its public API only:
//! 1. Agents alternate full turns until the depth budget is spent
//! 2. A listener with high urgency takes the floor mid-turn
//! 3. The most upvoted listener question is discussed by both agents
//! 4. A stop request from another task ends the run early
//! 5. A visitor chat session remembers the exchange and its knowledge
//!
//! Uses in-memory adapters to run without external services.

use std::sync::Arc;
use std::time::Duration;

use kothar::adapters::ai::{InMemoryUsageTracker, MockAIProvider};
use kothar::adapters::questions::InMemoryQuestionManager;
use kothar::adapters::retrieval::InMemoryRetriever;
use kothar::adapters::tts::ScriptedTtsClient;
use kothar::domain::cognitive::steps::{
    CHUNKED_DIALOGUE, EXTERNAL_DIALOG, INTERRUPTION_DECISION, QUESTION_SELECTOR,
};
use kothar::domain::cognitive::{ProviderRegistry, StepRuntime};
use kothar::domain::dialogue::{
    AgentId, AgentProfile, DialogueEvent, DialogueOrchestrator, DialoguePhase, DialogueSettings, EventLog,
    QuestionStatus,
};
use kothar::domain::foundation::SessionId;
use kothar::domain::memory::CONTEXT_REGION;
use kothar::domain::soul::{SoulSession, SoulSettings};
use kothar::ports::{ProviderId, UsageTracker};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Harness {
    orchestrator: DialogueOrchestrator,
    events: Arc<EventLog>,
    usage: Arc<InMemoryUsageTracker>,
    provider: MockAIProvider,
    session_id: SessionId,
}

fn settings(max_topic_depth: u32) -> DialogueSettings {
    DialogueSettings {
        max_topic_depth,
        backchannel_probability: 0.0,
        rng_seed: Some(42),
        ..DialogueSettings::default()
    }
}

fn calm_provider() -> MockAIProvider {
    MockAIProvider::new()
        .with_step_default(CHUNKED_DIALOGUE, "The bull was a god once | then a monster in a maze.")
        .with_step_default(INTERRUPTION_DECISION, "urgency: 0.1\ninterjection: Go on.")
}

fn harness(provider: MockAIProvider, settings: DialogueSettings) -> Harness {
    let registry = ProviderRegistry::new().register(ProviderId::Mock, Arc::new(provider.clone()));
    let usage = Arc::new(InMemoryUsageTracker::new());
    let session_id = SessionId::new();
    let runtime = StepRuntime::new(Arc::new(registry), usage.clone(), session_id);
    let events = Arc::new(EventLog::new());
    let profiles = (
        AgentProfile::new(AgentId::A, "Kothar", "A wry craftsman of the gods.").unwrap(),
        AgentProfile::new(AgentId::B, "Tamar", "A curious scholar of myth.").unwrap(),
    );

    let orchestrator = DialogueOrchestrator::new(
        runtime,
        profiles,
        Arc::new(ScriptedTtsClient::fixed()),
        events.clone(),
        settings,
    )
    .unwrap();

    Harness {
        orchestrator,
        events,
        usage,
        provider,
        session_id,
    }
}

fn speakers(events: &EventLog) -> Vec<AgentId> {
    events.speeches().into_iter().map(|(agent, _)| agent).collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn agents_alternate_until_depth_budget_is_spent() {
    let Harness {
        mut orchestrator,
        events,
        usage,
        provider,
        session_id,
    } = harness(calm_provider(), settings(4));

    orchestrator.start_dialogue("the Minotaur").await.unwrap();
    orchestrator.run_dialogue().await.unwrap();

    let state = orchestrator.state();
    assert_eq!(state.total_turns, 4);
    assert_eq!(state.topic_depth, 4);
    assert_eq!(state.phase, DialoguePhase::Stopped);
    assert_eq!(
        speakers(&events),
        vec![AgentId::A, AgentId::A, AgentId::B, AgentId::B, AgentId::A, AgentId::A, AgentId::B, AgentId::B]
    );

    let transcript: Vec<_> = state
        .shared_memory
        .memories()
        .iter()
        .map(|entry| entry.speaker.clone().unwrap_or_default())
        .collect();
    assert_eq!(transcript.len(), 8);
    assert_eq!(transcript[0], "Kothar");
    assert_eq!(transcript[2], "Tamar");

    // Opening turn plus one generated after each of the four turns.
    assert_eq!(provider.calls_for_step(CHUNKED_DIALOGUE), 5);
    let summary = usage.session_usage(session_id).await.unwrap();
    assert_eq!(summary.request_count as usize, provider.call_count());
    assert_eq!(events.count(|e| matches!(e, DialogueEvent::TurnComplete { .. })), 4);
}

#[tokio::test]
async fn urgent_listener_takes_the_floor() {
    // Tamar's first check is skipped (nothing to say yet); Kothar's check at
    // the start of Tamar's turn is the first one consumed.
    let provider = calm_provider().with_step_response(INTERRUPTION_DECISION, "urgency: 0.95\ninterjection: Wait, the maze!");
    let Harness {
        mut orchestrator,
        events,
        ..
    } = harness(provider, settings(3));

    orchestrator.start_dialogue("the Minotaur").await.unwrap();
    orchestrator.run_dialogue().await.unwrap();

    assert_eq!(
        events.count(|e| matches!(
            e,
            DialogueEvent::Interruption {
                interrupter: AgentId::A,
                interrupted: AgentId::B,
                at_chunk: 0,
            }
        )),
        1
    );
    // Tamar never got a word in.
    assert_eq!(speakers(&events), vec![AgentId::A; 4]);
    assert_eq!(orchestrator.state().total_turns, 3);
    assert_eq!(orchestrator.state().current_speaker, Some(AgentId::B));
}

#[tokio::test]
async fn most_upvoted_question_is_discussed() {
    let provider = calm_provider().with_step_default(QUESTION_SELECTOR, "first: Tamar\napproach: Start from the palace ruins.");
    let questions = Arc::new(InMemoryQuestionManager::new(Duration::ZERO));
    let older = questions.submit("Did Daedalus escape?", None).await.unwrap();
    let popular = questions
        .submit("Was the labyrinth a real building?", Some("ariadne".to_string()))
        .await
        .unwrap();
    questions.upvote(popular.id).await.unwrap();

    let Harness {
        orchestrator,
        events,
        ..
    } = harness(
        provider,
        DialogueSettings {
            question_check_interval: 2,
            ..settings(4)
        },
    );
    let mut orchestrator = orchestrator.with_question_manager(questions.clone());

    orchestrator.start_dialogue("the Minotaur").await.unwrap();
    orchestrator.run_dialogue().await.unwrap();

    let asked: Vec<_> = events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            DialogueEvent::Question { question, first_responder } => Some((question, first_responder)),
            _ => None,
        })
        .collect();
    assert_eq!(asked, vec![(popular.question.clone(), AgentId::B)]);

    let answered = questions.get(popular.id).await.unwrap();
    assert_eq!(answered.status, QuestionStatus::Answered);
    assert_eq!(answered.answered_by, Some(AgentId::B));
    assert_eq!(questions.get(older.id).await.unwrap().status, QuestionStatus::Pending);

    let transcript = orchestrator.state().shared_memory.memories();
    assert!(transcript
        .iter()
        .any(|entry| entry.speaker.as_deref() == Some("ariadne") && entry.content == popular.question));
    assert_eq!(orchestrator.state().total_turns, 4);
}

#[tokio::test]
async fn stop_from_another_task_ends_the_run() {
    let provider = calm_provider().with_delay(Duration::from_millis(5));
    let Harness {
        mut orchestrator,
        events,
        ..
    } = harness(provider, settings(500));
    let stop = orchestrator.stop_handle();
    let snapshots = orchestrator.subscribe();

    orchestrator.start_dialogue("the Minotaur").await.unwrap();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        stop.stop();
    });
    orchestrator.run_dialogue().await.unwrap();

    assert!(!orchestrator.is_running());
    assert!(orchestrator.state().total_turns < 500);
    assert!(events.speeches().len() < 1000);
    assert_eq!(snapshots.borrow().phase, DialoguePhase::Stopped);
    assert_eq!(snapshots.borrow().total_turns, orchestrator.state().total_turns);
}

#[tokio::test]
async fn visitor_chat_remembers_exchange_and_knowledge() {
    let provider = MockAIProvider::new().with_step_default(EXTERNAL_DIALOG, "The forge never cools, friend.");
    let registry = ProviderRegistry::new().register(ProviderId::Mock, Arc::new(provider));
    let runtime = StepRuntime::new(Arc::new(registry), Arc::new(InMemoryUsageTracker::new()), SessionId::new());
    let retriever = InMemoryRetriever::new().with_document("forge.md", "Kothar keeps the forge burning on Mount Kasios.");

    let mut session = SoulSession::new(runtime, "Kothar", "A wry craftsman of the gods.", SoulSettings::default())
        .unwrap()
        .with_retriever(Arc::new(retriever));

    let reply = session.respond("Is your forge still burning?").await.unwrap();
    let streamed = reply.stream.collect_text().await.unwrap();
    let stored = session.complete(reply.result).await.unwrap();

    assert_eq!(streamed, "The forge never cools, friend.");
    assert_eq!(stored, streamed);
    assert_eq!(session.memory().freeform_len(), 2);
    assert!(session.memory().region(CONTEXT_REGION)[0].content.contains("Mount Kasios"));
}
