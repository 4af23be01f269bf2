//! `kothar [topic]` - runs a two-voice radio dialogue from the command line.
//!
//! Configuration comes from `KOTHAR__*` environment variables (see
//! `kothar::config`). Speech is synthesized as silence, so the run is a
//! transcript with realistic chunk timing metadata.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use kothar::adapters::ai::{
    AnthropicConfig, AnthropicProvider, InMemoryUsageTracker, MockAIProvider, OpenAICompatibleConfig,
    OpenAICompatibleProvider,
};
use kothar::adapters::questions::InMemoryQuestionManager;
use kothar::adapters::tts::SilentTtsClient;
use kothar::config::{AiConfig, AppConfig, LoggingConfig};
use kothar::domain::cognitive::steps::{CHUNKED_DIALOGUE, INTERRUPTION_DECISION};
use kothar::domain::cognitive::{ProviderRegistry, StepOptions, StepRuntime};
use kothar::domain::dialogue::{AgentId, DialogueEvents, DialogueOrchestrator, ListenerQuestion};
use kothar::domain::foundation::SessionId;
use kothar::ports::{AIProvider, ProviderId, TtsError, UsageTracker};

const DEFAULT_TOPIC: &str = "the labyrinth of Knossos";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.logging)?;
    config.validate().context("validating configuration")?;

    let topic = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let topic = if topic.trim().is_empty() { DEFAULT_TOPIC.to_string() } else { topic };

    let registry = build_registry(&config.ai)?;
    let usage = Arc::new(InMemoryUsageTracker::new());
    let session_id = SessionId::new();
    let runtime = StepRuntime::new(Arc::new(registry), usage.clone(), session_id);

    let profiles = config.agents.profiles()?;
    let names = (profiles.0.name.clone(), profiles.1.name.clone());
    let questions = Arc::new(InMemoryQuestionManager::new(std::time::Duration::from_secs(30)));

    let mut orchestrator = DialogueOrchestrator::new(
        runtime,
        profiles,
        Arc::new(SilentTtsClient::new(config.dialogue.ms_per_word)),
        Arc::new(ConsoleEvents { names }),
        config.dialogue.clone(),
    )?
    .with_question_manager(questions)
    .with_step_options(StepOptions::with_model(config.ai.model_selection()));

    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current call");
            stop.stop();
        }
    });

    orchestrator.start_dialogue(&topic).await?;
    if let Err(err) = orchestrator.run_dialogue().await {
        warn!(error = %err, "Dialogue ended early");
    }

    println!("\n=== Transcript: {topic} ===");
    for entry in orchestrator.state().shared_memory.memories() {
        let speaker = entry.speaker.as_deref().unwrap_or("narrator");
        println!("{speaker}: {}", entry.content);
    }

    let summary = usage.session_usage(session_id).await?;
    println!(
        "\n{} model calls, {} tokens, ~{} cents",
        summary.request_count, summary.total_tokens, summary.total_cost_cents
    );
    for provider in &summary.by_provider {
        println!(
            "  {}: {} calls, {} tokens",
            provider.provider, provider.requests, provider.tokens
        );
    }

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(logging.env_filter()?);
    if logging.json {
        builder.json().init();
    } else {
        builder.with_target(false).init();
    }
    Ok(())
}

/// Registers every provider with a key; the default model's provider leads.
fn build_registry(ai: &AiConfig) -> anyhow::Result<ProviderRegistry> {
    let default = ai.default_provider();
    let mut registry = ProviderRegistry::new();

    for id in ai.configured_providers() {
        let Some(key) = ai.api_key(id) else { continue };
        let provider: Arc<dyn AIProvider> = match id {
            ProviderId::OpenAI => Arc::new(OpenAICompatibleProvider::new(
                OpenAICompatibleConfig::openai(key)
                    .with_timeout(ai.timeout())
                    .with_max_retries(ai.max_retries),
            )?),
            ProviderId::Groq => Arc::new(OpenAICompatibleProvider::new(
                OpenAICompatibleConfig::groq(key)
                    .with_timeout(ai.timeout())
                    .with_max_retries(ai.max_retries),
            )?),
            ProviderId::Anthropic => Arc::new(AnthropicProvider::new(
                AnthropicConfig::new(key)
                    .with_timeout(ai.timeout())
                    .with_max_retries(ai.max_retries),
            )?),
            ProviderId::Mock => continue,
        };
        info!(provider = %id, "Registered AI provider");
        registry = registry.register(id, provider);
    }

    if default == ProviderId::Mock {
        let mock = MockAIProvider::new()
            .with_step_default(CHUNKED_DIALOGUE, "Bronze remembers every hammer | even the ones that missed.")
            .with_step_default(INTERRUPTION_DECISION, "urgency: 0.1\ninterjection: Go on.");
        registry = registry.register(ProviderId::Mock, Arc::new(mock));
    }

    Ok(registry.with_default(default))
}

/// Logs each spoken chunk as it happens.
struct ConsoleEvents {
    names: (String, String),
}

impl ConsoleEvents {
    fn name(&self, agent: AgentId) -> &str {
        match agent {
            AgentId::A => &self.names.0,
            AgentId::B => &self.names.1,
        }
    }
}

impl DialogueEvents for ConsoleEvents {
    fn on_speech(&self, agent: AgentId, text: &str, chunk_index: usize, total_chunks: usize) {
        info!(
            speaker = self.name(agent),
            chunk = chunk_index + 1,
            of = total_chunks,
            "{text}"
        );
    }

    fn on_tts_error(&self, agent: AgentId, error: &TtsError, _text: &str) {
        warn!(speaker = self.name(agent), error = %error, "Speech synthesis failed");
    }

    fn on_interruption(&self, interrupter: AgentId, interrupted: AgentId, at_chunk: usize, interjection: &str) {
        info!(
            interrupter = self.name(interrupter),
            interrupted = self.name(interrupted),
            at_chunk,
            "{interjection}"
        );
    }

    fn on_backchannel(&self, agent: AgentId, text: &str) {
        info!(speaker = self.name(agent), "({text})");
    }

    fn on_question(&self, question: &ListenerQuestion, first_responder: AgentId) {
        info!(first_responder = self.name(first_responder), "Listener asks: {}", question.question);
    }
}
