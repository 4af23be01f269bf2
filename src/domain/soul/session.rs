//! Soul Session - The portfolio persona chatting with one visitor.
//!
//! A reply is a short pipeline over the persona's working memory:
//!
//! 1. Remember what the visitor said
//! 2. Pull related knowledge into the `context` region
//! 3. Decide whether the visitor wants a chat, an image or a tarot card
//! 4. Stream the spoken reply
//!
//! The caller drains the reply stream, then hands the result back to
//! `complete`, which stores the final memory and compresses old history.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::domain::cognitive::steps::{decision, external_dialog, summarize, DecisionArgs};
use crate::domain::cognitive::{CognitiveStep, StepOptions, StepResult, StepRuntime, TextStream};
use crate::domain::foundation::{SessionId, Timestamp, ValidationError};
use crate::domain::memory::{MemoryEntry, WorkingMemory, CONTEXT_REGION, CORE_REGION, SUMMARY_REGION};
use crate::ports::{GeneratedImage, ImageGenerator, ImageStyle, RetrievedChunk, Retriever};

use super::errors::SoulError;
use super::vision::{VisionBudget, VisionDecision};

const CHAT: &str = "chat";
const IMAGE: &str = "image";
const TAROT: &str = "tarot";

/// What the visitor is after.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorIntent {
    Chat,
    Image,
    Tarot,
}

impl VisitorIntent {
    fn from_choice(choice: &str) -> Self {
        match choice {
            IMAGE => VisitorIntent::Image,
            TAROT => VisitorIntent::Tarot,
            _ => VisitorIntent::Chat,
        }
    }

    fn style(self) -> Option<ImageStyle> {
        match self {
            VisitorIntent::Chat => None,
            VisitorIntent::Image => Some(ImageStyle::Illustration),
            VisitorIntent::Tarot => Some(ImageStyle::TarotCard),
        }
    }
}

/// Chat session tunables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SoulSettings {
    /// Freeform entries kept before history is summarized.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Freeform entries that survive a compression.
    #[serde(default = "default_keep_recent")]
    pub keep_recent: usize,

    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,

    #[serde(default = "default_vision_cooldown_secs")]
    pub vision_cooldown_secs: u64,

    #[serde(default = "default_vision_max_per_session")]
    pub vision_max_per_session: u32,
}

impl Default for SoulSettings {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            keep_recent: default_keep_recent(),
            retrieval_limit: default_retrieval_limit(),
            vision_cooldown_secs: default_vision_cooldown_secs(),
            vision_max_per_session: default_vision_max_per_session(),
        }
    }
}

fn default_history_limit() -> usize {
    24
}

fn default_keep_recent() -> usize {
    8
}

fn default_retrieval_limit() -> usize {
    3
}

fn default_vision_cooldown_secs() -> u64 {
    60
}

fn default_vision_max_per_session() -> u32 {
    3
}

/// A reply in flight.
pub struct SoulReply {
    pub intent: VisitorIntent,
    /// Set when an image was asked for; says whether the budget allowed it.
    pub vision: Option<VisionDecision>,
    pub image: Option<GeneratedImage>,
    /// The persona's memory while the reply is still streaming.
    pub memory: WorkingMemory,
    pub stream: TextStream,
    pub result: StepResult<String>,
}

/// One visitor's conversation with the persona.
pub struct SoulSession {
    session_id: SessionId,
    memory: WorkingMemory,
    vision: VisionBudget,
    runtime: StepRuntime,
    retriever: Option<Arc<dyn Retriever>>,
    images: Option<Arc<dyn ImageGenerator>>,
    settings: SoulSettings,
    options: StepOptions,
    decide: CognitiveStep<DecisionArgs, String>,
    speak: CognitiveStep<String, String>,
    summarize: CognitiveStep<String, String>,
}

impl SoulSession {
    /// Creates a session for a persona named `soul_name`.
    pub fn new(
        runtime: StepRuntime,
        soul_name: &str,
        personality: &str,
        settings: SoulSettings,
    ) -> Result<Self, SoulError> {
        if soul_name.trim().is_empty() {
            return Err(ValidationError::empty_field("soul_name").into());
        }
        if settings.keep_recent > settings.history_limit {
            return Err(ValidationError::out_of_range(
                "keep_recent",
                0.0,
                settings.history_limit as f64,
                settings.keep_recent as f64,
            )
            .into());
        }

        let memory = WorkingMemory::new(soul_name).with_region(CORE_REGION, MemoryEntry::system(personality));
        let vision = VisionBudget::new(settings.vision_cooldown_secs, settings.vision_max_per_session);

        Ok(Self {
            session_id: runtime.session_id(),
            memory,
            vision,
            runtime,
            retriever: None,
            images: None,
            settings,
            options: StepOptions::default(),
            decide: decision(),
            speak: external_dialog(),
            summarize: summarize(),
        })
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Without an image generator every message is treated as chat.
    pub fn with_image_generator(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_step_options(mut self, options: StepOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn memory(&self) -> &WorkingMemory {
        &self.memory
    }

    pub fn vision(&self) -> &VisionBudget {
        &self.vision
    }

    /// Starts the persona's reply to `message`.
    pub async fn respond(&mut self, message: &str) -> Result<SoulReply, SoulError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::empty_field("message").into());
        }

        let mut memory = self
            .memory
            .with_memory(MemoryEntry::user(message).with_speaker("visitor"));
        memory = self.recall(memory, message).await;

        let (memory, intent) = self.classify(memory).await?;
        let mut instructions = String::from("Answer the visitor in character, briefly and warmly.");
        let mut vision = None;
        let mut image = None;

        if let Some(style) = intent.style() {
            let decision = self.vision.check(Timestamp::now());
            vision = Some(decision);
            match decision {
                VisionDecision::Allowed => {
                    image = self.envision(message, style).await;
                    if let Some(generated) = &image {
                        instructions.push_str(&format!(
                            " You just conjured a {} for them showing: {}. Mention it in a sentence.",
                            generated.style, generated.prompt
                        ));
                    }
                }
                VisionDecision::CooldownActive { remaining_secs } => {
                    info!(session_id = %self.session_id, remaining_secs, "Vision on cooldown");
                    instructions.push_str(&format!(
                        " They asked for a vision, but yours need {remaining_secs} more seconds to return. Say so gently."
                    ));
                }
                VisionDecision::SessionLimitReached => {
                    info!(session_id = %self.session_id, "Vision limit reached for session");
                    instructions.push_str(" They asked for a vision, but you have shared all you can today. Say so gently.");
                }
            }
        }

        let streamed = self
            .speak
            .stream(&self.runtime, &memory, &instructions, &self.options)
            .await?;
        self.memory = memory;

        Ok(SoulReply {
            intent,
            vision,
            image,
            memory: streamed.memory,
            stream: streamed.stream,
            result: streamed.result,
        })
    }

    /// Stores the finished reply and returns its text.
    ///
    /// Compresses history once the freeform entries pass `history_limit`.
    pub async fn complete(&mut self, result: StepResult<String>) -> Result<String, SoulError> {
        let outcome = result.wait().await?;
        if outcome.output.is_raw() {
            warn!(session_id = %self.session_id, "Reply kept as raw text");
        }
        self.memory = outcome.memory;

        if self.memory.freeform_len() > self.settings.history_limit {
            self.memory = self.memory.with_compression_pending(SUMMARY_REGION)?;
        }
        if self.memory.is_compression_pending(SUMMARY_REGION) {
            self.compress_history().await?;
        }
        Ok(outcome.output.into_text())
    }

    /// Summarizes older history into the `summary` region.
    pub async fn compress_history(&mut self) -> Result<(), SoulError> {
        let pending = if self.memory.is_compression_pending(SUMMARY_REGION) {
            self.memory.clone()
        } else {
            self.memory.with_compression_pending(SUMMARY_REGION)?
        };

        let (_, summary) = self
            .summarize
            .run(&self.runtime, &pending, &String::new(), &self.options)
            .await?;
        let entry = MemoryEntry::system(format!("Earlier in this conversation: {summary}"))
            .with_metadata("kind", "summary");
        self.memory = pending.compress_history(SUMMARY_REGION, self.settings.keep_recent, entry)?;

        debug!(
            session_id = %self.session_id,
            remaining = self.memory.freeform_len(),
            "Compressed conversation history"
        );
        Ok(())
    }

    async fn recall(&self, memory: WorkingMemory, query: &str) -> WorkingMemory {
        let Some(retriever) = &self.retriever else {
            return memory;
        };
        match retriever.retrieve(query, self.settings.retrieval_limit).await {
            Ok(chunks) if chunks.is_empty() => memory,
            Ok(chunks) => memory.with_region(CONTEXT_REGION, MemoryEntry::system(knowledge_block(&chunks))),
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "Retrieval failed, replying without context");
                memory
            }
        }
    }

    async fn classify(&self, memory: WorkingMemory) -> Result<(WorkingMemory, VisitorIntent), SoulError> {
        if self.images.is_none() {
            return Ok((memory, VisitorIntent::Chat));
        }
        let args = DecisionArgs {
            description: "what the visitor is asking for: conversation, an image, or a tarot reading".to_string(),
            choices: vec![CHAT.to_string(), IMAGE.to_string(), TAROT.to_string()],
            fallback: CHAT.to_string(),
        };
        let (memory, choice) = self.decide.run(&self.runtime, &memory, &args, &self.options).await?;
        Ok((memory, VisitorIntent::from_choice(&choice)))
    }

    async fn envision(&mut self, message: &str, style: ImageStyle) -> Option<GeneratedImage> {
        let images = Arc::clone(self.images.as_ref()?);
        let prompt = match style {
            ImageStyle::TarotCard => format!("A single tarot card, ornate and mythic, for: {message}"),
            ImageStyle::Illustration => format!("An ink illustration in an ancient style of: {message}"),
        };
        match images.generate(&prompt, style).await {
            Ok(image) => {
                self.vision.record(Timestamp::now());
                info!(session_id = %self.session_id, style = %style, "Generated vision");
                Some(image)
            }
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "Image generation failed, replying as chat");
                None
            }
        }
    }
}

fn knowledge_block(chunks: &[RetrievedChunk]) -> String {
    let mut block = String::from("## Relevant knowledge\n");
    for chunk in chunks {
        block.push_str(&format!("- ({}) {}\n", chunk.source, chunk.content.trim()));
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ai::{InMemoryUsageTracker, MockAIProvider};
    use crate::adapters::image::MockImageGenerator;
    use crate::adapters::retrieval::InMemoryRetriever;
    use crate::domain::cognitive::steps::{DECISION, EXTERNAL_DIALOG, SUMMARIZE};
    use crate::domain::cognitive::ProviderRegistry;
    use crate::domain::memory::MessageRole;
    use crate::ports::{ProviderId, RetrievalError};
    use async_trait::async_trait;

    fn runtime(provider: MockAIProvider) -> StepRuntime {
        let registry = ProviderRegistry::new().register(ProviderId::Mock, Arc::new(provider));
        StepRuntime::new(
            Arc::new(registry),
            Arc::new(InMemoryUsageTracker::new()),
            SessionId::new(),
        )
    }

    fn session(provider: MockAIProvider, settings: SoulSettings) -> SoulSession {
        SoulSession::new(runtime(provider), "Kothar", "A wry craftsman of the gods.", settings).unwrap()
    }

    struct Exchanged {
        intent: VisitorIntent,
        vision: Option<VisionDecision>,
        image: Option<GeneratedImage>,
        text: String,
    }

    async fn exchange(session: &mut SoulSession, message: &str) -> Exchanged {
        let SoulReply {
            intent,
            vision,
            image,
            result,
            ..
        } = session.respond(message).await.unwrap();
        let text = session.complete(result).await.unwrap();
        Exchanged {
            intent,
            vision,
            image,
            text,
        }
    }

    struct BrokenRetriever;

    #[async_trait]
    impl Retriever for BrokenRetriever {
        async fn retrieve(&self, _query: &str, _limit: usize) -> Result<Vec<RetrievedChunk>, RetrievalError> {
            Err(RetrievalError::Unavailable("index offline".into()))
        }
    }

    #[tokio::test]
    async fn reply_streams_and_is_remembered() {
        let provider = MockAIProvider::new().with_step_default(EXTERNAL_DIALOG, "Welcome to the forge, traveler.");
        let mut session = session(provider, SoulSettings::default());

        let reply = session.respond("hello there").await.unwrap();
        assert_eq!(reply.memory.freeform_len(), 1);
        let streamed = reply.stream.collect_text().await.unwrap();
        let text = session.complete(reply.result).await.unwrap();

        assert_eq!(streamed, "Welcome to the forge, traveler.");
        assert_eq!(text, streamed);
        let last = session.memory().last_of_role(MessageRole::Assistant).unwrap();
        assert_eq!(last.content, "Welcome to the forge, traveler.");
        assert_eq!(session.memory().freeform_len(), 2);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let mut session = session(MockAIProvider::new(), SoulSettings::default());
        assert!(matches!(session.respond("   ").await, Err(SoulError::Invalid(_))));
    }

    #[tokio::test]
    async fn retrieved_knowledge_replaces_context_region() {
        let provider = MockAIProvider::new().with_step_default(EXTERNAL_DIALOG, "Ah, the maze.");
        let retriever = InMemoryRetriever::new()
            .with_document("myths.md", "The labyrinth of Knossos held the Minotaur.")
            .with_document("forge.md", "Kothar shapes bronze at the forge.");
        let mut session = session(provider, SoulSettings::default()).with_retriever(Arc::new(retriever));

        exchange(&mut session, "tell me about the labyrinth").await;
        exchange(&mut session, "and the forge?").await;

        let context = session.memory().region(CONTEXT_REGION);
        assert_eq!(context.len(), 1);
        assert!(context[0].content.contains("forge.md"));
        assert!(!context[0].content.contains("myths.md"));
    }

    #[tokio::test]
    async fn retrieval_failure_does_not_block_reply() {
        let provider = MockAIProvider::new().with_step_default(EXTERNAL_DIALOG, "Still here.");
        let mut session = session(provider, SoulSettings::default()).with_retriever(Arc::new(BrokenRetriever));

        let exchanged = exchange(&mut session, "anyone home?").await;

        assert_eq!(exchanged.text, "Still here.");
        assert!(session.memory().region(CONTEXT_REGION).is_empty());
    }

    #[tokio::test]
    async fn image_request_respects_cooldown() {
        let provider = MockAIProvider::new()
            .with_step_default(DECISION, "image")
            .with_step_default(EXTERNAL_DIALOG, "Behold.");
        let images = Arc::new(MockImageGenerator::new());
        let mut session = session(provider, SoulSettings::default()).with_image_generator(images.clone());

        let first = exchange(&mut session, "draw me a bull").await;
        let second = exchange(&mut session, "another one!").await;

        assert_eq!(first.intent, VisitorIntent::Image);
        assert_eq!(first.image.as_ref().unwrap().style, ImageStyle::Illustration);
        assert_eq!(second.intent, VisitorIntent::Image);
        assert!(second.image.is_none());
        assert!(matches!(second.vision, Some(VisionDecision::CooldownActive { .. })));
        assert_eq!(session.vision().generated(), 1);
        assert_eq!(images.calls(), 1);
    }

    #[tokio::test]
    async fn chat_intent_skips_image_generator() {
        let provider = MockAIProvider::new()
            .with_step_default(DECISION, "chat")
            .with_step_default(EXTERNAL_DIALOG, "Of course.");
        let images = Arc::new(MockImageGenerator::new());
        let mut session = session(provider, SoulSettings::default()).with_image_generator(images.clone());

        let reply = exchange(&mut session, "how are you?").await;

        assert_eq!(reply.intent, VisitorIntent::Chat);
        assert!(reply.vision.is_none());
        assert_eq!(images.calls(), 0);
    }

    #[tokio::test]
    async fn long_history_is_summarized() {
        let provider = MockAIProvider::new()
            .with_step_default(EXTERNAL_DIALOG, "Indeed.")
            .with_step_default(SUMMARIZE, "The visitor asked about bulls and bronze.");
        let settings = SoulSettings {
            history_limit: 4,
            keep_recent: 2,
            ..SoulSettings::default()
        };
        let mut session = session(provider, settings);

        for message in ["bulls?", "bronze?", "both?"] {
            exchange(&mut session, message).await;
        }

        let memory = session.memory();
        assert_eq!(memory.freeform_len(), 2);
        let summary = memory.region(SUMMARY_REGION);
        assert_eq!(summary.len(), 1);
        assert!(summary[0].content.contains("bulls and bronze"));
        assert!(!memory.is_compression_pending(SUMMARY_REGION));
        assert_eq!(memory.region(CORE_REGION).len(), 1);
    }

    #[test]
    fn keep_recent_cannot_exceed_history_limit() {
        let settings = SoulSettings {
            history_limit: 2,
            keep_recent: 5,
            ..SoulSettings::default()
        };
        assert!(SoulSession::new(runtime(MockAIProvider::new()), "Kothar", "", settings).is_err());
    }
}
