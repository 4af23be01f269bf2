//! The cognitive step factory.
//!
//! A step turns a working memory plus arguments into a new memory plus a
//! typed result, backed by exactly one model call. Steps are described by a
//! `StepSpec` (how to phrase the command, how to read the answer) and built
//! with `create_cognitive_step`.
//!
//! # Example
//!
//! ```ignore
//! let shout = create_cognitive_step("shout", |topic: &String| {
//!     let topic = topic.clone();
//!     StepSpec::new(move |memory| {
//!         MemoryEntry::user(format!("{} shouts about {topic}.", memory.soul_name()))
//!     })
//! });
//!
//! let (memory, text) = shout.run(&runtime, &memory, &"bulls".into(), &StepOptions::default()).await?;
//! ```

use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::domain::memory::{MemoryEntry, WorkingMemory};
use crate::ports::{
    CompletionRequest, CompletionStream, ModelSelection, RequestMetadata, TokenUsage, UsageRecord,
};

use super::errors::StepError;
use super::registry::{ResolvedProvider, StepRuntime};

/// Builds the outbound command entry from the current memory.
pub type CommandFn = Arc<dyn Fn(&WorkingMemory) -> MemoryEntry + Send + Sync>;

/// Maps raw model text to the entry to remember and the typed result.
pub type PostProcessFn<T> =
    Arc<dyn Fn(&WorkingMemory, &str) -> Result<(MemoryEntry, T), StepError> + Send + Sync>;

/// How one step invocation talks to the model.
pub struct StepSpec<T> {
    command: CommandFn,
    post_process: PostProcessFn<T>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl StepSpec<String> {
    /// A spec whose result is the raw model text, remembered as an
    /// assistant entry spoken by the soul.
    pub fn new<F>(command: F) -> Self
    where
        F: Fn(&WorkingMemory) -> MemoryEntry + Send + Sync + 'static,
    {
        Self {
            command: Arc::new(command),
            post_process: Arc::new(verbatim),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl<T> StepSpec<T> {
    /// Replaces the post-process, changing the result type.
    pub fn with_post_process<U, F>(self, post_process: F) -> StepSpec<U>
    where
        F: Fn(&WorkingMemory, &str) -> Result<(MemoryEntry, U), StepError> + Send + Sync + 'static,
    {
        StepSpec {
            command: self.command,
            post_process: Arc::new(post_process),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Default post-process: the raw text is both the entry and the result.
pub fn verbatim(memory: &WorkingMemory, raw: &str) -> Result<(MemoryEntry, String), StepError> {
    Ok((remembered_reply(memory, raw), raw.to_string()))
}

fn remembered_reply(memory: &WorkingMemory, raw: &str) -> MemoryEntry {
    MemoryEntry::assistant(raw).with_speaker(memory.soul_name())
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    /// Provider and model; `None` uses the registry default.
    pub model: Option<ModelSelection>,
    /// Overrides the step's own temperature.
    pub temperature: Option<f32>,
    /// Overrides the step's own token cap.
    pub max_tokens: Option<u32>,
}

impl StepOptions {
    pub fn with_model(model: ModelSelection) -> Self {
        Self {
            model: Some(model),
            ..Self::default()
        }
    }
}

/// A callable step built by `create_cognitive_step`.
pub struct CognitiveStep<A, T> {
    name: Arc<str>,
    factory: Arc<dyn Fn(&A) -> StepSpec<T> + Send + Sync>,
}

impl<A, T> Clone for CognitiveStep<A, T> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<A, T> fmt::Debug for CognitiveStep<A, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CognitiveStep").field("name", &self.name).finish()
    }
}

/// Creates a step from a factory that builds its spec from the arguments.
pub fn create_cognitive_step<A, T, F>(name: &str, factory: F) -> CognitiveStep<A, T>
where
    F: Fn(&A) -> StepSpec<T> + Send + Sync + 'static,
{
    CognitiveStep {
        name: Arc::from(name),
        factory: Arc::new(factory),
    }
}

struct Prepared<T> {
    post_process: PostProcessFn<T>,
    resolved: ResolvedProvider,
    request: CompletionRequest,
}

impl<A, T> CognitiveStep<A, T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn prepare(
        &self,
        runtime: &StepRuntime,
        memory: &WorkingMemory,
        args: &A,
        options: &StepOptions,
    ) -> Result<Prepared<T>, StepError> {
        let spec = (self.factory)(args);
        let outbound = memory.with_memory((spec.command)(memory));
        let resolved = runtime.registry().resolve(options.model.as_ref())?;

        let metadata = RequestMetadata::new(
            Some(runtime.session_id()),
            self.name.as_ref(),
            uuid::Uuid::new_v4().to_string(),
        );
        let mut request = CompletionRequest::new(metadata).with_messages(outbound.to_messages());
        if let Some(model) = &resolved.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = options.temperature.or(spec.temperature) {
            request = request.with_temperature(temperature);
        }
        if let Some(max_tokens) = options.max_tokens.or(spec.max_tokens) {
            request = request.with_max_tokens(max_tokens);
        }

        debug!(
            step = %self.name,
            provider = %resolved.id,
            messages = request.messages.len(),
            "Dispatching cognitive step"
        );

        Ok(Prepared {
            post_process: spec.post_process,
            resolved,
            request,
        })
    }

    /// Runs the step to completion.
    ///
    /// Provider failures propagate; the step never retries.
    pub async fn run(
        &self,
        runtime: &StepRuntime,
        memory: &WorkingMemory,
        args: &A,
        options: &StepOptions,
    ) -> Result<(WorkingMemory, T), StepError> {
        let Prepared {
            post_process,
            resolved,
            request,
        } = self.prepare(runtime, memory, args, options)?;

        let response = resolved.provider.complete(request).await?;
        runtime
            .record_usage(UsageRecord::new(
                runtime.session_id(),
                resolved.id,
                response.model.clone(),
                self.name.as_ref(),
                &response.usage,
                false,
            ))
            .await;

        let (entry, value) = post_process(memory, &response.content)?;
        Ok((memory.with_memory(entry), value))
    }

    /// Starts the step in streaming mode.
    ///
    /// Returns at once with a memory carrying a pending-finished signal, the
    /// text deltas, and a handle to the final result. The result never hangs:
    /// if the post-process fails it carries the raw text instead.
    pub async fn stream(
        &self,
        runtime: &StepRuntime,
        memory: &WorkingMemory,
        args: &A,
        options: &StepOptions,
    ) -> Result<StreamedStep<T>, StepError>
    where
        T: Send + 'static,
    {
        let Prepared {
            post_process,
            resolved,
            request,
        } = self.prepare(runtime, memory, args, options)?;

        let prompt_text = request.prompt_text();
        let upstream = resolved.provider.stream_complete(request).await?;

        let pending = memory.with_pending_finished();
        let (delta_tx, delta_rx) = mpsc::unbounded_channel();
        let (result_tx, result_rx) = oneshot::channel();

        let task = StreamTask {
            step: Arc::clone(&self.name),
            runtime: runtime.clone(),
            resolved,
            base: memory.clone(),
            pending: pending.clone(),
            post_process,
            prompt_text,
        };
        tokio::spawn(task.drive(upstream, delta_tx, result_tx));

        Ok(StreamedStep {
            memory: pending,
            stream: TextStream { rx: delta_rx },
            result: StepResult {
                step: Arc::clone(&self.name),
                rx: result_rx,
            },
        })
    }
}

/// Handles returned by `CognitiveStep::stream`.
pub struct StreamedStep<T> {
    /// The input memory with an unresolved finished signal.
    pub memory: WorkingMemory,
    /// Text deltas; single consumer.
    pub stream: TextStream,
    /// Resolves once the stream is exhausted.
    pub result: StepResult<T>,
}

/// Text deltas of a streaming step.
pub struct TextStream {
    rx: mpsc::UnboundedReceiver<Result<String, StepError>>,
}

impl TextStream {
    /// Drains the stream into one string.
    pub async fn collect_text(mut self) -> Result<String, StepError> {
        let mut text = String::new();
        while let Some(delta) = self.rx.recv().await {
            text.push_str(&delta?);
        }
        Ok(text)
    }
}

impl Stream for TextStream {
    type Item = Result<String, StepError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// What a finished stream produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput<T> {
    /// The post-process succeeded.
    Processed(T),
    /// The post-process failed; this is the accumulated text.
    Raw(String),
}

impl<T> StepOutput<T> {
    pub fn processed(self) -> Option<T> {
        match self {
            StepOutput::Processed(value) => Some(value),
            StepOutput::Raw(_) => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, StepOutput::Raw(_))
    }
}

impl StepOutput<String> {
    /// Either arm as text.
    pub fn into_text(self) -> String {
        match self {
            StepOutput::Processed(text) | StepOutput::Raw(text) => text,
        }
    }
}

/// Final memory and output of a streamed step.
#[derive(Debug, Clone)]
pub struct StreamOutcome<T> {
    pub memory: WorkingMemory,
    pub output: StepOutput<T>,
}

/// Handle to the result of a streamed step.
pub struct StepResult<T> {
    step: Arc<str>,
    rx: oneshot::Receiver<Result<StreamOutcome<T>, StepError>>,
}

impl<T> StepResult<T> {
    pub async fn wait(self) -> Result<StreamOutcome<T>, StepError> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(StepError::StreamClosed {
                step: self.step.to_string(),
            }),
        }
    }
}

/// Resolves the pending-finished signal however the task ends.
struct FinishOnDrop(WorkingMemory);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.resolve_finished();
    }
}

struct StreamTask<T> {
    step: Arc<str>,
    runtime: StepRuntime,
    resolved: ResolvedProvider,
    base: WorkingMemory,
    pending: WorkingMemory,
    post_process: PostProcessFn<T>,
    prompt_text: String,
}

impl<T: Send + 'static> StreamTask<T> {
    async fn drive(
        self,
        mut upstream: CompletionStream,
        deltas: mpsc::UnboundedSender<Result<String, StepError>>,
        result: oneshot::Sender<Result<StreamOutcome<T>, StepError>>,
    ) {
        let _finish = FinishOnDrop(self.pending.clone());
        let mut text = String::new();
        let mut usage = None;
        let mut failure = None;

        while let Some(item) = upstream.next().await {
            match item {
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        text.push_str(&chunk.delta);
                        // The consumer may have dropped the stream; keep accumulating.
                        let _ = deltas.send(Ok(chunk.delta.clone()));
                    }
                    let done = chunk.is_final();
                    if chunk.usage.is_some() {
                        usage = chunk.usage;
                    }
                    if done {
                        break;
                    }
                }
                Err(err) => {
                    let err = StepError::from(err);
                    let _ = deltas.send(Err(err.clone()));
                    failure = Some(err);
                    break;
                }
            }
        }
        drop(deltas);

        self.record(usage, &text).await;

        let outcome = match failure {
            Some(err) => Err(err),
            None => Ok(self.finish(text)),
        };
        let _ = result.send(outcome);
    }

    async fn record(&self, usage: Option<TokenUsage>, text: &str) {
        let provider = &self.resolved.provider;
        let usage = usage.unwrap_or_else(|| {
            TokenUsage::new(
                provider.estimate_tokens(&self.prompt_text),
                provider.estimate_tokens(text),
                0,
            )
        });
        let model = self
            .resolved
            .model
            .clone()
            .unwrap_or_else(|| provider.provider_info().model);

        self.runtime
            .record_usage(UsageRecord::new(
                self.runtime.session_id(),
                self.resolved.id,
                model,
                self.step.as_ref(),
                &usage,
                true,
            ))
            .await;
    }

    fn finish(&self, text: String) -> StreamOutcome<T> {
        match (self.post_process)(&self.base, &text) {
            Ok((entry, value)) => StreamOutcome {
                memory: self.base.with_memory(entry),
                output: StepOutput::Processed(value),
            },
            Err(err) => {
                warn!(step = %self.step, error = %err, "Post-process failed, returning raw text");
                StreamOutcome {
                    memory: self.base.with_memory(remembered_reply(&self.base, &text)),
                    output: StepOutput::Raw(text),
                }
            }
        }
    }
}
