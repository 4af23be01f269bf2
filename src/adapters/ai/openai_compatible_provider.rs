//! OpenAI-compatible Provider - AIProvider for the chat completions wire format.
//!
//! OpenAI and Groq speak the same protocol; only the base URL, key and model
//! names differ.
//!
//! # Configuration
//!
//! ```ignore
//! let config = OpenAICompatibleConfig::groq(api_key)
//!     .with_model("llama-3.1-70b-versatile")
//!     .with_timeout(Duration::from_secs(30));
//!
//! let provider = OpenAICompatibleProvider::new(config)?;
//! ```
//!
//! # Streaming
//!
//! Uses Server-Sent Events (SSE). Lines are buffered across network chunks,
//! each `data:` payload becomes a `StreamChunk`, and the final chunk carries
//! usage when the server reports it.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::ports::{
    AIError, AIProvider, CompletionRequest, CompletionResponse, CompletionStream, FinishReason,
    MessageRole, ProviderId, ProviderInfo, StreamChunk, TokenUsage,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Configuration for an OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleConfig {
    /// Which provider family this endpoint belongs to.
    pub provider: ProviderId,
    /// API key for authentication.
    api_key: Secret<String>,
    /// Model used when a request names none.
    pub model: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries on transient failures.
    pub max_retries: u32,
}

impl OpenAICompatibleConfig {
    /// Configuration for api.openai.com.
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(ProviderId::OpenAI, api_key, "gpt-4o-mini", OPENAI_BASE_URL)
    }

    /// Configuration for Groq's OpenAI-compatible endpoint.
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self::with_endpoint(ProviderId::Groq, api_key, "llama-3.1-70b-versatile", GROQ_BASE_URL)
    }

    fn with_endpoint(provider: ProviderId, api_key: impl Into<String>, model: &str, base_url: &str) -> Self {
        Self {
            provider,
            api_key: Secret::new(api_key.into()),
            model: model.to_string(),
            base_url: base_url.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
        }
    }

    /// Sets the default model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the maximum retry count.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Exposes the API key (for making requests).
    fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

/// Chat completions provider for OpenAI and Groq.
pub struct OpenAICompatibleProvider {
    config: OpenAICompatibleConfig,
    client: Client,
}

impl OpenAICompatibleProvider {
    /// Creates a provider with the given configuration.
    pub fn new(config: OpenAICompatibleConfig) -> Result<Self, AIError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AIError::InvalidRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Builds the chat completions endpoint URL.
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn model_for<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.config.model)
    }

    /// Converts our request to the wire format.
    fn to_wire_request(&self, request: &CompletionRequest, stream: bool) -> ChatRequest {
        let messages = request
            .messages
            .iter()
            .map(|msg| ChatMessage {
                role: match msg.role {
                    MessageRole::System => "system",
                    MessageRole::User => "user",
                    MessageRole::Assistant => "assistant",
                }
                .to_string(),
                content: msg.content.clone(),
            })
            .collect();

        ChatRequest {
            model: self.model_for(request).to_string(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: Some(stream),
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }

    /// Sends a request, streaming or not.
    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<Response, AIError> {
        let wire = self.to_wire_request(request, stream);
        debug!(
            provider = %self.config.provider,
            model = %wire.model,
            stream,
            messages = wire.messages.len(),
            "Sending chat completion"
        );

        let response = self
            .client
            .post(self.completions_url())
            .header("Authorization", format!("Bearer {}", self.config.api_key()))
            .header("Content-Type", "application/json")
            .json(&wire)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AIError::Timeout {
                        timeout_secs: self.config.timeout.as_secs() as u32,
                    }
                } else if e.is_connect() {
                    AIError::network(format!("Connection failed: {}", e))
                } else {
                    AIError::network(e.to_string())
                }
            })?;

        handle_response_status(response).await
    }

    /// Parses a non-streaming response.
    async fn parse_response(&self, response: Response, model: &str) -> Result<CompletionResponse, AIError> {
        let wire: ChatResponse = response
            .json()
            .await
            .map_err(|e| AIError::parse(format!("Failed to parse response: {}", e)))?;

        let choice = wire
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AIError::parse("No choices in response"))?;

        let pricing = Pricing::for_model(model);
        let usage = wire
            .usage
            .map(|u| pricing.usage(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(CompletionResponse {
            content: choice.message.content,
            usage,
            model: wire.model,
            finish_reason: parse_finish_reason(choice.finish_reason.as_deref()),
        })
    }

    async fn complete_once(&self, request: &CompletionRequest) -> Result<CompletionResponse, AIError> {
        let response = self.send(request, false).await?;
        self.parse_response(response, self.model_for(request)).await
    }
}

/// Maps error statuses to `AIError`s.
async fn handle_response_status(response: Response) -> Result<Response, AIError> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let error_body = response.text().await.unwrap_or_default();

    match status.as_u16() {
        401 | 403 => Err(AIError::AuthenticationFailed),
        429 => Err(AIError::rate_limited(parse_retry_after(&error_body))),
        400 | 413 => {
            if error_body.contains("maximum context length")
                || error_body.contains("context_length_exceeded")
            {
                Err(AIError::context_too_long(0, 0))
            } else {
                Err(AIError::InvalidRequest(error_body))
            }
        }
        500..=599 => Err(AIError::unavailable(format!(
            "Server error {}: {}",
            status, error_body
        ))),
        _ => Err(AIError::network(format!(
            "Unexpected status {}: {}",
            status, error_body
        ))),
    }
}

/// Parses "try again in Ns" out of an error body; 30 seconds otherwise.
fn parse_retry_after(error_body: &str) -> u32 {
    let message = serde_json::from_str::<serde_json::Value>(error_body)
        .ok()
        .and_then(|parsed| {
            parsed
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        });

    message
        .as_deref()
        .and_then(|msg| msg.find("try again in ").map(|idx| &msg[idx + 13..]))
        .and_then(|rest| {
            let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            rest[..end].parse::<u32>().ok()
        })
        .unwrap_or(30)
}

fn parse_finish_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

/// Prices per 1M tokens in cents, by model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pricing {
    prompt: u64,
    completion: u64,
}

impl Pricing {
    fn for_model(model: &str) -> Self {
        let (prompt, completion) = match model {
            m if m.starts_with("gpt-4o-mini") => (15, 60),
            m if m.starts_with("gpt-4o") => (250, 1000),
            m if m.starts_with("gpt-4-turbo") => (1000, 3000),
            m if m.starts_with("gpt-4") => (3000, 6000),
            m if m.starts_with("gpt-3.5") => (50, 150),
            m if m.contains("8b") => (5, 8),
            m if m.starts_with("llama") => (59, 79),
            m if m.starts_with("mixtral") => (24, 24),
            _ => (1000, 3000),
        };
        Self { prompt, completion }
    }

    fn cost_cents(&self, prompt_tokens: u32, completion_tokens: u32) -> u32 {
        let prompt_cost = (prompt_tokens as u64 * self.prompt) / 1_000_000;
        let completion_cost = (completion_tokens as u64 * self.completion) / 1_000_000;
        (prompt_cost + completion_cost) as u32
    }

    fn usage(&self, prompt_tokens: u32, completion_tokens: u32) -> TokenUsage {
        TokenUsage::new(
            prompt_tokens,
            completion_tokens,
            self.cost_cents(prompt_tokens, completion_tokens),
        )
    }
}

#[async_trait]
impl AIProvider for OpenAICompatibleProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        let mut retry_count = 0;

        loop {
            match self.complete_once(&request).await {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_retryable() && retry_count < self.config.max_retries => {
                    warn!(
                        provider = %self.config.provider,
                        attempt = retry_count + 1,
                        error = %err,
                        "Retrying chat completion"
                    );
                }
                Err(err) => return Err(err),
            }

            // Exponential backoff: 1s, 2s, 4s, ...
            sleep(Duration::from_secs(1 << retry_count)).await;
            retry_count += 1;
        }
    }

    async fn stream_complete(&self, request: CompletionRequest) -> Result<CompletionStream, AIError> {
        let response = self.send(&request, true).await?;
        let mut parser = SseParser::new(Pricing::for_model(self.model_for(&request)));

        let stream = response
            .bytes_stream()
            .map(move |chunk_result| match chunk_result {
                Ok(bytes) => parser.push(&bytes),
                Err(e) => vec![Err(AIError::network(format!("Stream error: {}", e)))],
            })
            .flat_map(stream::iter);

        Ok(Box::pin(stream))
    }

    fn estimate_tokens(&self, text: &str) -> u32 {
        // ~4 characters per token; close enough for accounting fallbacks
        (text.len() / 4).max(1) as u32
    }

    fn provider_info(&self) -> ProviderInfo {
        let max_context = match self.config.model.as_str() {
            m if m.starts_with("gpt-4o") || m.starts_with("gpt-4-turbo") => 128000,
            m if m.starts_with("gpt-4") => 8192,
            m if m.starts_with("gpt-3.5") => 16384,
            m if m.starts_with("llama-3.1") => 131072,
            m if m.starts_with("mixtral") => 32768,
            _ => 8192,
        };

        ProviderInfo::new(self.config.provider.as_str(), &self.config.model, max_context).with_streaming(true)
    }
}

/// Incremental SSE decoder.
///
/// The finish reason arrives before the usage-only chunk, so the final
/// `StreamChunk` is held back until usage or `[DONE]` shows up.
struct SseParser {
    buffer: String,
    pricing: Pricing,
    finish: Option<FinishReason>,
    finished: bool,
}

impl SseParser {
    fn new(pricing: Pricing) -> Self {
        Self {
            buffer: String::new(),
            pricing,
            finish: None,
            finished: false,
        }
    }

    /// Feeds raw bytes; returns chunks for every complete line.
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, AIError>> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut results = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            if let Some(data) = line.trim_end().strip_prefix("data:") {
                self.data(data.trim(), &mut results);
            }
        }
        results
    }

    fn data(&mut self, data: &str, results: &mut Vec<Result<StreamChunk, AIError>>) {
        if self.finished || data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            if let Some(reason) = self.finish.take() {
                results.push(Ok(StreamChunk {
                    delta: String::new(),
                    finish_reason: Some(reason),
                    usage: None,
                }));
            }
            self.finished = true;
            return;
        }

        let chunk = match serde_json::from_str::<StreamResponseChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                results.push(Err(AIError::parse(format!("Failed to parse SSE chunk: {}", e))));
                return;
            }
        };

        if let Some(choice) = chunk.choices.first() {
            if let Some(content) = choice.delta.content.as_deref().filter(|c| !c.is_empty()) {
                results.push(Ok(StreamChunk::content(content)));
            }
            if let Some(reason) = choice.finish_reason.as_deref() {
                self.finish = Some(parse_finish_reason(Some(reason)));
            }
        }

        let usage = chunk.usage.or_else(|| chunk.x_groq.and_then(|x| x.usage));
        if let Some(u) = usage {
            let reason = self.finish.take().unwrap_or(FinishReason::Stop);
            results.push(Ok(StreamChunk::final_chunk(
                reason,
                self.pricing.usage(u.prompt_tokens, u.completion_tokens),
            )));
            self.finished = true;
        }
    }
}

// ----- Wire Types -----

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamResponseChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<WireUsage>,
    /// Groq reports streaming usage here.
    x_groq: Option<GroqExtras>,
}

#[derive(Debug, Deserialize)]
struct GroqExtras {
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
