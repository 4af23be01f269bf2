//! Anthropic Provider - Implementation of AIProvider for Anthropic's Messages API.
//!
//! # Configuration
//!
//! ```ignore
//! let config = AnthropicConfig::new(api_key)
//!     .with_model("claude-3-5-haiku-latest")
//!     .with_base_url("https://api.anthropic.com");
//!
//! let provider = AnthropicProvider::new(config)?;
//! ```
//!
//! # Message shaping
//!
//! System entries move into the top-level `system` field. The remaining
//! messages are merged so roles alternate, starting with a user turn and
//! never ending on an assistant turn (which the API would treat as a prefill).
//!
//! # Streaming
//!
//! Uses Server-Sent Events with Anthropic's event format. Input tokens arrive
//! in `message_start`, output tokens and the stop reason in `message_delta`.

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
    MessageRole, ProviderInfo, StreamChunk, TokenUsage,
};

/// Anthropic API version header value.
const ANTHROPIC_API_VERSION: &str = "2023-06-01";

/// Filler user turn when the conversation would otherwise not end on one.
const CONTINUE_PROMPT: &str = "(continue)";

/// Configuration for the Anthropic provider.
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// API key for authentication.
    api_key: Secret<String>,
    /// Model used when a request names none.
    pub model: String,
    /// Base URL for the API (default: https://api.anthropic.com).
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries on transient failures.
    pub max_retries: u32,
    /// `max_tokens` sent when a request sets none; the API requires one.
    pub default_max_tokens: u32,
}

impl AnthropicConfig {
    /// Creates a new configuration with the given API key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Secret::new(api_key.into()),
            model: "claude-3-5-haiku-latest".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 2,
            default_max_tokens: 1024,
        }
    }

    /// Sets the model to use.
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

/// Anthropic API provider implementation.
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicProvider {
    /// Creates a new Anthropic provider with the given configuration.
    pub fn new(config: AnthropicConfig) -> Result<Self, AIError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AIError::InvalidRequest(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Builds the messages endpoint URL.
    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }

    fn model_for<'a>(&'a self, request: &'a CompletionRequest) -> &'a str {
        request.model.as_deref().unwrap_or(&self.config.model)
    }

    /// Converts our request to Anthropic's format.
    fn to_anthropic_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        let mut system = Vec::new();
        let mut messages: Vec<AnthropicMessage> = Vec::new();

        for msg in &request.messages {
            let role = match msg.role {
                MessageRole::System => {
                    system.push(msg.content.clone());
                    continue;
                }
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            match messages.last_mut() {
                Some(last) if last.role == role => {
                    last.content.push_str("\n\n");
                    last.content.push_str(&msg.content);
                }
                _ => messages.push(AnthropicMessage {
                    role: role.to_string(),
                    content: msg.content.clone(),
                }),
            }
        }

        if messages.first().map_or(true, |first| first.role != "user") {
            messages.insert(
                0,
                AnthropicMessage {
                    role: "user".to_string(),
                    content: CONTINUE_PROMPT.to_string(),
                },
            );
        }
        if messages.last().map_or(false, |last| last.role == "assistant") {
            messages.push(AnthropicMessage {
                role: "user".to_string(),
                content: CONTINUE_PROMPT.to_string(),
            });
        }

        AnthropicRequest {
            model: self.model_for(request).to_string(),
            messages,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            max_tokens: request.max_tokens.unwrap_or(self.config.default_max_tokens),
            temperature: request.temperature,
            stream: Some(stream),
        }
    }

    /// Sends a request, streaming or not.
    async fn send(&self, request: &CompletionRequest, stream: bool) -> Result<Response, AIError> {
        let anthropic_request = self.to_anthropic_request(request, stream);
        debug!(
            model = %anthropic_request.model,
            stream,
            messages = anthropic_request.messages.len(),
            "Sending Anthropic request"
        );

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", self.config.api_key())
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .header("Content-Type", "application/json")
            .json(&anthropic_request)
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
        let anthropic_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AIError::parse(format!("Failed to parse response: {}", e)))?;

        let content = anthropic_response
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        let usage = Pricing::for_model(model).usage(
            anthropic_response.usage.input_tokens,
            anthropic_response.usage.output_tokens,
        );

        Ok(CompletionResponse {
            content,
            usage,
            model: anthropic_response.model,
            finish_reason: parse_stop_reason(anthropic_response.stop_reason.as_deref()),
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
            if error_body.contains("prompt is too long") {
                Err(AIError::context_too_long(0, 0))
            } else {
                Err(AIError::InvalidRequest(error_body))
            }
        }
        // 529 is Anthropic's "overloaded"
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

/// Parses "try again in Ns" out of an error body; 60 seconds otherwise.
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
        .unwrap_or(60)
}

fn parse_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("max_tokens") => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

/// Prices per 1M tokens in cents, by model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pricing {
    input: u64,
    output: u64,
}

impl Pricing {
    fn for_model(model: &str) -> Self {
        let (input, output) = match model {
            m if m.contains("opus") => (1500, 7500),
            m if m.contains("sonnet") => (300, 1500),
            m if m.contains("3-5-haiku") => (80, 400),
            m if m.contains("haiku") => (25, 125),
            _ => (300, 1500),
        };
        Self { input, output }
    }

    fn cost_cents(&self, input_tokens: u32, output_tokens: u32) -> u32 {
        let input_cost = (input_tokens as u64 * self.input) / 1_000_000;
        let output_cost = (output_tokens as u64 * self.output) / 1_000_000;
        (input_cost + output_cost) as u32
    }

    fn usage(&self, input_tokens: u32, output_tokens: u32) -> TokenUsage {
        TokenUsage::new(input_tokens, output_tokens, self.cost_cents(input_tokens, output_tokens))
    }
}

#[async_trait]
impl AIProvider for AnthropicProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AIError> {
        let mut retry_count = 0;

        loop {
            match self.complete_once(&request).await {
                Ok(completion) => return Ok(completion),
                Err(err) if err.is_retryable() && retry_count < self.config.max_retries => {
                    warn!(attempt = retry_count + 1, error = %err, "Retrying Anthropic request");
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
        let mut parser = AnthropicSseParser::new(Pricing::for_model(self.model_for(&request)));

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
        // Claude models use ~4 characters per token on average
        (text.len() / 4).max(1) as u32
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("anthropic", &self.config.model, 200_000).with_streaming(true)
    }
}

/// Incremental decoder for Anthropic's SSE events.
///
/// ```text
/// event: content_block_delta
/// data: {"type":"content_block_delta","delta":{"type":"text_delta","text":"Hello"}}
/// ```
struct AnthropicSseParser {
    buffer: String,
    event: String,
    input_tokens: u32,
    pricing: Pricing,
}

impl AnthropicSseParser {
    fn new(pricing: Pricing) -> Self {
        Self {
            buffer: String::new(),
            event: String::new(),
            input_tokens: 0,
            pricing,
        }
    }

    /// Feeds raw bytes; returns chunks for every complete line.
    fn push(&mut self, bytes: &[u8]) -> Vec<Result<StreamChunk, AIError>> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut results = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end();
            if let Some(event) = line.strip_prefix("event:") {
                self.event = event.trim().to_string();
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data(data.trim(), &mut results);
            }
        }
        results
    }

    fn data(&mut self, data: &str, results: &mut Vec<Result<StreamChunk, AIError>>) {
        match self.event.as_str() {
            "message_start" => {
                if let Ok(start) = serde_json::from_str::<MessageStart>(data) {
                    self.input_tokens = start.message.usage.input_tokens;
                }
            }
            "content_block_delta" => match serde_json::from_str::<ContentBlockDelta>(data) {
                Ok(delta) => {
                    if let Some(text) = delta.delta.text.filter(|t| !t.is_empty()) {
                        results.push(Ok(StreamChunk::content(text)));
                    }
                }
                Err(e) => results.push(Err(AIError::parse(format!("Failed to parse SSE delta: {}", e)))),
            },
            "message_delta" => match serde_json::from_str::<MessageDelta>(data) {
                Ok(delta) => {
                    let reason = parse_stop_reason(delta.delta.stop_reason.as_deref());
                    let input = delta
                        .usage
                        .as_ref()
                        .and_then(|u| u.input_tokens)
                        .unwrap_or(self.input_tokens);
                    let chunk = match delta.usage {
                        Some(u) => StreamChunk::final_chunk(reason, self.pricing.usage(input, u.output_tokens)),
                        None => StreamChunk {
                            delta: String::new(),
                            finish_reason: Some(reason),
                            usage: None,
                        },
                    };
                    results.push(Ok(chunk));
                }
                Err(e) => results.push(Err(AIError::parse(format!("Failed to parse SSE delta: {}", e)))),
            },
            "error" => {
                let message = serde_json::from_str::<StreamError>(data)
                    .ok()
                    .and_then(|error| error.error.message)
                    .unwrap_or_else(|| "Stream error".to_string());
                results.push(Err(AIError::unavailable(message)));
            }
            // ping, content_block_start/stop, message_stop
            _ => {}
        }
    }
}

// ----- Anthropic API Types -----

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    message: MessageStartBody,
}

#[derive(Debug, Deserialize)]
struct MessageStartBody {
    usage: StartUsage,
}

#[derive(Debug, Deserialize)]
struct StartUsage {
    input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDelta {
    delta: TextDelta,
}

#[derive(Debug, Deserialize)]
struct TextDelta {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    delta: MessageDeltaContent,
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaContent {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamUsage {
    input_tokens: Option<u32>,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    error: StreamErrorContent,
}

#[derive(Debug, Deserialize)]
struct StreamErrorContent {
    message: Option<String>,
}
